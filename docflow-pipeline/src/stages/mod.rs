//! ABOUTME: Ingestion through Vectorization (C8-C12). Parsing has no stage of its
//! ABOUTME: own: it is a pass-through status the orchestrator sets between Ingestion
//! ABOUTME: and Validation, whose read_zip_contents performs the actual ZIP read.

pub mod classification;
pub mod ingestion;
pub mod persistence;
pub mod validation;
pub mod vectorization;
