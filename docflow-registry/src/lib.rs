//! ABOUTME: Job Registry (C2): durable job records with fault-isolated status writes

pub mod registry;
pub mod store;

pub use registry::JobRegistry;
pub use store::{InMemoryJobStore, JobStore, PostgresJobStore, SharedJobStore, StoreError};
