//! ABOUTME: Document Converter Client (C4): URL-mode, file-to-ZIP-mode, and temp-file plumbing

pub mod client;

pub use client::{ConvertByUrlResponse, ConvertToZipResponse, DocumentConverter, HttpDocumentConverter};
