//! ABOUTME: Object Store Client (C5): document upload, image extraction, and image serving

pub mod content_type;
pub mod store;

pub use content_type::{content_type_for, is_image_path, IMAGE_EXTENSIONS};
pub use store::{HttpObjectStore, InMemoryObjectStore, ObjectStore, MAX_SIGNED_URL_EXPIRATION};
