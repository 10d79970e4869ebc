pub mod content_blob;
pub mod file_reference;
