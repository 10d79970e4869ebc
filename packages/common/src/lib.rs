//! Storage primitives shared by the catalog server: the content-addressed
//! blob port, its filesystem implementation, and retry backoff.

pub mod retry;
pub mod storage;

pub use retry::RetryPolicy;
