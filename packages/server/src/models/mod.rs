pub mod file;
pub mod shared;
pub mod stats;
