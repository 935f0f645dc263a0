pub mod common_tests;
pub mod data_structures;

// Re-export the containers for convenience
pub use data_structures::{ConcurrentList, ConcurrentMap};
