//! Append-only concurrent containers.
//!
//! # Organization
//!
//! - [`concurrent_list`] - Lock-free prepend-only linked list
//! - [`concurrent_map`] - Lock-free insert-only binary search tree map
//!
//! Both containers support concurrent insertion through single-word
//! compare-and-swap and deliberately support nothing else that would
//! require memory reclamation: no removal, no rebalancing. Nodes live
//! until the owning container is dropped, which is what makes the
//! lock-free algorithms safe without hazard pointers or epochs.

pub mod concurrent_list;
pub mod concurrent_map;

pub use concurrent_list::ConcurrentList;
pub use concurrent_map::ConcurrentMap;
