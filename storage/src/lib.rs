//! mnemo-storage - persistence adapter for memory and cognition records
//!
//! Defines the `PersistenceAdapter` trait (durable storage, vector-index-aware
//! retrieval) plus the in-process default implementation, the admission
//! controller that gates writes, and the consolidation pass that decays,
//! prunes, and merges records over time.

pub mod adapter;
pub mod admission;
pub mod consolidation;
pub mod in_memory;

pub use adapter::{PersistenceAdapter, StorageStatistics};
pub use admission::{check_admission, AdmissionCandidate};
pub use consolidation::{consolidate, ConsolidationSummary};
pub use in_memory::InMemoryAdapter;
