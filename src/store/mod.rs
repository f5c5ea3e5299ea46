//! Persistence layer: the onboarding snapshot and its debounced writer.

pub mod debounce;
pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use debounce::DebouncedSaver;
pub use libsql_backend::LibSqlSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use traits::{SnapshotStore, settings_keys};
