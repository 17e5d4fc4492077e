//! Checkpoint module
//!
//! Durable holder of the last cursor whose page was confirmed written to the
//! sink. One named parameter per feed; `set_cursor` overwrites.
//!
//! Reads fail closed: only an explicit "not found" is reported as `Ok(None)`.
//! Any other failure is an `Error::Store`, so a broken backend never looks
//! like a first run.
//!
//! # Backends
//!
//! - `FileCheckpointStore` - JSON parameter file, atomic replace
//! - `ObjectStoreCheckpointStore` - one object per parameter
//! - `MemoryCheckpointStore` - process memory

mod object;
mod store;
mod types;

pub use object::ObjectStoreCheckpointStore;
pub use store::{checkpoint_store, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use types::{Parameter, ParameterFile};
