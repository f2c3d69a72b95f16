//! File sizing, extent, and shared-memory naming helpers shared by the
//! loader and worker binaries.

pub mod entry_limits;
pub mod error;
pub mod extent;
pub mod shm_name;
pub mod sizing;

pub use entry_limits::MAX_NAME_LEN;
pub use error::LoadError;
pub use extent::first_extent_physical_offset;
pub use shm_name::derive_shm_name;
pub use sizing::query_size;
