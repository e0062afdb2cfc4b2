//! Persistence layer: the `ParcelStore` trait with libSQL and in-memory
//! backends.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use traits::{ParcelStore, UnparsedEmail, UnparsedStatus};
