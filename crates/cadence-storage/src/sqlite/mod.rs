//! SQLite-backed record store.

pub mod schema;
mod store;

pub use store::SqliteStore;
