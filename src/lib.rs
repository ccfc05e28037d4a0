//! SQLite-backed storage for postal parcel tracking.
//!
//! # Intention
//!
//! - Record parcels, look them up by number or by owning client.
//! - Enforce the parcel rules at the data-access boundary: statuses come from a
//!   closed set, and the address can only change (or the parcel be deleted)
//!   while the parcel is still `registered`.
//!
//! # Architectural Boundaries
//!
//! - The store receives an already-open connection and never closes it.
//! - No schema migration, no caching, no multi-statement transactions.

pub mod error;
pub mod memory;
pub mod parcel;
pub mod sqlite;
pub mod store;

pub use error::{ParseStatusError, Result, StoreError};
pub use memory::InMemoryParcelStore;
pub use parcel::{Parcel, ParcelStatus};
pub use sqlite::{initialize_schema, SqliteConfig, SqliteParcelStore, PARCEL_TABLE_DDL};
pub use store::ParcelStore;
