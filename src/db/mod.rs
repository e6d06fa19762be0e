//! Data model, in-memory history and persistence for pynk.
//!
//! Hosts and their series live in memory; SQLite only keeps snapshots.

mod models;
mod series;
mod store;

pub use models::*;
pub use series::*;
pub use store::*;

/// Keyed state storage used to survive restarts.
pub trait StatePersistence: Send + Sync {
    /// Load the last saved snapshot, if any.
    fn load_state(&self) -> Result<Option<Snapshot>, DbError>;
    /// Replace the saved snapshot.
    fn save_state(&self, snapshot: &Snapshot) -> Result<(), DbError>;
}
