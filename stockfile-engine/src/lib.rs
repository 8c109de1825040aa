//! Stockfile Engine - single-table inventory record store
//!
//! This crate provides the core storage engine: a flat file of fixed-size
//! record slots, paired with in-memory secondary indexes that are rebuilt
//! from the file whenever it is opened or restored.

pub mod error;
pub mod config;
pub mod storage;
pub mod index;
pub mod query;
pub mod audit;
pub mod events;
pub mod store;
pub mod export;

pub use error::{StoreError, StoreResult};
pub use config::StoreConfig;
pub use storage::Record;
pub use query::{Comparison, Field};
pub use events::{ChangeEvent, Subscription};
pub use store::{InventoryStats, RecordStore};
