//! gamevault: keeps a local game catalog in sync with a remote catalog API.

pub mod api;
pub mod cache_gate;
pub mod catalog;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod remote;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use catalog::{CatalogFilter, CatalogRecord};
pub use error::SyncError;
