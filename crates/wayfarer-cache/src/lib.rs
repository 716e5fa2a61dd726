//! Namespaced, TTL-aware key/value cache for Wayfarer.
//!
//! Backed by a single SQLite file. Every failure inside the store is logged
//! and reported as a miss, so a broken cache never fails a fetch.

pub mod namespace;
pub mod store;

pub use namespace::{Namespace, NamespacePolicies};
pub use store::{CacheError, CacheStore};
