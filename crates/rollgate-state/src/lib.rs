//! rollgate-state — embedded object store for rollgate.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for releases, rollout blocks, and the events recorded about them.
//!
//! # Architecture
//!
//! Objects are JSON-serialized into redb's `&[u8]` value columns under
//! `{namespace}/{name}` keys, so a namespace is a key prefix. Releases are
//! written with optimistic concurrency on `metadata.resource_version`.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements the gate's lister, writer, and event recorder contracts.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
