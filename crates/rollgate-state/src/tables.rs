//! redb table definitions for the rollgate state store.
//!
//! Object tables use `{namespace}/{name}` keys and JSON `&[u8]` values.
//! Event keys append a zero-padded sequence so a prefix scan returns an
//! object's events in recording order.

use redb::TableDefinition;

/// Releases keyed by `{namespace}/{name}`.
pub const RELEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("releases");

/// Rollout blocks keyed by `{namespace}/{name}`.
pub const ROLLOUT_BLOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollout_blocks");

/// Events keyed by `{kind}/{namespace}/{name}#{sequence:020}`.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");

/// Last issued event sequence keyed by `{kind}/{namespace}/{name}`.
pub const EVENT_SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("event_sequences");
