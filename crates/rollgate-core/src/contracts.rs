//! Narrow capabilities the admission gate consumes.
//!
//! The gate never talks to a store directly. It lists rollout blocks
//! through a [`RolloutBlockLister`], writes its annotation repair through
//! a [`SubjectWriter`], and reports through an [`EventRecorder`]. The
//! state store implements all three; tests use in-memory fakes.

use std::sync::Arc;

use thiserror::Error;

use crate::types::{EventType, ObjectReference, RolloutBlock};

/// Listing rollout blocks failed.
#[derive(Debug, Error)]
#[error("failed to list rollout blocks in namespace {namespace:?}: {reason}")]
pub struct ListError {
    pub namespace: String,
    pub reason: String,
}

/// Persisting a subject failed.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The stored object changed since it was read.
    #[error("conflict updating {key}: stored version {current}, written version {attempted}")]
    Conflict {
        key: String,
        current: u64,
        attempted: u64,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Read-only access to rollout blocks.
pub trait RolloutBlockLister {
    /// Every rollout block in `namespace`, unfiltered.
    fn list(&self, namespace: &str) -> Result<Vec<RolloutBlock>, ListError>;
}

/// Persists a subject. On success the subject's resource version is
/// updated in place to the stored one.
pub trait SubjectWriter<S> {
    fn persist(&self, subject: &mut S) -> Result<(), UpdateError>;
}

/// Fire-and-forget event sink.
pub trait EventRecorder {
    fn record(&self, object: &ObjectReference, type_: EventType, reason: &str, message: &str);
}

impl<T: RolloutBlockLister + ?Sized> RolloutBlockLister for &T {
    fn list(&self, namespace: &str) -> Result<Vec<RolloutBlock>, ListError> {
        (**self).list(namespace)
    }
}

impl<T: RolloutBlockLister + ?Sized> RolloutBlockLister for Arc<T> {
    fn list(&self, namespace: &str) -> Result<Vec<RolloutBlock>, ListError> {
        (**self).list(namespace)
    }
}

impl<S, T: SubjectWriter<S> + ?Sized> SubjectWriter<S> for &T {
    fn persist(&self, subject: &mut S) -> Result<(), UpdateError> {
        (**self).persist(subject)
    }
}

impl<S, T: SubjectWriter<S> + ?Sized> SubjectWriter<S> for Arc<T> {
    fn persist(&self, subject: &mut S) -> Result<(), UpdateError> {
        (**self).persist(subject)
    }
}

impl<T: EventRecorder + ?Sized> EventRecorder for &T {
    fn record(&self, object: &ObjectReference, type_: EventType, reason: &str, message: &str) {
        (**self).record(object, type_, reason, message)
    }
}

impl<T: EventRecorder + ?Sized> EventRecorder for Arc<T> {
    fn record(&self, object: &ObjectReference, type_: EventType, reason: &str, message: &str) {
        (**self).record(object, type_, reason, message)
    }
}
