//! Operator overrides of rollout blocks.
//!
//! An override set is persisted as a single annotation value: member
//! identifiers (`{namespace}/{name}`) joined with `,`. Members are kept in
//! a `BTreeSet`, so the serialized form is sorted and stable across runs.

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use rollgate_core::RolloutBlock;

/// Separator between identifiers in the serialized form.
pub const OVERRIDE_DELIMITER: char = ',';

/// A set of rollout block identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct OverrideSet {
    ids: BTreeSet<String>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an annotation value. Never fails: segments are trimmed and
    /// empty ones dropped, so `""`, `","` and `" a ,, a"` are all accepted.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::new();
        set.insert(raw);
        set
    }

    /// The identifiers of the given rollout blocks.
    pub fn from_rollout_blocks<'a, I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a RolloutBlock>,
    {
        Self {
            ids: blocks.into_iter().map(RolloutBlock::override_id).collect(),
        }
    }

    /// Members of `self` absent from `other` (`self \ other`).
    pub fn diff(&self, other: &OverrideSet) -> OverrideSet {
        Self {
            ids: self.ids.difference(&other.ids).cloned().collect(),
        }
    }

    /// Add `id`, normalized the same way [`OverrideSet::parse`] does.
    pub fn insert(&mut self, id: &str) {
        self.ids.extend(
            id.split(OVERRIDE_DELIMITER)
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(str::to_string),
        );
    }

    /// Remove `id`. Returns false if it was not a member.
    pub fn delete(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Members in lexical order.
    pub fn iter(&self) -> btree_set::Iter<'_, String> {
        self.ids.iter()
    }
}

impl fmt::Display for OverrideSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                write!(f, "{OVERRIDE_DELIMITER}")?;
            }
            f.write_str(id)?;
        }
        Ok(())
    }
}

impl FromStr for OverrideSet {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl<S: AsRef<str>> FromIterator<S> for OverrideSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id.as_ref());
        }
        set
    }
}

impl<'a> IntoIterator for &'a OverrideSet {
    type Item = &'a String;
    type IntoIter = btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}
