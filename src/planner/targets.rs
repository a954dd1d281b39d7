//! Reconciliation target expansion.
//!
//! Every declared stack and builder is reconciled twice: once under its own
//! name and once as the cluster `default`. Expansion turns N entries into 2N
//! targets, each default directly after its named sibling.

use crate::descriptor::{BuilderEntry, StackEntry};
use crate::resources::DEFAULT_NAME;

/// A descriptor entry with a unique name.
pub trait NamedEntry {
    /// Returns the declared name.
    fn name(&self) -> &str;
}

impl NamedEntry for StackEntry {
    fn name(&self) -> &str {
        &self.name
    }
}

impl NamedEntry for BuilderEntry {
    fn name(&self) -> &str {
        &self.name
    }
}

/// One object to reconcile.
#[derive(Debug)]
pub struct Target<'a, E> {
    /// Name of the cluster object.
    pub name: &'a str,
    /// Entry the object is built from.
    pub entry: &'a E,
    /// Position of the entry in the descriptor.
    pub index: usize,
    /// Whether this is the synthesized default object.
    pub is_default: bool,
}

impl<E> Clone for Target<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Target<'_, E> {}

/// Expands entries into named and default targets, in declaration order.
#[must_use]
pub fn expand_defaults<E: NamedEntry>(entries: &[E]) -> Vec<Target<'_, E>> {
    entries
        .iter()
        .enumerate()
        .flat_map(|(index, entry)| {
            [
                Target {
                    name: entry.name(),
                    entry,
                    index,
                    is_default: false,
                },
                Target {
                    name: DEFAULT_NAME,
                    entry,
                    index,
                    is_default: true,
                },
            ]
        })
        .collect()
}
