// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-node validity flags and the edit permissions derived from them.

use crate::backing::{BackingStore, SceneProbe};
use crate::events::IndexEvent;
use crate::index::SequenceIndex;
use crate::node::NodeId;
use bitflags::bitflags;
use std::collections::HashMap;
use std::fmt;

bitflags! {
    /// Problems detected on a node. The empty set means valid
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Validity: u8 {
        /// The node's timeline no longer resolves
        const MISSING_BACKING_OBJECT = 1 << 0;
        /// The timeline resolves but is not instantiated in the scene
        const MISSING_GAME_REPRESENTATION = 1 << 1;
        /// An ancestor lost its timeline, or the node was cut from its parent
        const ORPHAN = 1 << 2;
    }
}

impl Validity {
    /// No problem detected
    pub const VALID: Self = Self::empty();

    /// Whether no flag is set
    pub fn is_valid(&self) -> bool {
        self.is_empty()
    }

    /// Human-readable flag names, for logs and tree listings
    pub fn labels(&self) -> Vec<&'static str> {
        self.iter_names()
            .map(|(name, _)| match name {
                "MISSING_BACKING_OBJECT" => "missing timeline",
                "MISSING_GAME_REPRESENTATION" => "not in scene",
                "ORPHAN" => "orphan",
                other => other,
            })
            .collect()
    }
}

bitflags! {
    /// Edits a node accepts in its current state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EditionStatus: u8 {
        /// The node can be renamed
        const CAN_RENAME = 1 << 0;
        /// The node can be deleted
        const CAN_DELETE = 1 << 1;
        /// Children can be created under the node
        const CAN_CREATE = 1 << 2;
        /// The node's timeline can be opened and edited
        const CAN_MANIPULATE = 1 << 3;
    }
}

impl EditionStatus {
    /// Permissions granted for a validity state.
    ///
    /// A valid node accepts every edit. An invalid one can only be
    /// deleted, and only while no ancestor is missing, so broken entries
    /// can be cleaned up from the top.
    pub fn from_validity(validity: Validity) -> Self {
        if validity.is_valid() {
            return Self::all();
        }
        if validity.contains(Validity::ORPHAN) {
            Self::empty()
        } else {
            Self::CAN_DELETE
        }
    }

    /// Whether the action is permitted
    pub fn allows(&self, action: EditAction) -> bool {
        self.contains(action.required_status())
    }
}

/// Edits gated by [`EditionStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditAction {
    /// Rename the sequence
    Rename,
    /// Delete the sequence and its children
    Delete,
    /// Create a child sequence
    Create,
    /// Open the sequence for editing
    Manipulate,
}

impl EditAction {
    /// Flag required to perform this action
    pub fn required_status(&self) -> EditionStatus {
        match self {
            EditAction::Rename => EditionStatus::CAN_RENAME,
            EditAction::Delete => EditionStatus::CAN_DELETE,
            EditAction::Create => EditionStatus::CAN_CREATE,
            EditAction::Manipulate => EditionStatus::CAN_MANIPULATE,
        }
    }
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            EditAction::Rename => "rename",
            EditAction::Delete => "delete",
            EditAction::Create => "create a child under",
            EditAction::Manipulate => "edit",
        };
        f.write_str(verb)
    }
}

/// Compute the validity of one indexed node from scratch
pub fn compute_validity<S, P>(index: &SequenceIndex, store: &S, scene: &P, id: NodeId) -> Validity
where
    S: BackingStore + ?Sized,
    P: SceneProbe + ?Sized,
{
    let table = index.table();
    let Some(node) = table.get(id) else {
        return Validity::VALID;
    };

    let mut validity = Validity::empty();
    if !store.resolves(node.backing) {
        validity |= Validity::MISSING_BACKING_OBJECT;
    } else if !scene.is_instantiated(node.backing) {
        validity |= Validity::MISSING_GAME_REPRESENTATION;
    }

    let cut_off = node.detached_from().is_some()
        || table.ancestors(id).into_iter().any(|a| {
            table
                .get(a)
                .is_some_and(|a| a.detached_from().is_some() || !store.resolves(a.backing))
        });
    if cut_off {
        validity |= Validity::ORPHAN;
    }
    validity
}

/// Last computed validity of every indexed node
#[derive(Debug, Clone, Default)]
pub struct ValidityEngine {
    states: HashMap<NodeId, Validity>,
}

impl ValidityEngine {
    /// Create an engine with no recorded state
    pub fn new() -> Self {
        Self::default()
    }

    /// Last computed validity. Nodes never computed read as valid
    pub fn get(&self, id: NodeId) -> Validity {
        self.states.get(&id).copied().unwrap_or(Validity::VALID)
    }

    /// Permissions derived from the last computed validity
    pub fn edition_status(&self, id: NodeId) -> EditionStatus {
        EditionStatus::from_validity(self.get(id))
    }

    /// Number of nodes with at least one flag set
    pub fn invalid_count(&self) -> usize {
        self.states.values().filter(|v| !v.is_valid()).count()
    }

    /// Forget every recorded state
    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Recompute every registered node and emit one
    /// [`IndexEvent::ValidityChanged`] if any flag flipped.
    ///
    /// Returns whether anything changed.
    pub fn recompute<S, P>(&mut self, index: &SequenceIndex, store: &S, scene: &P) -> bool
    where
        S: BackingStore + ?Sized,
        P: SceneProbe + ?Sized,
    {
        let mut next = HashMap::with_capacity(index.len());
        let mut changed = false;

        for node in index.nodes() {
            let validity = compute_validity(index, store, scene, node.id);
            let previous = self.states.get(&node.id).copied().unwrap_or(Validity::VALID);
            if previous != validity {
                tracing::debug!(
                    "Validity of {:?} changed from {:?} to {:?}",
                    node.id,
                    previous,
                    validity
                );
                changed = true;
            }
            next.insert(node.id, validity);
        }

        self.states = next;
        if changed {
            index.bus().emit(IndexEvent::ValidityChanged);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_node_can_do_everything() {
        assert_eq!(EditionStatus::from_validity(Validity::VALID), EditionStatus::all());
    }

    #[test]
    fn test_missing_backing_only_allows_delete() {
        let status = EditionStatus::from_validity(Validity::MISSING_BACKING_OBJECT);
        assert_eq!(status, EditionStatus::CAN_DELETE);
        assert!(!status.allows(EditAction::Rename));
        assert!(!status.allows(EditAction::Create));

        let status = EditionStatus::from_validity(Validity::MISSING_GAME_REPRESENTATION);
        assert_eq!(status, EditionStatus::CAN_DELETE);
    }

    #[test]
    fn test_orphan_accepts_no_edit() {
        assert_eq!(
            EditionStatus::from_validity(Validity::ORPHAN),
            EditionStatus::empty()
        );
        let status =
            EditionStatus::from_validity(Validity::MISSING_BACKING_OBJECT | Validity::ORPHAN);
        assert!(!status.allows(EditAction::Delete));
        assert!(!status.allows(EditAction::Rename));
    }

    #[test]
    fn test_labels() {
        let validity = Validity::MISSING_GAME_REPRESENTATION | Validity::ORPHAN;
        assert_eq!(validity.labels(), vec!["not in scene", "orphan"]);
        assert!(Validity::VALID.labels().is_empty());
    }
}
