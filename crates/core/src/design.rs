//! Design versions - the append-only revision history of a circuit.

use crate::action::RefinementAction;
use crate::assignment::PartAssignment;
use crate::id::VersionId;
use crate::Time;
use serde::{Deserialize, Serialize};

/// How a version came to be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum Provenance {
    /// First assignment from the synthesizer
    Initial,

    /// Produced by applying a refinement action to the parent
    Refinement {
        /// Action that was applied
        action: RefinementAction,
        /// The planned tuning hit a library bound and became a reassignment
        #[serde(default)]
        escalated: bool,
    },
}

/// One revision of a circuit design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignVersion {
    /// Unique identifier
    pub id: VersionId,

    /// Revision number (0 for the initial design)
    pub revision: u32,

    /// Version this one was derived from
    pub parent: Option<VersionId>,

    /// What produced this version
    pub provenance: Provenance,

    /// The part assignment
    pub assignment: PartAssignment,

    /// When created
    pub created_at: Time,
}

impl DesignVersion {
    /// First version of a design.
    pub fn initial(assignment: PartAssignment) -> Self {
        Self {
            id: VersionId::new(),
            revision: 0,
            parent: None,
            provenance: Provenance::Initial,
            assignment,
            created_at: chrono::Utc::now(),
        }
    }

    /// Next version derived from this one. `self` is not modified.
    pub fn derive(&self, assignment: PartAssignment, provenance: Provenance) -> Self {
        Self {
            id: VersionId::new(),
            revision: self.revision + 1,
            parent: Some(self.id),
            provenance,
            assignment,
            created_at: chrono::Utc::now(),
        }
    }

    /// Action that produced this version, if any.
    pub fn action(&self) -> Option<&RefinementAction> {
        match &self.provenance {
            Provenance::Initial => None,
            Provenance::Refinement { action, .. } => Some(action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::Netlist;

    #[test]
    fn test_derive_links_parent() {
        let empty = PartAssignment { netlist: Netlist::default(), parts: Default::default() };
        let v0 = DesignVersion::initial(empty.clone());
        let v1 = v0.derive(empty, Provenance::Refinement {
            action: RefinementAction::accept("x"),
            escalated: false,
        });
        assert_eq!(v1.revision, 1);
        assert_eq!(v1.parent, Some(v0.id));
        assert_ne!(v1.id, v0.id);
        assert!(v0.action().is_none());
        assert!(v1.action().is_some());
    }
}
