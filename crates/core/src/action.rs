//! Refinement actions - one corrective edit per iteration.

use crate::assignment::Slot;
use crate::id::PartId;
use serde::{Deserialize, Serialize};

/// Which tuning adapter applies an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lever {
    /// Promoter strength predictor/optimizer
    Promoter,
    /// Ribosome binding site calculator
    Rbs,
}

impl std::fmt::Display for Lever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lever::Promoter => write!(f, "promoter"),
            Lever::Rbs => write!(f, "rbs"),
        }
    }
}

/// Quantitative parameter targeted by a tuning edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunedParameter {
    /// Promoter basal (leaky) activity
    Basal,
    /// Promoter maximal activity
    Strength,
    /// Translation initiation rate
    Translation,
    /// Expression kinetics
    Rate,
}

impl TunedParameter {
    /// Adapter responsible for this parameter.
    pub fn lever(self) -> Lever {
        match self {
            TunedParameter::Basal | TunedParameter::Strength => Lever::Promoter,
            TunedParameter::Translation | TunedParameter::Rate => Lever::Rbs,
        }
    }
}

impl std::fmt::Display for TunedParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TunedParameter::Basal => write!(f, "basal"),
            TunedParameter::Strength => write!(f, "strength"),
            TunedParameter::Translation => write!(f, "translation"),
            TunedParameter::Rate => write!(f, "rate"),
        }
    }
}

/// Direction of a tuning edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Raise the parameter
    Increase,
    /// Lower the parameter
    Decrease,
}

/// The edit itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    /// Swap the part in `slot` for another one, never `exclude` again
    Reassign {
        /// Slot to refill
        slot: Slot,
        /// Part that must not be used in this slot
        exclude: PartId,
    },

    /// Scale one parameter of the part in `slot` by `factor`
    Tune {
        /// Slot to edit
        slot: Slot,
        /// Parameter to change
        parameter: TunedParameter,
        /// Direction of the change
        direction: Direction,
        /// Multiplicative factor (< 1 for decreases, > 1 for increases)
        factor: f64,
    },

    /// Design meets its spec; stop
    Accept,
}

/// One corrective hypothesis chosen in response to a Diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementAction {
    /// The edit
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Why this edit was chosen
    pub rationale: String,
}

impl RefinementAction {
    /// Terminal accept action.
    pub fn accept(rationale: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Accept,
            rationale: rationale.into(),
        }
    }

    /// Whether this stops the loop.
    pub fn is_accept(&self) -> bool {
        matches!(self.kind, ActionKind::Accept)
    }

    /// Targeted slot, if any.
    pub fn slot(&self) -> Option<&Slot> {
        match &self.kind {
            ActionKind::Reassign { slot, .. } | ActionKind::Tune { slot, .. } => Some(slot),
            ActionKind::Accept => None,
        }
    }

    /// Lever and direction of a tuning edit.
    pub fn tuning(&self) -> Option<(Lever, Direction)> {
        match &self.kind {
            ActionKind::Tune { parameter, direction, .. } => Some((parameter.lever(), *direction)),
            _ => None,
        }
    }
}

impl std::fmt::Display for RefinementAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ActionKind::Reassign { slot, exclude } => write!(f, "reassign {} (exclude {})", slot, exclude),
            ActionKind::Tune { slot, parameter, direction, factor } => {
                let verb = match direction {
                    Direction::Increase => "increase",
                    Direction::Decrease => "decrease",
                };
                write!(f, "{} {} {} of {} x{:.3}", verb, parameter.lever(), parameter, slot, factor)
            }
            ActionKind::Accept => write!(f, "accept"),
        }
    }
}
