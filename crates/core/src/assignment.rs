//! Part assignment - which characterized part fills each netlist slot.

use crate::error::NetlistError;
use crate::id::{GateId, PartId};
use crate::netlist::{Netlist, Signal};
use crate::part::{Part, PartRole};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A position in the netlist that receives exactly one part.
///
/// Ordering (sensors, then gates, then reporters, each by name) is the
/// tie-break order used throughout refinement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Slot {
    /// Sensor for a circuit input
    Sensor(String),
    /// Repressor gate
    Gate(GateId),
    /// Reporter for a circuit output
    Reporter(String),
}

impl Slot {
    /// Slot owning a promoter signal (none for constitutive promoters).
    pub fn for_signal(signal: &Signal) -> Option<Slot> {
        match signal {
            Signal::Input(name) => Some(Slot::Sensor(name.clone())),
            Signal::Gate(id) => Some(Slot::Gate(id.clone())),
            Signal::Constitutive => None,
        }
    }

    /// Role of the part this slot accepts.
    pub fn role(&self) -> PartRole {
        match self {
            Slot::Sensor(_) => PartRole::Sensor,
            Slot::Gate(_) => PartRole::Gate,
            Slot::Reporter(_) => PartRole::Reporter,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Sensor(name) => write!(f, "sensor:{}", name),
            Slot::Gate(id) => write!(f, "gate:{}", id),
            Slot::Reporter(name) => write!(f, "reporter:{}", name),
        }
    }
}

impl std::str::FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("sensor", name)) if !name.is_empty() => Ok(Slot::Sensor(name.to_string())),
            Some(("gate", id)) if !id.is_empty() => Ok(Slot::Gate(GateId(id.to_string()))),
            Some(("reporter", name)) if !name.is_empty() => Ok(Slot::Reporter(name.to_string())),
            _ => Err(format!("invalid slot '{}'", s)),
        }
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}

impl TryFrom<String> for Slot {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Cumulative tuning factors relative to the catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// Promoter maximal strength
    pub strength: f64,
    /// Promoter basal activity
    pub basal: f64,
    /// RBS translation
    pub translation: f64,
    /// Kinetic rate
    pub rate: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            strength: 1.0,
            basal: 1.0,
            translation: 1.0,
            rate: 1.0,
        }
    }
}

/// A catalog part as placed in a design, possibly tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedPart {
    /// Current (possibly tuned) part
    pub part: Part,
    /// Tuning applied so far
    #[serde(default)]
    pub tuning: Tuning,
    /// Number of sequence variants derived from the catalog entry
    #[serde(default)]
    pub revision: u32,
}

impl AssignedPart {
    /// Place an untuned catalog part.
    pub fn from_catalog(part: Part) -> Self {
        Self {
            part,
            tuning: Tuning::default(),
            revision: 0,
        }
    }

    /// Catalog id of the underlying part.
    pub fn id(&self) -> &PartId {
        &self.part.id
    }

    /// Label like `P3_PhlF` or `P3_PhlF.v2`.
    pub fn label(&self) -> String {
        if self.revision == 0 {
            self.part.id.to_string()
        } else {
            format!("{}.v{}", self.part.id, self.revision)
        }
    }
}

/// Mapping from every netlist slot to a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartAssignment {
    /// Circuit topology
    pub netlist: Netlist,
    /// Part per slot
    pub parts: BTreeMap<Slot, AssignedPart>,
}

impl PartAssignment {
    /// Part in a slot.
    pub fn part(&self, slot: &Slot) -> Option<&AssignedPart> {
        self.parts.get(slot)
    }

    /// A copy with one slot replaced. The receiver is left untouched.
    pub fn with_part(&self, slot: Slot, part: AssignedPart) -> Self {
        let mut next = self.clone();
        next.parts.insert(slot, part);
        next
    }

    /// Slots the netlist requires, in slot order.
    pub fn required_slots(&self) -> BTreeSet<Slot> {
        let mut slots: BTreeSet<Slot> = self
            .netlist
            .referenced_inputs()
            .into_iter()
            .map(Slot::Sensor)
            .collect();
        slots.extend(self.netlist.gates.iter().map(|g| Slot::Gate(g.id.clone())));
        slots.extend(self.netlist.outputs.iter().map(|w| Slot::Reporter(w.output.clone())));
        slots
    }

    /// Slots whose promoters drive an output.
    pub fn driver_slots(&self, output: &str) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self
            .netlist
            .wiring(output)
            .map(|w| w.drivers.iter().filter_map(Slot::for_signal).collect())
            .unwrap_or_default();
        slots.sort();
        slots.dedup();
        slots
    }

    /// Sensor and gate slots upstream of an output, drivers included.
    pub fn upstream_slots(&self, output: &str) -> Vec<Slot> {
        self.netlist
            .upstream(output)
            .iter()
            .filter_map(Slot::for_signal)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Check every required slot is filled with a part of the right role
    /// and that no repressor is used twice.
    pub fn validate(&self) -> Result<(), NetlistError> {
        self.netlist.topological_order()?;

        for slot in self.required_slots() {
            let Some(assigned) = self.parts.get(&slot) else {
                return Err(NetlistError::Slot {
                    slot: slot.to_string(),
                    reason: "no part assigned".to_string(),
                });
            };
            if assigned.part.role() != slot.role() {
                return Err(NetlistError::Slot {
                    slot: slot.to_string(),
                    reason: format!("expected a {} part, got {}", slot.role(), assigned.part.role()),
                });
            }
            assigned.part.check_parameters().map_err(|reason| NetlistError::Slot {
                slot: slot.to_string(),
                reason,
            })?;
        }

        let mut repressors = HashSet::new();
        for (slot, assigned) in &self.parts {
            if matches!(slot, Slot::Gate(_)) && !repressors.insert(assigned.id().clone()) {
                return Err(NetlistError::Slot {
                    slot: slot.to_string(),
                    reason: format!("repressor {} is already used by another gate", assigned.id()),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_string_roundtrip() {
        for slot in [
            Slot::Sensor("A".into()),
            Slot::Gate(GateId::nth(2)),
            Slot::Reporter("GFP".into()),
        ] {
            let parsed: Slot = slot.to_string().parse().unwrap();
            assert_eq!(parsed, slot);
        }
        assert!("bogus".parse::<Slot>().is_err());
        assert!("gate:".parse::<Slot>().is_err());
    }

    #[test]
    fn test_slot_order_is_sensor_gate_reporter() {
        let mut slots = vec![
            Slot::Reporter("GFP".into()),
            Slot::Gate(GateId::nth(1)),
            Slot::Sensor("B".into()),
            Slot::Sensor("A".into()),
        ];
        slots.sort();
        assert_eq!(slots[0], Slot::Sensor("A".into()));
        assert_eq!(slots[2], Slot::Gate(GateId::nth(1)));
        assert_eq!(slots[3], Slot::Reporter("GFP".into()));
    }

    #[test]
    fn test_slot_is_a_json_map_key() {
        let mut map = BTreeMap::new();
        map.insert(Slot::Gate(GateId::nth(1)), 1.5f64);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"gate:g1":1.5}"#);
        let back: BTreeMap<Slot, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
