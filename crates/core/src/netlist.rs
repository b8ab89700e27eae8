//! Gate-level netlist of a circuit.

use crate::error::NetlistError;
use crate::id::GateId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Logic function of a repressor gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// One input promoter
    Not,
    /// Tandem input promoters
    Nor,
}

/// A promoter signal in the netlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum Signal {
    /// Sensor promoter of a circuit input
    Input(String),
    /// Output promoter of a gate
    Gate(GateId),
    /// Always-on promoter
    Constitutive,
}

/// A repressor gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    /// Gate id
    pub id: GateId,
    /// Logic function
    pub kind: GateKind,
    /// Promoters driving the repressor
    pub inputs: Vec<Signal>,
}

/// Promoters driving one output reporter (tandem promoters act as OR).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputWiring {
    /// Output reporter name
    pub output: String,
    /// Driving promoters; empty means the output is never expressed
    pub drivers: Vec<Signal>,
}

/// Gates plus output wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Netlist {
    /// Gates, in creation order
    pub gates: Vec<Gate>,
    /// One wiring per output
    pub outputs: Vec<OutputWiring>,
}

impl Netlist {
    /// Look up a gate.
    pub fn gate(&self, id: &GateId) -> Option<&Gate> {
        self.gates.iter().find(|g| &g.id == id)
    }

    /// Wiring of an output.
    pub fn wiring(&self, output: &str) -> Option<&OutputWiring> {
        self.outputs.iter().find(|w| w.output == output)
    }

    /// Input names referenced anywhere in the netlist.
    pub fn referenced_inputs(&self) -> BTreeSet<String> {
        self.gates
            .iter()
            .flat_map(|g| g.inputs.iter())
            .chain(self.outputs.iter().flat_map(|w| w.drivers.iter()))
            .filter_map(|s| match s {
                Signal::Input(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Gates ordered so every gate comes after the gates it reads.
    pub fn topological_order(&self) -> Result<Vec<&Gate>, NetlistError> {
        let index: HashMap<&GateId, usize> =
            self.gates.iter().enumerate().map(|(i, g)| (&g.id, i)).collect();

        for signal in self.gates.iter().flat_map(|g| g.inputs.iter())
            .chain(self.outputs.iter().flat_map(|w| w.drivers.iter()))
        {
            if let Signal::Gate(id) = signal {
                if !index.contains_key(id) {
                    return Err(NetlistError::UnknownGate(id.to_string()));
                }
            }
        }

        // 0 = unvisited, 1 = on stack, 2 = done
        let mut mark = vec![0u8; self.gates.len()];
        let mut order = Vec::with_capacity(self.gates.len());

        fn visit<'a>(
            i: usize,
            gates: &'a [Gate],
            index: &HashMap<&GateId, usize>,
            mark: &mut [u8],
            order: &mut Vec<&'a Gate>,
        ) -> Result<(), NetlistError> {
            match mark[i] {
                2 => return Ok(()),
                1 => return Err(NetlistError::Cycle(gates[i].id.to_string())),
                _ => {}
            }
            mark[i] = 1;
            for input in &gates[i].inputs {
                if let Signal::Gate(id) = input {
                    visit(index[id], gates, index, mark, order)?;
                }
            }
            mark[i] = 2;
            order.push(&gates[i]);
            Ok(())
        }

        for i in 0..self.gates.len() {
            visit(i, &self.gates, &index, &mut mark, &mut order)?;
        }
        Ok(order)
    }

    /// Every signal upstream of an output, drivers included.
    pub fn upstream(&self, output: &str) -> BTreeSet<Signal> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<Signal> = self
            .wiring(output)
            .map(|w| w.drivers.clone())
            .unwrap_or_default();

        while let Some(signal) = stack.pop() {
            if !seen.insert(signal.clone()) {
                continue;
            }
            if let Signal::Gate(id) = &signal {
                if let Some(gate) = self.gate(id) {
                    stack.extend(gate.inputs.iter().cloned());
                }
            }
        }
        seen
    }
}
