//! Built-in catalog-driven synthesizer.
//!
//! Builds a sum-of-products NOR/NOT netlist from the truth table and fills
//! every slot from the part catalog. Each product term is one NOR gate over
//! the complemented literals; the terms of an output drive its reporter as
//! tandem promoters. Each request names the library it draws from.

use super::r#trait::{AdapterError, CircuitSynthesizer, SynthesisRequest};
use async_trait::async_trait;
use geneforge_catalog::{CatalogSet, PartCatalog};
use geneforge_core::{
    AssignedPart, CircuitSpec, Gate, GateId, GateKind, Netlist, OutputWiring, Part, PartAssignment,
    PartId, PartRole, Signal, Slot,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A product term: `(input index, required value)` per literal.
type Term = Vec<(usize, bool)>;

/// Synthesizer backed by a [`CatalogSet`].
pub struct NetlistSynthesizer {
    catalogs: CatalogSet,
}

impl NetlistSynthesizer {
    /// Create a synthesizer over one or more part libraries.
    pub fn new(catalogs: impl Into<CatalogSet>) -> Self {
        Self {
            catalogs: catalogs.into(),
        }
    }

    /// The libraries in use.
    pub fn catalogs(&self) -> &CatalogSet {
        &self.catalogs
    }

    /// Candidate parts for a slot, in preference order.
    fn candidates<'a>(catalog: &'a PartCatalog, spec: &CircuitSpec, slot: &Slot) -> Vec<&'a Part> {
        let mut parts = catalog.by_role(&spec.organism, slot.role());
        // by_role is already id-ordered and the sorts below are stable
        match slot {
            Slot::Gate(_) => {
                parts.sort_by(|a, b| b.dynamic_range().total_cmp(&a.dynamic_range()));
            }
            Slot::Sensor(name) => {
                parts.sort_by(|a, b| {
                    matches_signal(b, name)
                        .cmp(&matches_signal(a, name))
                        .then_with(|| b.dynamic_range().total_cmp(&a.dynamic_range()))
                });
            }
            Slot::Reporter(name) => {
                parts.sort_by_key(|p| !matches_signal(p, name));
            }
        }
        parts
    }

    fn assign(
        catalog: &PartCatalog,
        request: &SynthesisRequest,
        netlist: Netlist,
    ) -> Result<PartAssignment, AdapterError> {
        let mut assignment = PartAssignment {
            netlist,
            parts: BTreeMap::new(),
        };
        let slots = assignment.required_slots();
        let mut used: HashSet<PartId> = HashSet::new();

        if let Some(base) = &request.base {
            for slot in &slots {
                if let Some(part) = base.part(slot) {
                    if !request.is_excluded(slot, part.id()) && used.insert(part.id().clone()) {
                        assignment.parts.insert(slot.clone(), part.clone());
                    }
                }
            }
        }

        for slot in &slots {
            if assignment.parts.contains_key(slot) {
                continue;
            }
            let part = Self::candidates(catalog, &request.spec, slot)
                .into_iter()
                .find(|p| !used.contains(&p.id) && !request.is_excluded(slot, &p.id))
                .ok_or_else(|| {
                    AdapterError::Unsatisfiable(format!(
                        "no {} part left for {} in {} ({})",
                        slot.role(),
                        slot,
                        catalog.library(),
                        request.spec.organism
                    ))
                })?;
            used.insert(part.id.clone());
            assignment.parts.insert(slot.clone(), AssignedPart::from_catalog(part.clone()));
        }

        assignment
            .validate()
            .map_err(|e| AdapterError::Unsatisfiable(e.to_string()))?;
        Ok(assignment)
    }
}

fn matches_signal(part: &Part, name: &str) -> bool {
    part.signal_name().eq_ignore_ascii_case(name) || part.id.as_str().eq_ignore_ascii_case(name)
}

/// Inputs whose value can change `output` in the listed rows.
///
/// An input is dropped only when every row has its flipped neighbor listed
/// with the same output value.
fn relevant_inputs(spec: &CircuitSpec, output: usize) -> Vec<usize> {
    let table: HashMap<&[bool], bool> = spec
        .truth_table
        .iter()
        .map(|row| (row.inputs.as_slice(), row.outputs[output]))
        .collect();

    (0..spec.inputs.len())
        .filter(|&i| {
            spec.truth_table.iter().any(|row| {
                let mut flipped = row.inputs.clone();
                flipped[i] = !flipped[i];
                table.get(flipped.as_slice()) != Some(&row.outputs[output])
            })
        })
        .collect()
}

/// Product terms covering the ON rows of an output, without duplicates.
fn product_terms(spec: &CircuitSpec, output: usize) -> Vec<Term> {
    let relevant = relevant_inputs(spec, output);
    let mut terms: Vec<Term> = Vec::new();
    for row in spec.truth_table.iter().filter(|r| r.outputs[output]) {
        let term: Term = relevant.iter().map(|&i| (i, row.inputs[i])).collect();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

#[derive(Default)]
struct NetlistBuilder {
    gates: Vec<Gate>,
    inverters: HashMap<usize, GateId>,
    nors: HashMap<Vec<Signal>, GateId>,
}

impl NetlistBuilder {
    fn add_gate(&mut self, kind: GateKind, inputs: Vec<Signal>) -> GateId {
        let id = GateId::nth(self.gates.len() + 1);
        self.gates.push(Gate {
            id: id.clone(),
            kind,
            inputs,
        });
        id
    }

    /// Gate computing NOT(input), shared across terms.
    fn inverter(&mut self, spec: &CircuitSpec, input: usize) -> Signal {
        if let Some(id) = self.inverters.get(&input) {
            return Signal::Gate(id.clone());
        }
        let id = self.add_gate(GateKind::Not, vec![Signal::Input(spec.inputs[input].clone())]);
        self.inverters.insert(input, id.clone());
        Signal::Gate(id)
    }

    /// Promoter signal that is ON exactly when `term` holds.
    fn term_signal(&mut self, spec: &CircuitSpec, term: &Term) -> Signal {
        match term.as_slice() {
            [] => Signal::Constitutive,
            [(i, true)] => Signal::Input(spec.inputs[*i].clone()),
            [(i, false)] => self.inverter(spec, *i),
            literals => {
                // AND(l1..ln) = NOR(!l1..!ln)
                let inputs: Vec<Signal> = literals
                    .iter()
                    .map(|(i, value)| {
                        if *value {
                            self.inverter(spec, *i)
                        } else {
                            Signal::Input(spec.inputs[*i].clone())
                        }
                    })
                    .collect();
                if let Some(id) = self.nors.get(&inputs) {
                    return Signal::Gate(id.clone());
                }
                let id = self.add_gate(GateKind::Nor, inputs.clone());
                self.nors.insert(inputs, id.clone());
                Signal::Gate(id)
            }
        }
    }
}

/// Build the netlist for a spec.
pub fn build_netlist(spec: &CircuitSpec) -> Result<Netlist, AdapterError> {
    spec.validate()
        .map_err(|e| AdapterError::Unsatisfiable(e.to_string()))?;

    let mut builder = NetlistBuilder::default();
    let mut outputs = Vec::with_capacity(spec.outputs.len());

    for (o, name) in spec.outputs.iter().enumerate() {
        let terms = product_terms(spec, o);
        if terms.is_empty() {
            return Err(AdapterError::Unsatisfiable(format!(
                "output {} is never ON and has no realizable driver",
                name
            )));
        }
        let mut drivers = Vec::with_capacity(terms.len());
        for term in &terms {
            let signal = builder.term_signal(spec, term);
            if !drivers.contains(&signal) {
                drivers.push(signal);
            }
        }
        outputs.push(OutputWiring {
            output: name.clone(),
            drivers,
        });
    }

    Ok(Netlist {
        gates: builder.gates,
        outputs,
    })
}

#[async_trait]
impl CircuitSynthesizer for NetlistSynthesizer {
    fn name(&self) -> &str {
        "netlist"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<PartAssignment, AdapterError> {
        let catalog = self.catalogs.get(&request.library).ok_or_else(|| {
            AdapterError::Unsatisfiable(format!(
                "unknown part library '{}' (loaded: {})",
                request.library,
                self.catalogs.libraries().join(", ")
            ))
        })?;

        let netlist = match &request.base {
            Some(base) => base.netlist.clone(),
            None => build_netlist(&request.spec)?,
        };

        let gates = netlist.gates.len();
        let available = catalog.by_role(&request.spec.organism, PartRole::Gate).len();
        if gates > available {
            return Err(AdapterError::Unsatisfiable(format!(
                "{} gates needed, {} repressors available for {}",
                gates, available, request.spec.organism
            )));
        }

        let assignment = Self::assign(catalog, request, netlist)?;
        tracing::debug!(
            "Synthesized {} with {} gates and {} parts",
            request.spec.name,
            assignment.netlist.gates.len(),
            assignment.parts.len()
        );
        Ok(assignment)
    }
}
