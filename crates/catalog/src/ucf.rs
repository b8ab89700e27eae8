//! Cello UCF library import.
//!
//! A UCF library is a JSON array of records tagged by `collection`. Gates,
//! their response models, input sensors and output devices are mapped into
//! catalog parts; every other collection (parts, layout rules, cytometry)
//! is ignored. Sensors and reporters may live in sibling `.input.json` and
//! `.output.json` files, which use the same record layout.

use crate::registry::{CatalogError, PartCatalog};
use geneforge_core::{Expression, HillResponse, Part, PartId, PartKind, DEFAULT_ORGANISM};
use serde::Deserialize;
use std::collections::HashMap;

/// Library id prefixes and the organism they name.
const ORGANISM_PREFIXES: &[(&str, &str)] = &[
    ("Eco", DEFAULT_ORGANISM),
    ("SC", "S. cerevisiae"),
    ("Bth", "B. thetaiotaomicron"),
];

/// Sensor regulators and the inducer they respond to.
const INDUCERS: &[(&str, &str)] = &[
    ("LacI", "IPTG"),
    ("TetR", "aTc"),
    ("AraC", "arabinose"),
    ("LuxR", "AHL"),
];

#[derive(Debug, Deserialize)]
struct Record {
    collection: String,
    #[serde(flatten)]
    body: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct Parameter {
    name: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    organism: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Gate {
    #[serde(alias = "gate_name")]
    name: String,
    regulator: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Model {
    name: String,
    #[serde(default)]
    parameters: Vec<Parameter>,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    gate_name: String,
    #[serde(default)]
    parameters: Vec<Parameter>,
}

#[derive(Debug, Deserialize)]
struct Device {
    name: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    parameters: Vec<Parameter>,
}

/// Records gathered from one or more UCF files.
#[derive(Default)]
struct Collections {
    organism: Option<String>,
    gates: Vec<Gate>,
    models: HashMap<String, Vec<Parameter>>,
    sensors: Vec<Device>,
    reporters: Vec<Device>,
}

impl Collections {
    fn add(&mut self, json: &str) -> Result<(), CatalogError> {
        let records: Vec<Record> = serde_json::from_str(json)?;
        for record in records {
            match record.collection.as_str() {
                "header" => {
                    let header: Header = serde_json::from_value(record.body)?;
                    if self.organism.is_none() {
                        self.organism = header.organism;
                    }
                }
                "gates" => self.gates.push(serde_json::from_value(record.body)?),
                "models" => {
                    let model: Model = serde_json::from_value(record.body)?;
                    self.models.insert(model.name, model.parameters);
                }
                "response_functions" => {
                    let function: ResponseFunction = serde_json::from_value(record.body)?;
                    self.models.insert(function.gate_name, function.parameters);
                }
                "input_sensors" => self.sensors.push(serde_json::from_value(record.body)?),
                "output_devices" => self.reporters.push(serde_json::from_value(record.body)?),
                _ => {}
            }
        }
        Ok(())
    }

    /// Parameters for a record: its named model, `<name>_model`, or a
    /// response function keyed by the record name.
    fn parameters<'a>(&'a self, name: &str, model: Option<&str>, inline: &'a [Parameter]) -> &'a [Parameter] {
        if !inline.is_empty() {
            return inline;
        }
        model
            .and_then(|m| self.models.get(m))
            .or_else(|| self.models.get(&format!("{}_model", name)))
            .or_else(|| self.models.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn value(parameters: &[Parameter], record: &str, name: &str) -> Result<f64, CatalogError> {
    parameters
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .map(|p| p.value)
        .ok_or_else(|| CatalogError::Ucf(format!("{} has no '{}' parameter", record, name)))
}

/// Organism named by a library id prefix, e.g. `Eco1C1G1T1`.
pub fn organism_for_library(library: &str) -> Option<&'static str> {
    ORGANISM_PREFIXES
        .iter()
        .find(|(prefix, _)| library.starts_with(prefix))
        .map(|(_, organism)| *organism)
}

fn inducer(regulator: &str) -> String {
    INDUCERS
        .iter()
        .find(|(r, _)| r.eq_ignore_ascii_case(regulator))
        .map(|(_, signal)| signal.to_string())
        .unwrap_or_else(|| regulator.to_string())
}

/// Build a catalog from the text of a UCF file and its optional input and
/// output companions.
pub fn parse_ucf(library: &str, documents: &[&str]) -> Result<PartCatalog, CatalogError> {
    let mut collections = Collections::default();
    for json in documents {
        collections.add(json)?;
    }

    let organism = organism_for_library(library)
        .map(str::to_string)
        .or_else(|| collections.organism.clone())
        .unwrap_or_else(|| DEFAULT_ORGANISM.to_string());

    let mut parts = Vec::new();
    for gate in &collections.gates {
        let params = collections.parameters(&gate.name, gate.model.as_deref(), &[]);
        let response = HillResponse {
            ymax: value(params, &gate.name, "ymax")?,
            ymin: value(params, &gate.name, "ymin")?,
            k: value(params, &gate.name, "K")?,
            n: value(params, &gate.name, "n")?,
        };
        parts.push(Part {
            id: PartId::new(gate.name.clone()),
            name: gate.regulator.clone(),
            organism: organism.clone(),
            kind: PartKind::Gate {
                repressor: gate.regulator.clone(),
                promoter: format!("p{}", gate.regulator),
                response,
            },
            expression: Expression::default(),
            sequence: None,
        });
    }

    for sensor in &collections.sensors {
        let params = collections.parameters(&sensor.name, sensor.model.as_deref(), &sensor.parameters);
        let regulator = sensor.name.trim_end_matches("_sensor");
        parts.push(Part {
            id: PartId::new(sensor.name.clone()),
            name: regulator.to_string(),
            organism: organism.clone(),
            kind: PartKind::Sensor {
                signal: inducer(regulator),
                off: value(params, &sensor.name, "ymin")?,
                on: value(params, &sensor.name, "ymax")?,
            },
            expression: Expression::default(),
            sequence: None,
        });
    }

    for device in &collections.reporters {
        let protein = device.name.trim_end_matches("_reporter");
        parts.push(Part {
            id: PartId::new(device.name.clone()),
            name: protein.to_string(),
            organism: organism.clone(),
            kind: PartKind::Reporter {
                protein: protein.to_string(),
            },
            expression: Expression::default(),
            sequence: None,
        });
    }

    tracing::debug!(
        "Parsed UCF library {}: {} gates, {} sensors, {} reporters",
        library,
        collections.gates.len(),
        collections.sensors.len(),
        collections.reporters.len()
    );
    PartCatalog::new(library, parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geneforge_core::PartRole;

    const UCF: &str = r#"[
        {"collection": "header", "organism": "Escherichia coli NEB 10-beta", "version": "Eco1C1G1T1"},
        {"collection": "gates", "name": "P3_PhlF", "regulator": "PhlF", "group": "PhlF", "gate_type": "NOR", "model": "P3_PhlF_model"},
        {"collection": "models", "name": "P3_PhlF_model", "parameters": [
            {"name": "ymax", "value": 6.8}, {"name": "ymin", "value": 0.02},
            {"name": "K", "value": 0.23}, {"name": "n", "value": 4.2}, {"name": "alpha", "value": 1.0}
        ]},
        {"collection": "parts", "type": "promoter", "name": "pPhlF", "dnasequence": "CGACGTACGG"}
    ]"#;

    const INPUT: &str = r#"[
        {"collection": "input_sensors", "name": "LacI_sensor", "model": "LacI_sensor_model"},
        {"collection": "models", "name": "LacI_sensor_model", "parameters": [
            {"name": "ymax", "value": 2.8}, {"name": "ymin", "value": 0.0034}
        ]}
    ]"#;

    const OUTPUT: &str = r#"[
        {"collection": "output_devices", "name": "YFP_reporter", "model": "YFP_reporter_model"}
    ]"#;

    #[test]
    fn test_v2_library_with_companions() {
        let catalog = parse_ucf("Eco1C1G1T1", &[UCF, INPUT, OUTPUT]).unwrap();
        assert_eq!(catalog.len(), 3);

        let gate = catalog.get(&PartId::new("P3_PhlF")).unwrap();
        assert_eq!(gate.organism, DEFAULT_ORGANISM);
        match &gate.kind {
            PartKind::Gate { repressor, response, .. } => {
                assert_eq!(repressor, "PhlF");
                assert_eq!(response.k, 0.23);
                assert_eq!(response.n, 4.2);
            }
            other => panic!("expected a gate, got {:?}", other),
        }

        let sensors = catalog.by_role(DEFAULT_ORGANISM, PartRole::Sensor);
        assert_eq!(sensors[0].signal_name(), "IPTG");
        assert_eq!(sensors[0].promoter_levels(), Some((0.0034, 2.8)));
        assert_eq!(catalog.by_role(DEFAULT_ORGANISM, PartRole::Reporter)[0].signal_name(), "YFP");
    }

    #[test]
    fn test_v1_response_functions() {
        let v1 = r#"[
            {"collection": "header", "organism": "Escherichia coli"},
            {"collection": "gates", "gate_name": "S4_SrpR", "regulator": "SrpR", "gate_type": "NOR"},
            {"collection": "response_functions", "gate_name": "S4_SrpR", "equation": "ymin+(ymax-ymin)/(1.0+(x/K)^n)",
             "parameters": [{"name": "ymax", "value": 5.9}, {"name": "ymin", "value": 0.007},
                            {"name": "K", "value": 0.19}, {"name": "n", "value": 2.9}]}
        ]"#;
        let catalog = parse_ucf("custom", &[v1]).unwrap();
        let gate = catalog.get(&PartId::new("S4_SrpR")).unwrap();
        assert_eq!(gate.promoter_levels(), Some((0.007, 5.9)));
        assert_eq!(gate.organism, "Escherichia coli");
    }

    #[test]
    fn test_missing_parameter_and_prefix() {
        let bare = r#"[{"collection": "gates", "name": "X1_Foo", "regulator": "Foo"}]"#;
        assert!(matches!(parse_ucf("Eco1C1G1T1", &[bare]), Err(CatalogError::Ucf(_))));
        assert_eq!(organism_for_library("SC1C1G1T1"), Some("S. cerevisiae"));
        assert_eq!(organism_for_library("custom"), None);
    }
}
