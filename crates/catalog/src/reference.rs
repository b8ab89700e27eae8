//! Built-in E. coli reference library.
//!
//! Response parameters are rounded reference values in RPU for the NOT/NOR
//! repressor family, inducible sensors and fluorescent reporters.

use crate::registry::PartCatalog;
use geneforge_core::{Expression, HillResponse, Part, PartId, PartKind, DEFAULT_LIBRARY, DEFAULT_ORGANISM};

fn sensor(id: &str, signal: &str, off: f64, on: f64) -> Part {
    Part {
        id: PartId::new(id),
        name: id.to_string(),
        organism: DEFAULT_ORGANISM.to_string(),
        kind: PartKind::Sensor {
            signal: signal.to_string(),
            off,
            on,
        },
        expression: Expression::default(),
        sequence: None,
    }
}

fn gate(id: &str, repressor: &str, ymax: f64, ymin: f64, k: f64, n: f64, rate: f64) -> Part {
    Part {
        id: PartId::new(id),
        name: repressor.to_string(),
        organism: DEFAULT_ORGANISM.to_string(),
        kind: PartKind::Gate {
            repressor: repressor.to_string(),
            promoter: format!("p{}", repressor),
            response: HillResponse { ymax, ymin, k, n },
        },
        expression: Expression { translation: 1.0, rate },
        sequence: None,
    }
}

fn reporter(id: &str, protein: &str, rate: f64) -> Part {
    Part {
        id: PartId::new(id),
        name: protein.to_string(),
        organism: DEFAULT_ORGANISM.to_string(),
        kind: PartKind::Reporter {
            protein: protein.to_string(),
        },
        expression: Expression { translation: 1.0, rate },
        sequence: None,
    }
}

/// Reference parts for [`DEFAULT_LIBRARY`].
pub fn reference_parts() -> Vec<Part> {
    vec![
        sensor("pTac", "IPTG", 0.0034, 2.8),
        sensor("pTet", "aTc", 0.0013, 4.4),
        sensor("pBAD", "arabinose", 0.0082, 2.5),
        sensor("pLuxStar", "AHL", 0.025, 0.31),
        gate("A1_AmtR", "AmtR", 3.8, 0.06, 0.07, 1.6, 0.9),
        gate("B3_BM3R1", "BM3R1", 3.8, 0.01, 0.24, 2.75, 0.8),
        gate("E1_BetI", "BetI", 3.8, 0.07, 0.41, 2.4, 1.0),
        gate("H1_HlyIIR", "HlyIIR", 3.1, 0.02, 0.36, 2.2, 1.1),
        gate("L1_LitR", "LitR", 4.3, 0.07, 0.05, 1.7, 0.9),
        gate("P3_PhlF", "PhlF", 6.8, 0.02, 0.23, 4.2, 1.0),
        gate("Q2_QacR", "QacR", 5.9, 0.03, 0.21, 2.4, 1.2),
        gate("R1_PsrA", "PsrA", 5.2, 0.2, 0.18, 2.0, 1.0),
        gate("S4_SrpR", "SrpR", 5.9, 0.007, 0.19, 2.9, 0.7),
        reporter("YFP", "YFP", 0.8),
        reporter("GFP", "GFP", 0.8),
        reporter("RFP", "RFP", 0.6),
    ]
}

/// The built-in reference catalog.
pub fn reference_catalog() -> PartCatalog {
    // Reference parts are static and satisfy every catalog check.
    match PartCatalog::new(DEFAULT_LIBRARY, reference_parts()) {
        Ok(catalog) => catalog,
        Err(e) => unreachable!("reference library is invalid: {}", e),
    }
}
