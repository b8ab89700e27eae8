//! Characterized genetic parts and their transfer functions.

use crate::id::PartId;
use serde::{Deserialize, Serialize};

/// Role a part plays in a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartRole {
    /// Inducible promoter reading an input signal
    Sensor,
    /// Repressor with its cognate output promoter
    Gate,
    /// Output reporter gene
    Reporter,
}

impl std::fmt::Display for PartRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartRole::Sensor => write!(f, "sensor"),
            PartRole::Gate => write!(f, "gate"),
            PartRole::Reporter => write!(f, "reporter"),
        }
    }
}

impl std::str::FromStr for PartRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sensor" => Ok(PartRole::Sensor),
            "gate" | "repressor" => Ok(PartRole::Gate),
            "reporter" => Ok(PartRole::Reporter),
            other => Err(format!("unknown part role '{}'", other)),
        }
    }
}

/// Repressor response: `y = ymin + (ymax - ymin) * k^n / (k^n + x^n)`.
///
/// Levels are in relative promoter units (RPU).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HillResponse {
    /// Output promoter activity with no repressor
    pub ymax: f64,
    /// Output promoter activity when fully repressed
    pub ymin: f64,
    /// Repression threshold
    pub k: f64,
    /// Hill coefficient
    pub n: f64,
}

impl HillResponse {
    /// Output promoter activity for repressor level `x`.
    pub fn output(&self, x: f64) -> f64 {
        let x = x.max(0.0);
        let kn = self.k.powf(self.n);
        self.ymin + (self.ymax - self.ymin) * kn / (kn + x.powf(self.n))
    }

    /// Fold change between the unrepressed and repressed states.
    pub fn dynamic_range(&self) -> f64 {
        if self.ymin > 0.0 {
            self.ymax / self.ymin
        } else {
            f64::INFINITY
        }
    }
}

/// Expression attributes shared by every part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// Translation multiplier contributed by the RBS
    #[serde(default = "one")]
    pub translation: f64,

    /// First-order kinetic rate in 1/hour
    #[serde(default = "one")]
    pub rate: f64,
}

fn one() -> f64 {
    1.0
}

impl Default for Expression {
    fn default() -> Self {
        Self {
            translation: 1.0,
            rate: 1.0,
        }
    }
}

/// Role-specific characterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum PartKind {
    /// Inducible promoter
    Sensor {
        /// Inducer / signal name (e.g. `IPTG`)
        signal: String,
        /// Activity without inducer
        off: f64,
        /// Activity with saturating inducer
        on: f64,
    },

    /// Repressor gate
    Gate {
        /// Repressor protein name
        repressor: String,
        /// Cognate promoter name
        promoter: String,
        /// Transfer function
        response: HillResponse,
    },

    /// Output reporter
    Reporter {
        /// Reporter protein (e.g. `GFP`)
        protein: String,
    },
}

/// A characterized part from a library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Catalog id
    pub id: PartId,

    /// Display name
    pub name: String,

    /// Host organism
    pub organism: String,

    /// Role and characterization
    #[serde(flatten)]
    pub kind: PartKind,

    /// Expression attributes
    #[serde(default)]
    pub expression: Expression,

    /// DNA sequence, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
}

impl Part {
    /// Role of this part.
    pub fn role(&self) -> PartRole {
        match self.kind {
            PartKind::Sensor { .. } => PartRole::Sensor,
            PartKind::Gate { .. } => PartRole::Gate,
            PartKind::Reporter { .. } => PartRole::Reporter,
        }
    }

    /// Basal and maximal promoter activity, for parts that own a promoter.
    pub fn promoter_levels(&self) -> Option<(f64, f64)> {
        match &self.kind {
            PartKind::Sensor { off, on, .. } => Some((*off, *on)),
            PartKind::Gate { response, .. } => Some((response.ymin, response.ymax)),
            PartKind::Reporter { .. } => None,
        }
    }

    /// Fold change the part can produce (1.0 for reporters).
    pub fn dynamic_range(&self) -> f64 {
        match self.promoter_levels() {
            Some((lo, hi)) if lo > 0.0 => hi / lo,
            Some(_) => f64::INFINITY,
            None => 1.0,
        }
    }

    /// Name matched against spec signals (inducer for sensors, protein for reporters).
    pub fn signal_name(&self) -> &str {
        match &self.kind {
            PartKind::Sensor { signal, .. } => signal,
            PartKind::Gate { repressor, .. } => repressor,
            PartKind::Reporter { protein } => protein,
        }
    }

    /// Check the parameters describe a physically meaningful part.
    pub fn check_parameters(&self) -> Result<(), String> {
        let finite_nonneg = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(format!("{}: {} must be finite and non-negative (got {})", self.id, name, v))
            }
        };

        if !(self.expression.translation.is_finite() && self.expression.translation > 0.0) {
            return Err(format!("{}: translation must be positive", self.id));
        }
        if !(self.expression.rate.is_finite() && self.expression.rate > 0.0) {
            return Err(format!("{}: rate must be positive", self.id));
        }

        match &self.kind {
            PartKind::Sensor { off, on, .. } => {
                finite_nonneg("off", *off)?;
                finite_nonneg("on", *on)
            }
            PartKind::Gate { response, .. } => {
                finite_nonneg("ymin", response.ymin)?;
                finite_nonneg("ymax", response.ymax)?;
                if !(response.k.is_finite() && response.k > 0.0) {
                    return Err(format!("{}: k must be positive", self.id));
                }
                if !(response.n.is_finite() && response.n > 0.0) {
                    return Err(format!("{}: n must be positive", self.id));
                }
                Ok(())
            }
            PartKind::Reporter { .. } => Ok(()),
        }
    }
}
