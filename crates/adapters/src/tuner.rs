//! Built-in promoter and RBS tuners.
//!
//! Both scale catalog parameters by a factor. The cumulative scale of each
//! parameter is clamped to [`TuningBounds`], standing in for the range of
//! variants a sequence library can realize.

use super::r#trait::{AdapterError, SequenceTuner, TuneRequest};
use async_trait::async_trait;
use geneforge_core::{AssignedPart, Direction, Lever, PartKind, TunedParameter, Tuning};
use serde::{Deserialize, Serialize};

/// Relative tolerance under which a scale is considered unchanged.
const EPSILON: f64 = 1e-9;

/// Limits on cumulative tuning relative to the catalog part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningBounds {
    /// Smallest cumulative scale
    pub min_scale: f64,
    /// Largest cumulative scale
    pub max_scale: f64,
}

impl Default for TuningBounds {
    fn default() -> Self {
        Self {
            min_scale: 0.01,
            max_scale: 10.0,
        }
    }
}

impl TuningBounds {
    /// Fold change left from `current` in `direction`.
    pub fn headroom(&self, current: f64, direction: Direction) -> f64 {
        let range = match direction {
            Direction::Increase => self.max_scale / current,
            Direction::Decrease => current / self.min_scale,
        };
        range.max(1.0)
    }

    /// Clamp `current * factor`, returning the factor actually applied.
    fn apply(&self, current: f64, factor: f64, what: &str) -> Result<f64, AdapterError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(AdapterError::OutOfBounds(format!("{}: invalid factor {}", what, factor)));
        }
        let next = (current * factor).clamp(self.min_scale, self.max_scale);
        if ((next - current) / current).abs() < EPSILON {
            return Err(AdapterError::OutOfBounds(format!(
                "{} is already at its library bound (scale {:.3})",
                what, current
            )));
        }
        Ok(next / current)
    }
}

fn scale_of(tuning: &Tuning, parameter: TunedParameter) -> f64 {
    match parameter {
        TunedParameter::Basal => tuning.basal,
        TunedParameter::Strength => tuning.strength,
        TunedParameter::Translation => tuning.translation,
        TunedParameter::Rate => tuning.rate,
    }
}

fn scale_mut(tuning: &mut Tuning, parameter: TunedParameter) -> &mut f64 {
    match parameter {
        TunedParameter::Basal => &mut tuning.basal,
        TunedParameter::Strength => &mut tuning.strength,
        TunedParameter::Translation => &mut tuning.translation,
        TunedParameter::Rate => &mut tuning.rate,
    }
}

fn check_request(lever: Lever, part: &AssignedPart, request: &TuneRequest) -> Result<(), AdapterError> {
    if request.parameter.lever() != lever {
        return Err(AdapterError::InvalidModel(format!(
            "{} cannot be tuned by the {} tuner",
            request.parameter, lever
        )));
    }
    let consistent = match request.direction {
        Direction::Increase => request.factor > 1.0,
        Direction::Decrease => request.factor < 1.0,
    };
    if !consistent {
        return Err(AdapterError::OutOfBounds(format!(
            "{}: factor {} does not match direction {:?}",
            part.label(),
            request.factor,
            request.direction
        )));
    }
    Ok(())
}

/// Promoter strength tuner.
///
/// Lowering basal activity by `f` costs maximal activity `f^0.3`; raising
/// maximal activity by `f` raises basal activity by `f^0.3` and lowers the
/// repression threshold by `f^0.5`.
pub struct PromoterTuner {
    bounds: TuningBounds,
}

impl PromoterTuner {
    /// Create a tuner with the given bounds.
    pub fn new(bounds: TuningBounds) -> Self {
        Self { bounds }
    }
}

impl Default for PromoterTuner {
    fn default() -> Self {
        Self::new(TuningBounds::default())
    }
}

#[async_trait]
impl SequenceTuner for PromoterTuner {
    fn name(&self) -> &str {
        "promoter"
    }

    fn lever(&self) -> Lever {
        Lever::Promoter
    }

    fn achievable_range(&self, part: &AssignedPart, parameter: TunedParameter, direction: Direction) -> f64 {
        if parameter.lever() != Lever::Promoter || part.part.promoter_levels().is_none() {
            return 1.0;
        }
        self.bounds.headroom(scale_of(&part.tuning, parameter), direction)
    }

    async fn tune(&self, part: &AssignedPart, request: &TuneRequest) -> Result<AssignedPart, AdapterError> {
        check_request(Lever::Promoter, part, request)?;

        let current = scale_of(&part.tuning, request.parameter);
        let f = self.bounds.apply(current, request.factor, &format!("{} {}", part.label(), request.parameter))?;
        let coupled = f.powf(0.3);

        let mut next = part.clone();
        match (&mut next.part.kind, request.parameter) {
            (PartKind::Sensor { off, on, .. }, TunedParameter::Basal) => {
                *off *= f;
                *on *= coupled;
            }
            (PartKind::Sensor { off, on, .. }, TunedParameter::Strength) => {
                *on *= f;
                *off *= coupled;
            }
            (PartKind::Gate { response, .. }, TunedParameter::Basal) => {
                response.ymin *= f;
                response.ymax *= coupled;
            }
            (PartKind::Gate { response, .. }, TunedParameter::Strength) => {
                response.ymax *= f;
                response.ymin *= coupled;
                response.k /= f.sqrt();
            }
            _ => {
                return Err(AdapterError::InvalidModel(format!(
                    "{} has no promoter to tune",
                    part.label()
                )))
            }
        }

        *scale_mut(&mut next.tuning, request.parameter) = current * f;
        next.revision += 1;
        next.part.sequence = None;

        tracing::debug!(
            "Tuned {} {} x{:.3} -> {}",
            part.label(),
            request.parameter,
            f,
            next.label()
        );
        Ok(next)
    }
}

/// Ribosome binding site tuner (translation and expression rate).
pub struct RbsTuner {
    bounds: TuningBounds,
}

impl RbsTuner {
    /// Create a tuner with the given bounds.
    pub fn new(bounds: TuningBounds) -> Self {
        Self { bounds }
    }
}

impl Default for RbsTuner {
    fn default() -> Self {
        Self::new(TuningBounds::default())
    }
}

#[async_trait]
impl SequenceTuner for RbsTuner {
    fn name(&self) -> &str {
        "rbs"
    }

    fn lever(&self) -> Lever {
        Lever::Rbs
    }

    fn achievable_range(&self, part: &AssignedPart, parameter: TunedParameter, direction: Direction) -> f64 {
        if parameter.lever() != Lever::Rbs {
            return 1.0;
        }
        self.bounds.headroom(scale_of(&part.tuning, parameter), direction)
    }

    async fn tune(&self, part: &AssignedPart, request: &TuneRequest) -> Result<AssignedPart, AdapterError> {
        check_request(Lever::Rbs, part, request)?;

        let current = scale_of(&part.tuning, request.parameter);
        let f = self.bounds.apply(current, request.factor, &format!("{} {}", part.label(), request.parameter))?;

        let mut next = part.clone();
        match request.parameter {
            TunedParameter::Translation => next.part.expression.translation *= f,
            _ => next.part.expression.rate *= f,
        }
        *scale_mut(&mut next.tuning, request.parameter) = current * f;
        next.revision += 1;
        next.part.sequence = None;

        tracing::debug!(
            "Tuned {} {} x{:.3} -> {}",
            part.label(),
            request.parameter,
            f,
            next.label()
        );
        Ok(next)
    }
}
