//! Box bounds for fit parameters.
//!
//! The solver works on unbounded internal coordinates. `BoundsTransform`
//! implements the Minuit-style mapping between those and the bounded external
//! values the peak models see, so that every trial point stays inside its box.

use serde::{Deserialize, Serialize};
use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must not exceed max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Infinite or NaN parameter value is not allowed")]
    InfiniteValue,

    #[error("Expected {expected} bounds, got {found}")]
    CountMismatch { expected: usize, found: usize },
}

/// Lower and upper limit of one parameter.
///
/// Infinite limits are serialised as `null`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Serialize for Bounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let finite = |v: f64| if v.is_finite() { Some(v) } else { None };
        let mut state = serializer.serialize_struct("Bounds", 2)?;
        state.serialize_field("min", &finite(self.min))?;
        state.serialize_field("max", &finite(self.max))?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BoundsHelper {
            #[serde(default)]
            min: Option<f64>,

            #[serde(default)]
            max: Option<f64>,
        }

        let helper = BoundsHelper::deserialize(deserializer)?;
        Ok(Bounds {
            min: helper.min.unwrap_or(NEG_INFINITY),
            max: helper.max.unwrap_or(INFINITY),
        })
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Bounds {
    /// Create bounds, rejecting `min > max` and NaN limits.
    ///
    /// # Examples
    ///
    /// ```
    /// use specmap_rs::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert!(bounds.contains(10.0));
    /// assert!(Bounds::new(1.0, 0.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Bounds from negative to positive infinity.
    pub fn unbounded() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// A parameter whose limits coincide cannot move during the fit.
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Minuit-style mapping between internal (unbounded) and external (bounded) values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Map an internal solver coordinate to the bounded external value.
    pub fn to_external(&self, internal_value: f64) -> f64 {
        let b = &self.bounds;
        match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => internal_value,
            (true, false) => b.min - 1.0 + (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => b.max + 1.0 - (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => {
                if b.is_fixed() {
                    return b.min;
                }
                b.min + (internal_value.sin() + 1.0) * (b.max - b.min) / 2.0
            }
        }
    }

    /// Map a bounded external value to its internal solver coordinate.
    pub fn to_internal(&self, external_value: f64) -> Result<f64, BoundsError> {
        if !external_value.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }

        let b = &self.bounds;
        if !b.contains(external_value) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external_value,
                min: b.min,
                max: b.max,
            });
        }

        let internal = match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => external_value,
            (true, false) => ((external_value - b.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((b.max - external_value + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                if b.is_fixed() {
                    return Ok(0.0);
                }
                let scaled = 2.0 * (external_value - b.min) / (b.max - b.min) - 1.0;
                scaled.clamp(-1.0, 1.0).asin()
            }
        };
        Ok(internal)
    }
}

/// Per-parameter bounds of a flattened parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsSet {
    bounds: Vec<Bounds>,
}

impl BoundsSet {
    /// Build from parallel lower/upper vectors.
    pub fn from_limits(lower: &[f64], upper: &[f64]) -> Result<Self, BoundsError> {
        if lower.len() != upper.len() {
            return Err(BoundsError::CountMismatch {
                expected: lower.len(),
                found: upper.len(),
            });
        }
        let bounds = lower
            .iter()
            .zip(upper)
            .map(|(&lo, &hi)| Bounds::new(lo, hi))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { bounds })
    }

    pub fn unbounded(n: usize) -> Self {
        Self {
            bounds: vec![Bounds::unbounded(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bounds> {
        self.bounds.iter()
    }

    pub fn transforms(&self) -> Vec<BoundsTransform> {
        self.bounds.iter().copied().map(BoundsTransform::new).collect()
    }

    /// Fail with the first value lying outside its bounds.
    pub fn check(&self, values: &[f64]) -> Result<(), BoundsError> {
        if values.len() != self.bounds.len() {
            return Err(BoundsError::CountMismatch {
                expected: self.bounds.len(),
                found: values.len(),
            });
        }
        for (value, b) in values.iter().zip(&self.bounds) {
            if !value.is_finite() {
                return Err(BoundsError::InfiniteValue);
            }
            if !b.contains(*value) {
                return Err(BoundsError::ValueOutsideBounds {
                    value: *value,
                    min: b.min,
                    max: b.max,
                });
            }
        }
        Ok(())
    }

    /// Clamp every value into its bounds.
    pub fn clamp(&self, values: &mut [f64]) {
        for (value, b) in values.iter_mut().zip(&self.bounds) {
            *value = b.clamp(*value);
        }
    }
}
