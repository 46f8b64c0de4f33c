//! Sum of peak shapes fitted against one spectrum.

use ndarray::{s, Array1, ArrayView2};

use super::peak::{PeakShape, PEAK_SLOTS};
use crate::error::{MapError, Result};
use crate::problem::Problem;

/// The composite model of a pixel: the active peak slots summed in slot
/// order, each reading its slice of the flattened parameter vector.
#[derive(Debug, Clone)]
pub struct CompositePeakModel {
    shapes: [PeakShape; PEAK_SLOTS],
    energy: Array1<f64>,
    intensity: Array1<f64>,
    n_params: usize,
}

impl CompositePeakModel {
    /// Build the model against the samples `[lower, upper)` of a spectrum
    /// given as an `R x 2` array of (energy, intensity) rows.
    pub fn new(
        shapes: [PeakShape; PEAK_SLOTS],
        spectrum: ArrayView2<f64>,
        lower: usize,
        upper: usize,
    ) -> Result<Self> {
        let resolution = spectrum.nrows();
        if lower >= upper || upper > resolution {
            return Err(MapError::InvalidInterval {
                lower,
                upper,
                resolution,
            });
        }
        let window = spectrum.slice(s![lower..upper, ..]);
        Ok(Self::from_samples(
            shapes,
            window.column(0).to_owned(),
            window.column(1).to_owned(),
        ))
    }

    pub fn from_samples(
        shapes: [PeakShape; PEAK_SLOTS],
        energy: Array1<f64>,
        intensity: Array1<f64>,
    ) -> Self {
        let n_params = shapes.iter().map(|s| s.parameter_count()).sum();
        Self {
            shapes,
            energy,
            intensity,
            n_params,
        }
    }

    pub fn shapes(&self) -> &[PeakShape; PEAK_SLOTS] {
        &self.shapes
    }

    pub fn energy(&self) -> &Array1<f64> {
        &self.energy
    }

    /// Model intensities at the window energies.
    pub fn evaluate(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != self.n_params {
            return Err(MapError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.n_params,
                params.len()
            )));
        }

        let mut total = Array1::zeros(self.energy.len());
        let mut offset = 0;
        for shape in self.shapes.iter().filter(|s| s.is_active()) {
            let n = shape.parameter_count();
            let slice = params.slice(s![offset..offset + n]);
            let values = slice.to_vec();
            total += &shape.evaluate(&self.energy, &values);
            offset += n;
        }
        Ok(total)
    }
}

impl Problem for CompositePeakModel {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(self.evaluate(params)? - &self.intensity)
    }

    fn parameter_count(&self) -> usize {
        self.n_params
    }

    fn residual_count(&self) -> usize {
        self.energy.len()
    }
}
