//! Per-pixel peak fitting.
//!
//! A [`FitRequest`] carries a six-slot shape selection together with its
//! flattened initial values and bounds. [`fit_pixel`] fits one pixel and
//! writes the result into the map; [`BatchFit`] sweeps an area of a 2D map,
//! optionally seeding every pixel from already-fitted neighbours.

pub mod batch;
pub mod seed;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::bounds::BoundsSet;
use crate::error::{MapError, Result};
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::map::{flat_len, unpack, Pixel, PixelFit, SpectralMap};
use crate::models::{CompositePeakModel, PeakShape, PEAK_SLOTS};

pub use batch::{
    clear_fits, select_pixels, Area, BatchFit, BatchStep, BatchSummary, CancelToken,
    FailureAction, Threshold, THRESHOLD_SCALE,
};
pub use seed::{neighbour_seed, Seed, NEIGHBOUR_RINGS};

/// Peak configuration, start values and box bounds of a fit.
///
/// All vectors follow the flattened slot packing of the fit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRequest {
    shapes: [PeakShape; PEAK_SLOTS],
    initial: Vec<f64>,
    bounds: BoundsSet,
}

impl FitRequest {
    /// Validate counts and bounds of a request.
    ///
    /// # Arguments
    ///
    /// * `shapes` - Shape of each of the six slots
    /// * `initial` - Flattened start values
    /// * `lower` - Flattened lower bounds
    /// * `upper` - Flattened upper bounds
    ///
    /// # Returns
    ///
    /// * `Result<FitRequest>` - The request, or the first count/bounds problem found
    pub fn new(
        shapes: [PeakShape; PEAK_SLOTS],
        initial: Vec<f64>,
        lower: &[f64],
        upper: &[f64],
    ) -> Result<Self> {
        let expected = flat_len(&shapes);
        if expected == 0 {
            return Err(MapError::InvalidParameter(
                "At least one peak slot must be active".to_string(),
            ));
        }
        for (what, len) in [
            ("initial values", initial.len()),
            ("lower bounds", lower.len()),
            ("upper bounds", upper.len()),
        ] {
            if len != expected {
                return Err(MapError::DimensionMismatch(format!(
                    "Peak configuration needs {} {}, got {}",
                    expected, what, len
                )));
            }
        }
        let bounds = BoundsSet::from_limits(lower, upper)?;

        Ok(Self {
            shapes,
            initial,
            bounds,
        })
    }

    pub fn shapes(&self) -> &[PeakShape; PEAK_SLOTS] {
        &self.shapes
    }

    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    pub fn bounds(&self) -> &BoundsSet {
        &self.bounds
    }

    pub fn parameter_count(&self) -> usize {
        self.initial.len()
    }
}

/// Options shared by single-pixel and batch fits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    /// Spectral sample window `[lower, upper)`; `None` uses the whole spectrum.
    pub window: Option<(usize, usize)>,

    /// Refit pixels that already hold a fit. Default: false
    pub overwrite: bool,

    /// Seed batch fits from fitted neighbours with the same configuration.
    /// Default: true
    pub seed_from_neighbours: bool,

    /// Treat a solver stall as a failed fit instead of storing the point
    /// where it stopped. Default: false
    pub reject_stalled: bool,

    /// Solver configuration.
    pub solver: LmConfig,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            window: None,
            overwrite: false,
            seed_from_neighbours: true,
            reject_stalled: false,
            solver: LmConfig::default(),
        }
    }
}

impl FitSettings {
    pub fn with_window(mut self, lower: usize, upper: usize) -> Self {
        self.window = Some((lower, upper));
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_neighbour_seeding(mut self, seed: bool) -> Self {
        self.seed_from_neighbours = seed;
        self
    }

    pub fn with_reject_stalled(mut self, reject: bool) -> Self {
        self.reject_stalled = reject;
        self
    }

    pub fn with_solver(mut self, solver: LmConfig) -> Self {
        self.solver = solver;
        self
    }

    /// The window resolved against a spectrum of `resolution` samples.
    pub fn window_for(&self, resolution: usize) -> Result<(usize, usize)> {
        let (lower, upper) = self.window.unwrap_or((0, resolution));
        if lower >= upper || upper > resolution {
            return Err(MapError::InvalidInterval {
                lower,
                upper,
                resolution,
            });
        }
        Ok((lower, upper))
    }
}

/// Fit one pixel with the request's own start values.
///
/// On success the shapes, start values and optimized values are written into
/// the pixel's fit record (with a `FitChanged` notification). A fit that does
/// not converge is reported as [`MapError::FitFailed`] and leaves the record
/// untouched. A stalled solver is stored with a warning unless
/// [`FitSettings::reject_stalled`] is set.
///
/// # Arguments
///
/// * `map` - The map holding the pixel
/// * `request` - Peak configuration, start values and bounds
/// * `pixel` - The pixel to fit; `None` fits the focus
/// * `settings` - Window and solver options
///
/// # Returns
///
/// * `Result<PixelFit>` - The record written for the pixel
pub fn fit_pixel(
    map: &mut SpectralMap,
    request: &FitRequest,
    pixel: Option<Pixel>,
    settings: &FitSettings,
) -> Result<PixelFit> {
    let pixel = map.check_pixel(pixel.unwrap_or(map.focus()))?;
    let window = settings.window_for(map.resolution())?;
    fit_with_initial(map, request, request.initial(), pixel, window, settings, true)
}

/// Run the solver from `initial` and store the result.
pub(crate) fn fit_with_initial(
    map: &mut SpectralMap,
    request: &FitRequest,
    initial: &[f64],
    pixel: Pixel,
    window: (usize, usize),
    settings: &FitSettings,
    emit: bool,
) -> Result<PixelFit> {
    let model = CompositePeakModel::new(
        request.shapes,
        map.spectrum(Some(pixel))?,
        window.0,
        window.1,
    )?;

    let solver = LevenbergMarquardt::with_config(settings.solver.clone());
    let start = Array1::from(initial.to_vec());
    let result = match solver.minimize_bounded(&model, start, &request.bounds) {
        Ok(result) => result,
        Err(
            err @ (MapError::Bounds(_)
            | MapError::FunctionEvaluation(_)
            | MapError::ConvergenceFailure(_)),
        ) => {
            return Err(MapError::FitFailed {
                pixel,
                reason: err.to_string(),
            })
        }
        Err(err) => return Err(err),
    };

    if !result.success || (result.stalled && settings.reject_stalled) {
        return Err(MapError::FitFailed {
            pixel,
            reason: result.message,
        });
    }
    if result.stalled {
        log::warn!(
            "Fit of pixel {} stalled with cost {:.4e}: {}",
            pixel,
            result.cost,
            result.message
        );
    }

    let optimized = result.params.to_vec();
    log::debug!(
        "Fitted pixel {} in {} iterations, cost {:.4e}",
        pixel,
        result.iterations,
        result.cost
    );

    let fit = PixelFit {
        shapes: request.shapes,
        initial: unpack(&request.shapes, initial)?,
        optimized: unpack(&request.shapes, &optimized)?,
    };
    map.set_fit(request.shapes, initial, &optimized, Some(pixel), emit)?;
    Ok(fit)
}
