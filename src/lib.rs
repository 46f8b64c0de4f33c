//! # specmap-rs
//!
//! `specmap-rs` is the data model and fitting engine for hyperspectral
//! photoluminescence maps: 1D line scans and 2D grids of pixels, each holding
//! an optical spectrum of (energy, intensity) samples.
//!
//! The library provides:
//! - A [`SpectralMap`] with data channels, micrographs, an integration
//!   interval, a focus and a six-slot peak fit record per pixel
//! - Area-normalised Gaussian, Lorentzian and Voigt line shapes
//! - A bounded Levenberg-Marquardt solver for the per-pixel multi-peak fits
//! - Area/threshold batch fits with neighbour seeding, cancellation and a
//!   continue/stop failure policy
//! - Background and cosmic-ray removal, JSON snapshots and a [`MapCollection`]
//!   that publishes typed change events
//!
//! ## Basic Usage
//!
//! ```
//! use ndarray::{Array1, Array3, Axis};
//! use specmap_rs::{
//!     fit_pixel, gaussian, FitRequest, FitSettings, MapSource, PeakShape, Pixel, SpectralMap,
//! };
//!
//! // A 4-pixel line scan whose spectra all hold one Gaussian peak.
//! let energy = Array1::linspace(0.8, 1.2, 100);
//! let intensity = gaussian(&energy, 100.0, 1.0, 0.02);
//! let mut spectra = Array3::zeros((4, 100, 2));
//! for mut pixel in spectra.outer_iter_mut() {
//!     pixel.column_mut(0).assign(&energy);
//!     pixel.column_mut(1).assign(&intensity);
//! }
//! let data = spectra.index_axis(Axis(2), 1).sum_axis(Axis(1)).insert_axis(Axis(0));
//!
//! let mut map = SpectralMap::from_source(MapSource {
//!     name: "scan".to_string(),
//!     spectra: spectra.into_dyn(),
//!     data_names: vec!["intensity".to_string()],
//!     data: data.into_dyn(),
//! })?;
//!
//! let mut shapes = [PeakShape::Off; 6];
//! shapes[0] = PeakShape::Gaussian;
//! let request = FitRequest::new(
//!     shapes,
//!     vec![80.0, 0.95, 0.015],
//!     &[0.0, 0.8, 0.001],
//!     &[1000.0, 1.2, 0.1],
//! )?;
//!
//! let fit = fit_pixel(&mut map, &request, Some(Pixel::line(2)), &FitSettings::default())?;
//! assert!((fit.optimized[0][1] - 1.0).abs() < 1e-4);
//! # Ok::<(), specmap_rs::MapError>(())
//! ```

// Public modules
pub mod bounds;
pub mod collection;
pub mod error;
pub mod events;
pub mod fitting;
pub mod lm;
pub mod map;
pub mod models;
pub mod parse;
pub mod processing;
pub mod problem;
pub mod utils;

// Re-exports for convenience
pub use bounds::{Bounds, BoundsError, BoundsSet};
pub use collection::MapCollection;
pub use error::{MapError, Result};
pub use events::{EventLog, EventSink, MapEvent, MapId};
pub use fitting::{
    clear_fits, fit_pixel, neighbour_seed, Area, BatchFit, BatchSummary, CancelToken,
    FailureAction, FitRequest, FitSettings, Threshold,
};
pub use lm::{LevenbergMarquardt, LmConfig, LmResult};
pub use map::{
    DataChannel, DataMap, FitQuantity, FlipAxis, IntervalSide, MapSource, Pixel, PixelFit,
    Reduction, Rotation, SpectralMap,
};
pub use models::{gaussian, lorentzian, voigt, CompositePeakModel, PeakShape, PEAK_SLOTS};
pub use processing::{remove_background, remove_cosmic_rays, BackgroundMethod, BackgroundRemoval};
pub use problem::Problem;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
