//! Area/threshold batches over 2D maps.
//!
//! The eligible pixels are collected up front in row-major order (x outer,
//! y inner). [`BatchFit`] then yields one [`BatchStep`] per pixel, checking
//! its [`CancelToken`] before each one, so the caller controls pacing,
//! progress display and early termination. Pixels written before a
//! cancellation or a stop keep their results.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::seed::neighbour_seed;
use super::{fit_with_initial, FitRequest, FitSettings};
use crate::error::{MapError, Result};
use crate::map::{Pixel, PixelFit, SpectralMap};

/// Threshold fractions are given in units of 1/10000 of the channel span.
pub const THRESHOLD_SCALE: u32 = 10_000;

/// Inclusive rectangle of pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    x: (usize, usize),
    y: (usize, usize),
}

impl Area {
    /// Rectangle `[x1, x2] x [y1, y2]`; reversed endpoints are swapped.
    pub fn new(x1: usize, x2: usize, y1: usize, y2: usize) -> Self {
        Self {
            x: (x1.min(x2), x1.max(x2)),
            y: (y1.min(y2), y1.max(y2)),
        }
    }

    /// The full grid of a map.
    pub fn whole(map: &SpectralMap) -> Self {
        let (nx, ny) = map.size();
        Self::new(0, nx.saturating_sub(1), 0, ny.saturating_sub(1))
    }

    pub fn x_range(&self) -> (usize, usize) {
        self.x
    }

    pub fn y_range(&self) -> (usize, usize) {
        self.y
    }

    pub fn contains(&self, p: Pixel) -> bool {
        (self.x.0..=self.x.1).contains(&p.x) && (self.y.0..=self.y.1).contains(&p.y)
    }

    fn pixels(&self) -> impl Iterator<Item = Pixel> {
        let (y0, y1) = self.y;
        (self.x.0..=self.x.1).flat_map(move |x| (y0..=y1).map(move |y| Pixel::new(x, y)))
    }
}

/// Gate on a data channel, as fractions of its span over the whole map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    channel: usize,
    lower: u32,
    upper: u32,
}

impl Threshold {
    /// `lower` and `upper` are in `0..=10000`, i.e. hundredths of a percent.
    pub fn new(channel: usize, lower: u32, upper: u32) -> Result<Self> {
        if lower > upper || upper > THRESHOLD_SCALE {
            return Err(MapError::InvalidParameter(format!(
                "Threshold fractions [{}, {}] must satisfy lower <= upper <= {}",
                lower, upper, THRESHOLD_SCALE
            )));
        }
        Ok(Self {
            channel,
            lower,
            upper,
        })
    }

    /// Accept every pixel with a finite value.
    pub fn full(channel: usize) -> Self {
        Self {
            channel,
            lower: 0,
            upper: THRESHOLD_SCALE,
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Absolute limits over a channel grid, NaN ignored. `None` if the grid
    /// holds no number at all.
    pub fn limits(&self, values: &Array2<f64>) -> Option<(f64, f64)> {
        let (min, max) = values
            .iter()
            .filter(|v| !v.is_nan())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if min > max {
            return None;
        }
        let span = max - min;
        let scale = THRESHOLD_SCALE as f64;
        Some((
            min + span * self.lower as f64 / scale,
            min + span * self.upper as f64 / scale,
        ))
    }
}

/// Pixels of `area` whose threshold-channel value lies within the limits
/// and that either hold no fit or may be overwritten.
pub fn select_pixels(
    map: &SpectralMap,
    area: Area,
    threshold: Threshold,
    overwrite: bool,
) -> Result<Vec<Pixel>> {
    map.require_2d("area selection")?;
    map.check_pixel(Pixel::new(area.x.1, area.y.1))?;

    let data = map.data_map(Some(threshold.channel))?;
    let values = data.as_grid().ok_or_else(|| {
        MapError::InvalidParameter(format!(
            "Data channel {} is a micrograph and cannot gate pixels",
            threshold.channel
        ))
    })?;
    let Some((lower, upper)) = threshold.limits(values) else {
        return Ok(Vec::new());
    };

    let mut pixels = Vec::new();
    for p in area.pixels() {
        let v = values[[p.x, p.y]];
        if !(lower..=upper).contains(&v) {
            continue;
        }
        if overwrite || !map.has_fit(p)? {
            pixels.push(p);
        }
    }
    Ok(pixels)
}

/// Last pixel of each x column gets the notification.
fn closes_column(pixels: &[Pixel], i: usize) -> bool {
    pixels.get(i + 1).map_or(true, |next| next.x != pixels[i].x)
}

/// Shared cancellation flag, checked between pixels.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Caller's answer to a failed pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureAction {
    /// Skip the pixel and go on.
    Continue,
    /// Abandon the rest of the batch.
    Stop,
}

/// Outcome of one pixel of a batch.
#[derive(Debug)]
pub struct BatchStep {
    pub pixel: Pixel,
    /// Pixels processed so far, this one included.
    pub completed: usize,
    pub total: usize,
    /// Neighbour ring the start values came from, if seeded.
    pub seed_ring: Option<usize>,
    pub outcome: Result<PixelFit>,
}

/// Totals of a finished, stopped or cancelled batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub fitted: usize,
    pub failed: Vec<Pixel>,
    pub stopped: bool,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.fitted + self.failed.len()
    }
}

/// Lazy area/threshold fit of a 2D map.
pub struct BatchFit<'a> {
    map: &'a mut SpectralMap,
    request: &'a FitRequest,
    settings: &'a FitSettings,
    window: (usize, usize),
    pixels: Vec<Pixel>,
    next: usize,
    cancel: CancelToken,
}

impl<'a> BatchFit<'a> {
    /// Validate the inputs and collect the eligible pixels.
    ///
    /// # Arguments
    ///
    /// * `map` - A 2D map
    /// * `request` - Peak configuration, fallback start values and bounds
    /// * `settings` - Window, overwrite flag, seeding flag and solver options
    /// * `area` - Rectangle to sweep
    /// * `threshold` - Gate on a data channel
    ///
    /// # Returns
    ///
    /// * `Result<BatchFit>` - The batch, positioned before its first pixel
    pub fn new(
        map: &'a mut SpectralMap,
        request: &'a FitRequest,
        settings: &'a FitSettings,
        area: Area,
        threshold: Threshold,
    ) -> Result<Self> {
        map.require_2d("area fit")?;
        let window = settings.window_for(map.resolution())?;
        let pixels = select_pixels(map, area, threshold, settings.overwrite)?;

        log::info!(
            "Batch fit of '{}': {} eligible pixel(s), seeding {}",
            map.name(),
            pixels.len(),
            if settings.seed_from_neighbours {
                "on"
            } else {
                "off"
            }
        );

        Ok(Self {
            map,
            request,
            settings,
            window,
            pixels,
            next: 0,
            cancel: CancelToken::new(),
        })
    }

    /// Observe `token` between pixels.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn total(&self) -> usize {
        self.pixels.len()
    }

    pub fn remaining(&self) -> usize {
        self.pixels.len() - self.next
    }

    /// Drive the batch to the end.
    ///
    /// `on_failure` decides whether a failed pixel stops the batch;
    /// `progress` receives `(completed, total)` after every pixel. Errors
    /// other than fit failures abort the batch and are returned.
    pub fn run<F, G>(mut self, mut on_failure: F, mut progress: G) -> Result<BatchSummary>
    where
        F: FnMut(Pixel, &MapError) -> FailureAction,
        G: FnMut(usize, usize),
    {
        let mut summary = BatchSummary {
            total: self.total(),
            ..BatchSummary::default()
        };

        while let Some(step) = self.next() {
            match step.outcome {
                Ok(_) => summary.fitted += 1,
                Err(err) if err.is_fit_failure() => {
                    summary.failed.push(step.pixel);
                    if on_failure(step.pixel, &err) == FailureAction::Stop {
                        log::info!("Batch stopped at pixel {}: {}", step.pixel, err);
                        summary.stopped = true;
                        progress(step.completed, step.total);
                        break;
                    }
                    log::warn!("Skipping pixel {}: {}", step.pixel, err);
                }
                Err(err) => return Err(err),
            }
            progress(step.completed, step.total);
        }

        summary.cancelled = !summary.stopped && self.remaining() > 0;
        log::info!(
            "Batch fit of '{}' done: {} fitted, {} failed of {}{}",
            self.map.name(),
            summary.fitted,
            summary.failed.len(),
            summary.total,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        Ok(summary)
    }
}

impl<'a> Iterator for BatchFit<'a> {
    type Item = BatchStep;

    fn next(&mut self) -> Option<BatchStep> {
        if self.next >= self.pixels.len() || self.cancel.is_cancelled() {
            return None;
        }
        let i = self.next;
        self.next += 1;
        let pixel = self.pixels[i];

        let shapes = self.request.shapes();
        let seed = if self.settings.seed_from_neighbours {
            neighbour_seed(self.map, pixel, shapes)
        } else {
            None
        };
        let seed_ring = seed.as_ref().map(|s| s.ring);
        let initial = match seed {
            Some(seed) => {
                let mut params = seed.params;
                self.request.bounds().clamp(&mut params);
                params
            }
            None => self.request.initial().to_vec(),
        };

        let outcome = fit_with_initial(
            self.map,
            self.request,
            &initial,
            pixel,
            self.window,
            self.settings,
            closes_column(&self.pixels, i),
        );

        Some(BatchStep {
            pixel,
            completed: i + 1,
            total: self.pixels.len(),
            seed_ring,
            outcome,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

/// Clear the fit record of every pixel in `area` that passes `threshold`.
///
/// Stops early if `cancel` is raised and returns the number of pixels
/// cleared.
pub fn clear_fits(
    map: &mut SpectralMap,
    area: Area,
    threshold: Threshold,
    cancel: &CancelToken,
) -> Result<usize> {
    let pixels = select_pixels(map, area, threshold, true)?;
    let mut cleared = 0;
    for (i, &p) in pixels.iter().enumerate() {
        if cancel.is_cancelled() {
            log::info!("Clearing cancelled after {} of {} pixels", cleared, pixels.len());
            break;
        }
        map.clear_fit(Some(p), closes_column(&pixels, i))?;
        cleared += 1;
    }
    Ok(cleared)
}
