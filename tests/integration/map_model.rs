//! Integration tests for the map data model
//!
//! Construction from loader output, the interval-driven intensity channel,
//! the channel numbering with fit-derived quantities and snapshots through
//! a collection.

use approx::assert_relative_eq;
use ndarray::{s, Array2, Array3, Array4};
use specmap_rs::{
    DataChannel, FitQuantity, IntervalSide, MapCollection, MapError, PeakShape, Pixel,
    Reduction, SpectralMap,
};
use std::sync::Arc;

use crate::test_helpers::{channel_map, init_logging, map_from_spectra, single};

/// 3x2 map whose intensity at sample k is `k + 1`.
fn staircase() -> SpectralMap {
    let mut spectra = Array4::<f64>::zeros((3, 2, 5, 2));
    for x in 0..3 {
        for y in 0..2 {
            for k in 0..5 {
                spectra[[x, y, k, 0]] = 1.0 + 0.1 * k as f64;
                spectra[[x, y, k, 1]] = (k + 1) as f64;
            }
        }
    }
    map_from_spectra("staircase", spectra, false)
}

#[test]
fn test_line_scan_has_unit_height() {
    init_logging();
    let mut spectra = Array4::<f64>::zeros((5, 1, 3, 2));
    spectra.slice_mut(s![.., .., .., 1]).fill(2.0);
    let map = map_from_spectra("line", spectra, true);

    assert_eq!(map.dimension(), 1);
    assert_eq!(map.size(), (5, 1));
    assert_eq!(map.pixel_count(), 5);
    assert_eq!(map.focus(), Pixel::line(2));
    assert_eq!(map.spectrum(Some(Pixel::line(4))).unwrap().dim(), (3, 2));
    assert_relative_eq!(map.data(Some(0), Some(Pixel::line(1))).unwrap(), 6.0);
}

#[test]
fn test_line_scan_rejects_grid_operations() {
    let spectra = Array4::<f64>::zeros((4, 1, 3, 2));
    let mut map = map_from_spectra("line", spectra, true);

    assert!(matches!(
        map.rotate(specmap_rs::Rotation::Clockwise),
        Err(MapError::UnsupportedDimension { dimension: 1, .. })
    ));
    assert!(map.add_micrograph("image", Array3::zeros((4, 1, 3))).is_err());
    assert!(map.set_focus(Pixel::new(0, 1)).is_err());
}

#[test]
fn test_interval_drives_intensity_channel() {
    let mut map = staircase();
    // Loader intensities stand until the window moves
    assert_eq!(map.interval(), (0, 4));
    assert_relative_eq!(map.data(Some(0), Some(Pixel::new(0, 0))).unwrap(), 15.0);

    map.set_interval(IntervalSide::Lower, 1).unwrap();
    for p in map.pixels().collect::<Vec<_>>() {
        assert_relative_eq!(map.data(Some(0), Some(p)).unwrap(), 2.0 + 3.0 + 4.0);
    }

    map.set_interval(IntervalSide::Upper, 2).unwrap();
    assert_relative_eq!(map.data(None, Some(Pixel::new(2, 1))).unwrap(), 2.0);

    // Inverted or out-of-range windows are rejected and leave the channel alone
    assert!(matches!(
        map.set_interval(IntervalSide::Lower, 2),
        Err(MapError::InvalidInterval { .. })
    ));
    assert!(map.set_interval(IntervalSide::Upper, 5).is_err());
    assert_eq!(map.interval(), (1, 2));
    assert_relative_eq!(map.data(Some(0), Some(Pixel::new(1, 1))).unwrap(), 2.0);
}

#[test]
fn test_spectral_reductions() {
    let map = staircase();
    let integral = map.spectral_reduction(Reduction::Integral);
    let mean = map.spectral_reduction(Reduction::Mean);
    let maximum = map.spectral_reduction(Reduction::Maximum);

    assert_eq!(integral.dim(), (3, 2));
    assert!(integral.iter().all(|&v| v == 15.0));
    assert!(mean.iter().all(|&v| v == 3.0));
    assert!(maximum.iter().all(|&v| v == 5.0));
}

#[test]
fn test_fit_channels_follow_scalars_and_micrographs() {
    let mut map = channel_map(&Array2::from_elem((2, 2), 4.0));
    let image = map.add_micrograph("camera", Array3::ones((8, 8, 3))).unwrap();
    assert_eq!(image, 1);
    assert_eq!(map.data_count(), 2);

    map.set_fit(
        single(PeakShape::Voigt),
        &[10.0, 1.5, 0.02, 0.01],
        &[12.0, 1.45, 0.03, 0.005],
        Some(Pixel::new(1, 0)),
        false,
    )
    .unwrap();

    // intensity, center, sigma, gamma, FWHM of slot 0
    assert_eq!(map.data_count(), 2 + 5);
    assert_eq!(
        map.channel(4).unwrap(),
        DataChannel::Fit {
            slot: 0,
            quantity: FitQuantity::Sigma
        }
    );
    assert_eq!(map.data_name(Some(3)).unwrap(), "ε₁");
    assert_relative_eq!(map.data(Some(4), Some(Pixel::new(1, 0))).unwrap(), 30.0);
    assert_relative_eq!(map.data(Some(5), Some(Pixel::new(1, 0))).unwrap(), 5.0);
    assert!(map.data(Some(2), Some(Pixel::new(0, 0))).unwrap().is_nan());

    let centers = map.data_map(Some(3)).unwrap();
    let grid = centers.as_grid().unwrap();
    assert_relative_eq!(grid[[1, 0]], 1.45);
    assert!(grid[[0, 1]].is_nan());

    assert!(map.data(Some(1), None).is_err());
    assert!(matches!(
        map.channel(7),
        Err(MapError::InvalidDataIndex { index: 7, count: 7 })
    ));
}

#[test]
fn test_snapshot_through_collection() {
    init_logging();
    let log = Arc::new(specmap_rs::EventLog::new());
    let mut maps = MapCollection::with_sink(log.clone());

    let mut map = staircase();
    map.set_interval(IntervalSide::Lower, 2).unwrap();
    map.set_fit(
        single(PeakShape::Lorentzian),
        &[1.0, 1.2, 0.01],
        &[1.1, 1.21, 0.012],
        Some(Pixel::new(2, 1)),
        false,
    )
    .unwrap();
    let id = maps.add(map);
    maps.select(id).unwrap();

    let mut buffer = Vec::new();
    maps.save_selected(&mut buffer).unwrap();
    let copy = maps.load(buffer.as_slice()).unwrap();

    let (original, loaded) = (maps.get(id).unwrap(), maps.get(copy).unwrap());
    assert_eq!(loaded.interval(), (2, 4));
    let (a, b) = (
        original.fit(Some(Pixel::new(2, 1))).unwrap(),
        loaded.fit(Some(Pixel::new(2, 1))).unwrap(),
    );
    assert_eq!(a.shapes, b.shapes);
    assert_eq!(a.optimized_flat(), b.optimized_flat());
    assert_eq!(b.initial_flat(), vec![1.0, 1.2, 0.01]);
    // Unfitted pixels survive the JSON round trip as NaN
    assert!(loaded.fit(Some(Pixel::new(0, 0))).unwrap().optimized[0][0].is_nan());
    assert_eq!(loaded.data_map(Some(0)).unwrap(), original.data_map(Some(0)).unwrap());
}

#[test]
fn test_clearing_a_voigt_pixel_leaves_neighbours() {
    let mut map = channel_map(&Array2::from_elem((2, 2), 1.0));
    let voigt = [20.0, 1.1, 0.01, 0.02];
    for p in map.pixels().collect::<Vec<_>>() {
        map.set_fit(single(PeakShape::Voigt), &voigt, &voigt, Some(p), false)
            .unwrap();
    }

    map.clear_fit(Some(Pixel::new(0, 1)), true).unwrap();
    let cleared = map.fit(Some(Pixel::new(0, 1))).unwrap();
    assert_eq!(cleared.shapes[0], PeakShape::Off);
    assert!(cleared.optimized[0].iter().all(|v| v.is_nan()));
    assert!(cleared.initial[0].iter().all(|v| v.is_nan()));

    for p in [Pixel::new(0, 0), Pixel::new(1, 0), Pixel::new(1, 1)] {
        let fit = map.fit(Some(p)).unwrap();
        assert_eq!(fit.shapes[0], PeakShape::Voigt);
        assert_eq!(fit.optimized[0], voigt);
    }
}
