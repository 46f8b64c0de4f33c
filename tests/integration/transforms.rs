//! Integration tests for map geometry
//!
//! Flips and rotations must move spectra, data, fit records, micrographs and
//! the focus together, and must compose back to the identity.

use ndarray::{Array2, Array3};
use specmap_rs::{
    EventLog, FlipAxis, MapCollection, MapEvent, PeakShape, Pixel, Rotation, SpectralMap,
};
use std::sync::Arc;

use crate::test_helpers::{assert_same_state, channel_map, gaussian_map, init_logging, single};

/// Non-square map with a fit, a micrograph and an off-centre focus.
fn decorated() -> SpectralMap {
    let mut map = gaussian_map(4, 3, |x, y| 0.9 + 0.02 * x as f64 + 0.01 * y as f64, 0.5, 7);
    map.set_fit(
        single(PeakShape::Gaussian),
        &[90.0, 0.95, 0.015],
        &[100.0, 0.92, 0.02],
        Some(Pixel::new(3, 0)),
        false,
    )
    .unwrap();
    let image = Array3::from_shape_fn((4, 3, 2), |(r, c, k)| (r * 10 + c) as f64 + 0.5 * k as f64);
    map.add_micrograph("camera", image).unwrap();
    map.set_focus(Pixel::new(1, 2)).unwrap();
    map
}

#[test]
fn test_flip_twice_is_identity() {
    init_logging();
    for axis in [FlipAxis::X, FlipAxis::Y] {
        let reference = decorated();
        let mut map = decorated();
        map.flip(axis).unwrap();
        map.flip(axis).unwrap();
        assert_same_state(&reference, &map);
    }
}

#[test]
fn test_four_rotations_are_identity() {
    for rotation in [Rotation::Clockwise, Rotation::CounterClockwise] {
        let reference = decorated();
        let mut map = decorated();
        for _ in 0..4 {
            map.rotate(rotation).unwrap();
        }
        assert_same_state(&reference, &map);
    }
}

#[test]
fn test_rotation_and_its_inverse_cancel() {
    let reference = decorated();
    let mut map = decorated();
    map.rotate(Rotation::Clockwise).unwrap();
    assert_eq!(map.size(), (3, 4));
    map.rotate(Rotation::CounterClockwise).unwrap();
    assert_same_state(&reference, &map);
}

#[test]
fn test_every_store_moves_with_the_pixel() {
    let mut map = decorated();
    let (nx, ny) = map.size();
    let fitted = Pixel::new(3, 0);
    let spectrum = map.spectrum(Some(fitted)).unwrap().to_owned();
    let intensity = map.data(Some(0), Some(fitted)).unwrap();

    map.flip(FlipAxis::X).unwrap();
    let moved = Pixel::new(nx - 1 - fitted.x, fitted.y);

    assert_eq!(map.spectrum(Some(moved)).unwrap(), spectrum);
    assert_eq!(map.data(Some(0), Some(moved)).unwrap(), intensity);
    assert_eq!(map.fit_functions(Some(moved)).unwrap(), single(PeakShape::Gaussian));
    assert!(!map.has_fit(fitted).unwrap());
    assert_eq!(map.focus(), Pixel::new(nx - 2, 2));
    assert_eq!(map.size(), (nx, ny));

    let image = map.micrographs()[0].image.clone();
    assert_eq!(image[[0, 0, 0]], 30.0);
}

#[test]
fn test_transforms_publish_geometry_changes() {
    let log = Arc::new(EventLog::new());
    let mut maps = MapCollection::with_sink(log.clone());
    let id = maps.add(channel_map(&Array2::zeros((2, 3))));
    log.drain();

    let map = maps.get_mut(id).unwrap();
    map.flip(FlipAxis::Y).unwrap();
    map.rotate(Rotation::CounterClockwise).unwrap();
    assert_eq!(
        log.drain(),
        vec![MapEvent::GeometryChanged(id), MapEvent::GeometryChanged(id)]
    );
}
