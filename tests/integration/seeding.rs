//! Batch fits seeded from fitted neighbours

use approx::assert_relative_eq;
use specmap_rs::{
    Area, BatchFit, EventLog, FailureAction, FitSettings, MapCollection, MapEvent, PeakShape,
    Pixel, SpectralMap, Threshold,
};
use std::sync::Arc;

use crate::test_helpers::{gaussian_map, gaussian_request, init_logging, single};

fn prefit(map: &mut SpectralMap, pixel: Pixel, shape: PeakShape, optimized: &[f64]) {
    map.set_fit(single(shape), optimized, optimized, Some(pixel), false)
        .unwrap();
}

/// Fit only the centre pixel of a 3x3 map and return its step.
fn fit_centre(map: &mut SpectralMap, settings: &FitSettings) -> specmap_rs::fitting::BatchStep {
    let request = gaussian_request([50.0, 0.9, 0.05]);
    let mut batch = BatchFit::new(
        map,
        &request,
        settings,
        Area::new(1, 1, 1, 1),
        Threshold::full(0),
    )
    .unwrap();
    assert_eq!(batch.total(), 1);
    batch.next().unwrap()
}

#[test]
fn test_centre_starts_from_axis_neighbour_mean() {
    init_logging();
    let mut map = gaussian_map(3, 3, |_, _| 1.0, 0.0, 3);
    let neighbours = [
        (Pixel::new(0, 1), [96.0, 0.99, 0.018]),
        (Pixel::new(2, 1), [104.0, 1.01, 0.022]),
        (Pixel::new(1, 0), [98.0, 0.995, 0.019]),
        (Pixel::new(1, 2), [102.0, 1.005, 0.021]),
    ];
    for (p, params) in &neighbours {
        prefit(&mut map, *p, PeakShape::Gaussian, params);
    }
    // A diagonal fit must not leak into the nearer ring's mean
    prefit(&mut map, Pixel::new(0, 0), PeakShape::Gaussian, &[1.0, 0.81, 0.002]);

    let step = fit_centre(&mut map, &FitSettings::default());
    assert_eq!(step.seed_ring, Some(0));
    assert!(step.outcome.is_ok());

    let stored = map.fit(Some(Pixel::new(1, 1))).unwrap().initial_flat();
    assert_relative_eq!(stored[0], 100.0, epsilon = 1e-9);
    assert_relative_eq!(stored[1], 1.0, epsilon = 1e-12);
    assert_relative_eq!(stored[2], 0.02, epsilon = 1e-12);
}

#[test]
fn test_nearest_matching_ring_wins() {
    let mut map = gaussian_map(3, 3, |_, _| 1.0, 0.0, 3);
    // Axis neighbour with another configuration does not count
    prefit(&mut map, Pixel::new(1, 0), PeakShape::Lorentzian, &[90.0, 0.98, 0.01]);
    prefit(&mut map, Pixel::new(2, 2), PeakShape::Gaussian, &[110.0, 1.02, 0.025]);

    let step = fit_centre(&mut map, &FitSettings::default());
    assert_eq!(step.seed_ring, Some(1));
    assert_eq!(
        map.fit(Some(Pixel::new(1, 1))).unwrap().initial_flat(),
        vec![110.0, 1.02, 0.025]
    );
}

#[test]
fn test_seed_is_clamped_into_bounds() {
    let mut map = gaussian_map(3, 3, |_, _| 1.0, 0.0, 3);
    // Amplitude above the request's upper bound of 1000
    prefit(&mut map, Pixel::new(0, 1), PeakShape::Gaussian, &[4000.0, 1.0, 0.02]);

    let step = fit_centre(&mut map, &FitSettings::default());
    assert_eq!(step.seed_ring, Some(0));
    let initial = map.fit(Some(Pixel::new(1, 1))).unwrap().initial_flat();
    assert_eq!(initial[0], 1000.0);
}

#[test]
fn test_request_values_without_seeding() {
    let mut map = gaussian_map(3, 3, |_, _| 1.0, 0.0, 3);
    prefit(&mut map, Pixel::new(0, 1), PeakShape::Gaussian, &[100.0, 1.0, 0.02]);

    let settings = FitSettings::default().with_neighbour_seeding(false);
    let step = fit_centre(&mut map, &settings);
    assert_eq!(step.seed_ring, None);
    assert_eq!(
        map.fit(Some(Pixel::new(1, 1))).unwrap().initial_flat(),
        vec![50.0, 0.9, 0.05]
    );
}

#[test_log::test]
fn test_whole_map_batch_follows_a_drifting_peak() {
    let log = Arc::new(EventLog::new());
    let mut maps = MapCollection::with_sink(log.clone());
    let centre = |x: usize, y: usize| 0.95 + 0.01 * x as f64 + 0.005 * y as f64;
    let id = maps.add(gaussian_map(4, 3, centre, 1.0, 11));
    log.drain();

    let map = maps.get_mut(id).unwrap();
    let request = gaussian_request([100.0, 0.95, 0.02]);
    let settings = FitSettings::default();
    let area = Area::whole(map);

    let mut reported = Vec::new();
    let summary = BatchFit::new(map, &request, &settings, area, Threshold::full(0))
        .unwrap()
        .run(|_, _| FailureAction::Stop, |done, total| reported.push((done, total)))
        .unwrap();

    assert_eq!(summary.total, 12);
    assert_eq!(summary.fitted, 12);
    assert!(summary.failed.is_empty());
    assert!(!summary.stopped && !summary.cancelled);
    assert_eq!(reported.last(), Some(&(12, 12)));

    for p in map.pixels().collect::<Vec<_>>() {
        let fit = map.fit(Some(p)).unwrap();
        assert_relative_eq!(fit.optimized[0][1], centre(p.x, p.y), epsilon = 1e-3);
    }

    // One notification per x column, on its last pixel
    let expected: Vec<MapEvent> = (0..4)
        .map(|x| MapEvent::FitChanged {
            map: id,
            pixel: Pixel::new(x, 2),
        })
        .collect();
    assert_eq!(log.drain(), expected);
}
