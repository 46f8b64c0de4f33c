//! Threshold gating of batch fits and clears

use approx::assert_relative_eq;
use ndarray::Array2;
use specmap_rs::fitting::select_pixels;
use specmap_rs::{
    clear_fits, Area, BatchFit, CancelToken, EventLog, FailureAction, FitSettings,
    IntervalSide, MapCollection, MapEvent, PeakShape, Pixel, Threshold,
};
use std::sync::Arc;

use crate::test_helpers::{channel_map, gaussian_map, gaussian_request, init_logging, single};

fn xs(pixels: &[Pixel]) -> Vec<usize> {
    pixels.iter().map(|p| p.x).collect()
}

#[test]
fn test_threshold_keeps_middle_of_the_range() {
    init_logging();
    let values = Array2::from_shape_fn((11, 1), |(x, _)| x as f64);
    let map = channel_map(&values);
    let area = Area::whole(&map);

    let picked = select_pixels(&map, area, Threshold::new(0, 2000, 8000).unwrap(), false).unwrap();
    assert_eq!(xs(&picked), (2..=8).collect::<Vec<_>>());

    let all = select_pixels(&map, area, Threshold::full(0), false).unwrap();
    assert_eq!(all.len(), 11);

    // A zero-width gate still matches the values sitting exactly on it
    let top = select_pixels(&map, area, Threshold::new(0, 10_000, 10_000).unwrap(), false).unwrap();
    assert_eq!(xs(&top), vec![10]);
}

#[test]
fn test_fitted_pixels_need_overwrite() {
    let values = Array2::from_shape_fn((3, 3), |(x, y)| (x + y) as f64);
    let mut map = channel_map(&values);
    map.set_fit(
        single(PeakShape::Gaussian),
        &[1.0, 1.0, 0.1],
        &[1.0, 1.0, 0.1],
        Some(Pixel::new(1, 1)),
        false,
    )
    .unwrap();
    let area = Area::new(0, 2, 1, 1);

    let fresh = select_pixels(&map, area, Threshold::full(0), false).unwrap();
    assert_eq!(fresh, vec![Pixel::new(0, 1), Pixel::new(2, 1)]);
    let every = select_pixels(&map, area, Threshold::full(0), true).unwrap();
    assert_eq!(every.len(), 3);
}

#[test]
fn test_fit_channel_gates_with_unfitted_pixels_ignored() {
    let values = Array2::zeros((3, 2));
    let mut map = channel_map(&values);
    for (x, center) in [(0, 1.0), (1, 1.5), (2, 2.0)] {
        map.set_fit(
            single(PeakShape::Lorentzian),
            &[1.0, center, 0.01],
            &[1.0, center, 0.01],
            Some(Pixel::new(x, 0)),
            false,
        )
        .unwrap();
    }
    // Channel 2 is the center of slot 0; row y = 1 holds NaN
    let gate = Threshold::new(2, 4000, 10_000).unwrap();
    let picked = select_pixels(&map, Area::whole(&map), gate, true).unwrap();
    assert_eq!(picked, vec![Pixel::new(1, 0), Pixel::new(2, 0)]);
}

#[test_log::test]
fn test_batch_fits_only_bright_pixels() {
    let centre = |x: usize, _: usize| 0.85 + 0.05 * x as f64;
    let mut map = gaussian_map(7, 2, centre, 0.0, 5);
    // Integrate 0.95..1.05 so that only peaks near 1.0 are bright
    map.set_interval(IntervalSide::Lower, 75).unwrap();
    map.set_interval(IntervalSide::Upper, 125).unwrap();

    let request = gaussian_request([100.0, 1.0, 0.02]);
    let settings = FitSettings::default();
    let area = Area::whole(&map);
    let gate = Threshold::new(0, 3000, 10_000).unwrap();

    let summary = BatchFit::new(&mut map, &request, &settings, area, gate)
        .unwrap()
        .run(|_, _| FailureAction::Continue, |_, _| {})
        .unwrap();
    assert_eq!(summary.fitted, 6);

    for p in map.pixels().collect::<Vec<_>>() {
        let fitted = map.has_fit(p).unwrap();
        assert_eq!(fitted, (2..=4).contains(&p.x), "pixel {}", p);
        if fitted {
            let fit = map.fit(Some(p)).unwrap();
            assert_relative_eq!(fit.optimized[0][1], centre(p.x, p.y), epsilon = 1e-6);
        }
    }
}

#[test]
fn test_clear_respects_gate_and_notifies_per_column() {
    let log = Arc::new(EventLog::new());
    let mut maps = MapCollection::with_sink(log.clone());
    let values = Array2::from_shape_fn((3, 3), |(x, _)| x as f64);
    let id = maps.add(channel_map(&values));

    let map = maps.get_mut(id).unwrap();
    for p in map.pixels().collect::<Vec<_>>() {
        map.set_fit(
            single(PeakShape::Voigt),
            &[1.0, 1.0, 0.01, 0.01],
            &[1.0, 1.0, 0.01, 0.01],
            Some(p),
            false,
        )
        .unwrap();
    }
    log.drain();

    // Values 1 and 2 pass, column x = 0 keeps its fits
    let gate = Threshold::new(0, 5000, 10_000).unwrap();
    let area = Area::whole(map);
    let cleared = clear_fits(map, area, gate, &CancelToken::new()).unwrap();
    assert_eq!(cleared, 6);

    for p in map.pixels().collect::<Vec<_>>() {
        assert_eq!(map.has_fit(p).unwrap(), p.x == 0, "pixel {}", p);
    }
    assert_eq!(
        log.drain(),
        vec![
            MapEvent::FitChanged {
                map: id,
                pixel: Pixel::new(1, 2)
            },
            MapEvent::FitChanged {
                map: id,
                pixel: Pixel::new(2, 2)
            },
        ]
    );
}
