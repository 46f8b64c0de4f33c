//! Background and cosmic-ray removal across whole maps

use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use specmap_rs::{
    remove_background, remove_cosmic_rays, BackgroundMethod, BackgroundRemoval, CancelToken,
    EventLog, MapCollection, MapEvent, Pixel,
};
use std::sync::Arc;

use crate::test_helpers::{channel_map, gaussian_map, init_logging};

#[test]
fn test_sweep_notifies_only_for_focus() {
    init_logging();
    let log = Arc::new(EventLog::new());
    let mut maps = MapCollection::with_sink(log.clone());
    let values = Array2::from_shape_fn((3, 2), |(x, y)| 4.0 * (1 + x + y) as f64);
    let id = maps.add(channel_map(&values));
    log.drain();

    let map = maps.get_mut(id).unwrap();
    let focus = map.focus();
    let mut ticks = Vec::new();
    let done = BackgroundRemoval::new(map, &BackgroundMethod::Minimum)
        .unwrap()
        .run(|done, total| ticks.push((done, total)))
        .unwrap();

    assert_eq!(done, 6);
    assert_eq!(ticks.len(), 6);
    assert_eq!(ticks[5], (6, 6));
    // Flat spectra lose everything, and the intensity channel follows
    for p in map.pixels().collect::<Vec<_>>() {
        assert!(map.spectrum(Some(p)).unwrap().column(1).iter().all(|&v| v == 0.0));
        assert_eq!(map.data(Some(0), Some(p)).unwrap(), 0.0);
    }
    assert_eq!(
        log.drain(),
        vec![MapEvent::SpectrumChanged { map: id, pixel: focus }]
    );
}

#[test]
fn test_pixel_background_uses_original_reference() {
    let mut map = gaussian_map(2, 2, |x, _| 0.95 + 0.1 * x as f64, 0.0, 9);
    let reference = Pixel::new(0, 0);
    let before = map.spectrum(Some(Pixel::new(1, 1))).unwrap().column(1).to_owned();
    let background = map.spectrum(Some(reference)).unwrap().column(1).to_owned();

    let mut removal = BackgroundRemoval::new(&mut map, &BackgroundMethod::FromPixel(reference))
        .unwrap();
    assert_eq!(removal.total(), 4);
    let corrected: Vec<Pixel> = removal.by_ref().map(|step| step.unwrap()).collect();
    assert_eq!(corrected.len(), 4);

    assert!(map
        .spectrum(Some(reference))
        .unwrap()
        .column(1)
        .iter()
        .all(|&v| v == 0.0));
    let after = map.spectrum(Some(Pixel::new(1, 1))).unwrap().column(1).to_owned();
    assert_eq!(after, &before - &background);
}

#[test]
fn test_fixed_background_on_one_pixel() {
    let mut map = channel_map(&Array2::from_elem((2, 2), 8.0));
    let method = BackgroundMethod::FromSpectrum(Array1::from(vec![1.0, 0.5, 0.0, 2.0]));
    remove_background(&mut map, &method, Some(Pixel::new(1, 0))).unwrap();

    let spectrum = map.spectrum(Some(Pixel::new(1, 0))).unwrap();
    assert_eq!(spectrum.column(1).to_vec(), vec![1.0, 1.5, 2.0, 0.0]);
    assert_relative_eq!(map.data(Some(0), Some(Pixel::new(1, 0))).unwrap(), 4.5);
    assert_relative_eq!(map.data(Some(0), Some(Pixel::new(0, 0))).unwrap(), 8.0);

    let short = BackgroundMethod::FromSpectrum(Array1::zeros(3));
    assert!(remove_background(&mut map, &short, None).is_err());
}

#[test]
fn test_cancelled_sweep_stops_before_first_pixel() {
    let mut map = channel_map(&Array2::from_elem((2, 2), 8.0));
    let token = CancelToken::new();
    token.cancel();

    let done = BackgroundRemoval::new(&mut map, &BackgroundMethod::Minimum)
        .unwrap()
        .with_cancel(token.clone())
        .run(|_, _| {})
        .unwrap();
    assert_eq!(done, 0);
    assert_eq!(remove_cosmic_rays(&mut map, 1.0, &token).unwrap(), 0);
    assert_eq!(map.data(Some(0), Some(Pixel::new(0, 0))).unwrap(), 8.0);
}

#[test]
fn test_cosmic_ray_is_replaced_by_neighbour_mean() {
    let mut map = gaussian_map(3, 3, |_, _| 1.0, 0.0, 2);
    let hit = Pixel::new(1, 1);
    let clean = map.spectrum(Some(hit)).unwrap().to_owned();

    let mut spiked = clean.clone();
    spiked[[20, 1]] += 5000.0;
    map.set_spectrum(spiked.view(), Some(hit), false).unwrap();

    let replaced = remove_cosmic_rays(&mut map, 100.0, &CancelToken::new()).unwrap();
    assert_eq!(replaced, 1);

    // Every pixel holds the same peak, so the neighbour mean is the clean value
    let restored = map.spectrum(Some(hit)).unwrap();
    assert_relative_eq!(restored[[20, 1]], clean[[20, 1]], epsilon = 1e-9);
    assert_relative_eq!(
        map.data(Some(0), Some(hit)).unwrap(),
        clean.column(1).sum(),
        epsilon = 1e-6
    );
}

#[test]
fn test_cosmic_ray_removal_notifies_each_rewritten_pixel() {
    let log = Arc::new(EventLog::new());
    let mut maps = MapCollection::with_sink(log.clone());
    let id = maps.add(gaussian_map(3, 3, |_, _| 1.0, 0.0, 4));
    let map = maps.get_mut(id).unwrap();

    let hits = [Pixel::new(0, 0), Pixel::new(2, 1)];
    for &p in &hits {
        let mut spiked = map.spectrum(Some(p)).unwrap().to_owned();
        spiked[[50, 1]] += 5000.0;
        map.set_spectrum(spiked.view(), Some(p), false).unwrap();
    }
    log.drain();

    assert_eq!(remove_cosmic_rays(map, 100.0, &CancelToken::new()).unwrap(), 2);
    // Clean pixels, the focus included, are not rewritten
    assert_eq!(
        log.drain(),
        hits.iter()
            .map(|&pixel| MapEvent::SpectrumChanged { map: id, pixel })
            .collect::<Vec<_>>()
    );
}
