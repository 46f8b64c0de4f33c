//! Integration tests for the specmap-rs library
//!
//! These tests drive maps through the public API only: construction,
//! geometry, fitting, batch sweeps and spectrum processing.

// Map construction, channels, interval and snapshots
pub mod map_model;

// Flips, rotations and their effect on every per-pixel store
pub mod transforms;


// Batch fits seeded from fitted neighbours
pub mod seeding;

// Threshold gating of batch fits and clears
pub mod threshold;

// Background and cosmic-ray removal
pub mod processing;
