// Basic periodic waveforms.

use std::f64::consts::TAU;

use crate::waveform::{WaveParams, Waveform};

// ═══════════════════════════════════════════════════════════════════
// Sine
// ═══════════════════════════════════════════════════════════════════

pub struct Sine;

impl Waveform for Sine {
    #[inline]
    fn sample(&mut self, phase: f64, _time: f64, _params: &WaveParams) -> f64 {
        (phase * TAU).sin()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Square (naive, non-bandlimited)
// ═══════════════════════════════════════════════════════════════════

pub struct Square;

impl Waveform for Square {
    #[inline]
    fn sample(&mut self, phase: f64, _time: f64, params: &WaveParams) -> f64 {
        if phase < params.duty.clamp(0.0, 1.0) {
            1.0
        } else {
            -1.0
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Saw (naive, non-bandlimited)
// ═══════════════════════════════════════════════════════════════════

pub struct Saw;

impl Waveform for Saw {
    #[inline]
    fn sample(&mut self, phase: f64, _time: f64, _params: &WaveParams) -> f64 {
        2.0 * phase - 1.0
    }
}

// ═══════════════════════════════════════════════════════════════════
// Triangle
// ═══════════════════════════════════════════════════════════════════

/// Starts at zero and rises, like the sine.
pub struct Triangle;

impl Waveform for Triangle {
    #[inline]
    fn sample(&mut self, phase: f64, _time: f64, _params: &WaveParams) -> f64 {
        if phase < 0.25 {
            4.0 * phase
        } else if phase < 0.75 {
            2.0 - 4.0 * phase
        } else {
            4.0 * phase - 4.0
        }
    }
}
