// src/point.rs
//
// Sound points: the declarative nodes of a point graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a point within one graph.
pub type PointId = u32;

/// Maximum number of inputs a mixer accepts.
pub const MIXER_MAX_INPUTS: usize = 8;

// ═══════════════════════════════════════════════════════════════════
// Parameter names
// ═══════════════════════════════════════════════════════════════════

pub mod params {
    // Waveform params
    pub const AMPLITUDE: &str = "amplitude";
    pub const FREQUENCY_RATIO: &str = "frequency_ratio";
    pub const PHASE_OFFSET: &str = "phase_offset";
    pub const MOD_INDEX: &str = "mod_index";
    pub const DUTY: &str = "duty";

    // Gain/mixer params
    pub const GAIN: &str = "gain";
    pub const OFFSET: &str = "offset";
}

/// What a point computes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointKind {
    /// A waveform variant looked up by name in the registry.
    /// Input slot 0 modulates the phase.
    Waveform { variant: String },

    /// Sum of all inputs, scaled by `gain`.
    Mixer,

    /// `input * gain + offset`.
    Gain,

    /// Product of the connected inputs.
    Multiply,
}

impl PointKind {
    pub fn waveform(variant: impl Into<String>) -> Self {
        PointKind::Waveform {
            variant: variant.into(),
        }
    }

    /// Number of input slots this kind declares.
    pub fn arity(&self) -> usize {
        match self {
            PointKind::Waveform { .. } => 1,
            PointKind::Mixer => MIXER_MAX_INPUTS,
            PointKind::Gain => 1,
            PointKind::Multiply => 2,
        }
    }
}

/// One node of a point graph.
///
/// Inputs are stored by id, in slot order, so a graph can be cloned or
/// serialized without aliasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundPoint {
    pub id: PointId,
    pub kind: PointKind,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default)]
    pub inputs: Vec<PointId>,
}

impl SoundPoint {
    pub fn new(id: PointId, kind: PointKind) -> Self {
        Self {
            id,
            kind,
            parameters: BTreeMap::new(),
            inputs: Vec::new(),
        }
    }

    /// Builder-style parameter setter.
    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    #[inline]
    pub fn param_or(&self, name: &str, default: f64) -> f64 {
        self.parameters.get(name).copied().unwrap_or(default)
    }
}
