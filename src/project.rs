// src/project.rs
//
// Project state.
//
// A Project is an immutable value: topology plus output configuration.
// Changing anything means building a new Project and swapping it in.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compile::{compile, EvaluationPlan};
use crate::error::{self, EngineError, GraphError};
use crate::graph::PointGraph;

/// How summed notes are brought into the output range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixPolicy {
    /// Raw sum.
    Unclipped,
    /// Clamp to [-1, 1].
    #[default]
    HardClip,
    /// `tanh` saturation.
    SoftClip,
}

impl MixPolicy {
    #[inline]
    pub fn apply(self, sample: f32) -> f32 {
        match self {
            MixPolicy::Unclipped => sample,
            MixPolicy::HardClip => sample.clamp(-1.0, 1.0),
            MixPolicy::SoftClip => sample.tanh(),
        }
    }
}

/// Output and tuning configuration of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frequency of halftone offset 0, in Hz.
    pub reference_pitch: f64,
    /// Length of the tail after key-up.
    pub release_seconds: f64,
    pub master_gain: f32,
    pub mix_policy: MixPolicy,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            reference_pitch: 440.0,
            release_seconds: 0.05,
            master_gain: 1.0,
            mix_policy: MixPolicy::HardClip,
        }
    }
}

impl ProjectSettings {
    /// Reject settings no render pass can honor.
    pub fn validate(&self) -> error::Result<()> {
        if self.channels == 0 {
            return Err(EngineError::InvalidSettings("channel count must be at least 1".into()));
        }
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidSettings("sample rate must be positive".into()));
        }
        if !(self.reference_pitch.is_finite() && self.reference_pitch > 0.0) {
            return Err(EngineError::InvalidSettings(format!(
                "reference pitch {} is not a positive frequency",
                self.reference_pitch
            )));
        }
        if !(self.release_seconds.is_finite() && self.release_seconds >= 0.0) {
            return Err(EngineError::InvalidSettings(format!(
                "release of {} s is not a valid duration",
                self.release_seconds
            )));
        }
        Ok(())
    }
}

/// Topology plus configuration, with the evaluation plan compiled once.
///
/// Settings are validated on every construction path, so a project in
/// hand always has at least one channel.
#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    graph: PointGraph,
    settings: ProjectSettings,
    plan: Result<Arc<EvaluationPlan>, GraphError>,
}

impl Project {
    /// Build a project. Fails on invalid settings; a malformed graph is
    /// kept and reported by [`plan`](Self::plan).
    pub fn new(name: impl Into<String>, graph: PointGraph, settings: ProjectSettings) -> error::Result<Self> {
        settings.validate()?;
        Ok(Self::from_parts(name.into(), graph, settings))
    }

    /// A fresh project playing a single waveform.
    pub fn new_default(waveform: &str) -> Self {
        Self::from_parts("Untitled".into(), PointGraph::single(waveform), ProjectSettings::default())
    }

    fn from_parts(name: String, graph: PointGraph, settings: ProjectSettings) -> Self {
        let plan = compile(&graph).map(Arc::new);
        Self {
            name,
            graph,
            settings,
            plan,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &PointGraph {
        &self.graph
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    /// The compiled plan every note of this project shares.
    ///
    /// Fails if the template is cyclic or otherwise malformed.
    pub fn plan(&self) -> Result<&Arc<EvaluationPlan>, GraphError> {
        self.plan.as_ref().map_err(Clone::clone)
    }

    /// Same topology with different settings. The plan is shared, not
    /// recompiled.
    pub fn with_settings(&self, settings: ProjectSettings) -> error::Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            ..self.clone()
        })
    }

    /// Replace the topology, recompiling the plan.
    pub fn with_graph(&self, graph: PointGraph) -> Self {
        Self::from_parts(self.name.clone(), graph, self.settings.clone())
    }
}
