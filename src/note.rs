// src/note.rs
//
// A note is one triggered, independently evaluated instance of the
// project's point graph.

use std::sync::Arc;
use std::time::Instant;

use crate::compile::{EvaluationPlan, PlanOp};
use crate::error::Result;
use crate::keymap::Key;
use crate::waveform::{Waveform, WaveformRegistry};

/// Equal-temperament frequency for a signed semitone offset.
#[inline]
pub fn resolve_frequency(reference_pitch: f64, halftone_offset: i32) -> f64 {
    reference_pitch * 2.0_f64.powf(halftone_offset as f64 / 12.0)
}

/// Note lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    Idle,
    /// Built and queued, not rendered yet.
    Triggered,
    Active,
    /// Key released; the tail is still rendering.
    Releasing,
    Done,
}

/// Everything needed to build a note, gathered from the project.
#[derive(Debug, Clone, Copy)]
pub struct NoteSpec {
    pub key: Key,
    pub halftone_offset: i32,
    pub reference_pitch: f64,
    pub sample_rate: f64,
    pub release_seconds: f64,
    pub max_block: usize,
    pub epoch: u64,
    /// Generation of the installed project the plan came from.
    pub generation: u64,
}

/// A live performance event.
///
/// Notes do NOT own the topology; they share the project's plan and
/// carry only their own evaluation state, all sized at construction.
pub struct Note {
    pub key: Key,
    pub halftone_offset: i32,
    pub base_frequency: f64,
    pub triggered_at: Instant,

    state: NoteState,
    plan: Arc<EvaluationPlan>,

    /// Panic epoch this note was created under.
    epoch: u64,
    generation: u64,

    // Per-point state
    waveforms: Vec<Option<Box<dyn Waveform>>>,
    phases: Vec<f64>,
    values: Vec<f64>,

    /// Mono render target, `max_block` frames long.
    scratch: Vec<f32>,

    sample_rate: f64,
    frames_rendered: u64,

    release_samples: f64,
    release_gain: f64,
    release_step: f64,
}

impl Note {
    /// Build a note against a compiled plan.
    ///
    /// Allocates; call from the input context only.
    pub fn new(spec: NoteSpec, plan: Arc<EvaluationPlan>, registry: &WaveformRegistry) -> Result<Self> {
        let waveforms = plan
            .variants()
            .map(|variant| variant.map(|name| registry.create(name)).transpose())
            .collect::<Result<Vec<_>>>()?;

        let n = plan.len();
        Ok(Self {
            key: spec.key,
            halftone_offset: spec.halftone_offset,
            base_frequency: resolve_frequency(spec.reference_pitch, spec.halftone_offset),
            triggered_at: Instant::now(),
            state: NoteState::Triggered,
            plan,
            epoch: spec.epoch,
            generation: spec.generation,
            waveforms,
            phases: vec![0.0; n],
            values: vec![0.0; n],
            scratch: vec![0.0; spec.max_block.max(1)],
            sample_rate: spec.sample_rate,
            frames_rendered: 0,
            release_samples: (spec.release_seconds.max(0.0) * spec.sample_rate).floor(),
            release_gain: 1.0,
            release_step: 0.0,
        })
    }

    #[inline]
    pub fn state(&self) -> NoteState {
        self.state
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the key is still down for this note.
    #[inline]
    pub fn is_held(&self) -> bool {
        matches!(self.state, NoteState::Triggered | NoteState::Active)
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == NoteState::Done
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Key-up: start the release tail. No-op unless held.
    pub fn release(&mut self) {
        if !self.is_held() {
            return;
        }
        if self.release_samples < 1.0 {
            self.state = NoteState::Done;
        } else {
            self.release_step = self.release_gain / self.release_samples;
            self.state = NoteState::Releasing;
        }
    }

    /// Render `frames` mono samples into the note's scratch block.
    ///
    /// Returns `false` if evaluation produced a non-finite sample; the
    /// block is then zeroed and the note is finished.
    pub fn render(&mut self, frames: usize) -> bool {
        let frames = frames.min(self.scratch.len());
        if self.state == NoteState::Triggered {
            self.state = NoteState::Active;
        }

        let mut ok = true;
        for i in 0..frames {
            if self.state == NoteState::Done {
                self.scratch[i] = 0.0;
                continue;
            }

            let value = self.step() * self.release_gain;
            if !value.is_finite() {
                ok = false;
                break;
            }
            self.scratch[i] = value as f32;
            self.frames_rendered += 1;

            if self.state == NoteState::Releasing {
                self.release_gain -= self.release_step;
                if self.release_gain <= 0.0 {
                    self.release_gain = 0.0;
                    self.state = NoteState::Done;
                }
            }
        }

        if !ok {
            self.scratch[..frames].fill(0.0);
            self.state = NoteState::Done;
        }
        ok
    }

    /// Rendered samples from the last `render` call.
    #[inline]
    pub fn output(&self, frames: usize) -> &[f32] {
        &self.scratch[..frames.min(self.scratch.len())]
    }

    /// Evaluate every point once and advance phases by one sample.
    #[inline]
    fn step(&mut self) -> f64 {
        let time = self.frames_rendered as f64 / self.sample_rate;
        let base_frequency = self.base_frequency;
        let sample_rate = self.sample_rate;
        let Self {
            plan,
            waveforms,
            phases,
            values,
            ..
        } = self;

        for &idx in &plan.order {
            let point = &plan.points[idx];
            let value = match &point.op {
                PlanOp::Waveform { params, .. } => {
                    let modulation = point.inputs.first().map_or(0.0, |&i| values[i]);
                    let phase =
                        (phases[idx] + params.phase_offset + params.mod_index * modulation).rem_euclid(1.0);
                    let sample = waveforms[idx]
                        .as_mut()
                        .map_or(0.0, |w| w.sample(phase, time, params));

                    let inc = base_frequency * params.frequency_ratio / sample_rate;
                    phases[idx] = (phases[idx] + inc).rem_euclid(1.0);

                    sample * params.amplitude
                }
                PlanOp::Mixer { gain } => gain * point.inputs.iter().map(|&i| values[i]).sum::<f64>(),
                PlanOp::Gain { gain, offset } => {
                    point.inputs.first().map_or(0.0, |&i| values[i]) * gain + offset
                }
                PlanOp::Multiply => {
                    if point.inputs.is_empty() {
                        0.0
                    } else {
                        point.inputs.iter().map(|&i| values[i]).product()
                    }
                }
            };
            values[idx] = value;
        }

        values[plan.output]
    }
}

impl std::fmt::Debug for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Note")
            .field("key", &self.key)
            .field("base_frequency", &self.base_frequency)
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("generation", &self.generation)
            .field("frames_rendered", &self.frames_rendered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::error::EngineError;
    use crate::graph::PointGraph;
    use crate::point::{params, PointKind};
    use crate::waveforms::standard_registry;

    fn spec(release_seconds: f64) -> NoteSpec {
        NoteSpec {
            key: Key::from('B'),
            halftone_offset: 0,
            reference_pitch: 440.0,
            sample_rate: 44_100.0,
            release_seconds,
            max_block: 64,
            epoch: 0,
            generation: 0,
        }
    }

    fn sine_note(release_seconds: f64) -> Note {
        let plan = Arc::new(compile(&PointGraph::single("sine")).unwrap());
        Note::new(spec(release_seconds), plan, &standard_registry()).unwrap()
    }

    #[test]
    fn test_resolve_frequency_octaves() {
        assert_eq!(resolve_frequency(440.0, 0), 440.0);
        assert!((resolve_frequency(440.0, 12) - 880.0).abs() < 1e-9);
        assert!((resolve_frequency(440.0, -12) - 220.0).abs() < 1e-9);
        assert!((resolve_frequency(440.0, 7) / 440.0 - 1.4983070768766815).abs() < 1e-12);
    }

    #[test]
    fn test_sine_render_follows_curve() {
        let mut note = sine_note(0.0);
        assert_eq!(note.state(), NoteState::Triggered);
        assert!(note.render(32));
        assert_eq!(note.state(), NoteState::Active);

        let inc = 440.0 / 44_100.0;
        for (n, &s) in note.output(32).iter().enumerate() {
            let expected = (std::f64::consts::TAU * inc * n as f64).sin();
            assert!((s as f64 - expected).abs() < 1e-6, "frame {}", n);
        }
    }

    #[test]
    fn test_release_without_tail_is_done() {
        let mut note = sine_note(0.0);
        note.release();
        assert!(note.is_done());
    }

    #[test]
    fn test_release_tail_decays_to_done() {
        // 0.001 s at 44.1 kHz = 44 samples of tail
        let mut note = sine_note(0.001);
        note.render(16);
        note.release();
        assert_eq!(note.state(), NoteState::Releasing);

        note.render(40);
        assert_eq!(note.state(), NoteState::Releasing);
        note.render(8);
        assert!(note.is_done());

        // Second release is a no-op
        note.release();
        assert!(note.is_done());
    }

    #[test]
    fn test_fault_silences_note() {
        let mut graph = PointGraph::new();
        let osc = graph.add_point(PointKind::waveform("sine"));
        let gain = graph.add_point(PointKind::Gain);
        graph.connect(osc, gain, 0).unwrap();
        graph.set_param(gain, params::OFFSET, f64::NAN).unwrap();

        let plan = Arc::new(compile(&graph).unwrap());
        let mut note = Note::new(spec(0.0), plan, &standard_registry()).unwrap();

        assert!(!note.render(16));
        assert!(note.is_done());
        assert!(note.output(16).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_unknown_variant_fails_creation() {
        let plan = Arc::new(compile(&PointGraph::single("organ")).unwrap());
        let err = Note::new(spec(0.0), plan, &standard_registry()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownVariant(ref n) if n == "organ"));
    }

    #[test]
    fn test_ring_modulation() {
        let mut graph = PointGraph::new();
        let a = graph.add_point(PointKind::waveform("square"));
        let b = graph.add_point(PointKind::waveform("square"));
        let ring = graph.add_point(PointKind::Multiply);
        graph.connect(a, ring, 0).unwrap();
        graph.connect(b, ring, 1).unwrap();

        let plan = Arc::new(compile(&graph).unwrap());
        let mut note = Note::new(spec(0.0), plan, &standard_registry()).unwrap();
        note.render(8);

        // Two in-phase squares multiply to +1
        assert!(note.output(8).iter().all(|&s| s == 1.0));
    }
}
