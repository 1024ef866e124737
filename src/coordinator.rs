//! Render coordinator: the boundary between the input context and the
//! audio-pull context.
//!
//! # Architecture
//!
//! - **Input context** owns [`ControlHandle`]: builds notes, releases keys,
//!   panics and swaps projects.
//! - **Audio context** owns [`RenderHandle`]: serves sample blocks on the
//!   device's schedule.
//! - Notes travel input -> render over a wait-free `rtrb` ring and come
//!   back over a second ring to be dropped off the audio thread.
//! - The current project is published through an `ArcSwap`.
//! - Panic is an atomic epoch, so it cannot be lost to a full queue.
//!
//! Neither side ever takes a lock.
//!
//! # Memory ordering
//!
//! `swap_project` bumps the panic epoch (`SeqCst` read-modify-write) and
//! then publishes the new project with `ArcSwap::store`, a `SeqCst`
//! exchange of the pointer. `ArcSwap::load` on the render side has at
//! least `Acquire` semantics, so a block either sees the old project or
//! the new one fully constructed. Each installed project carries a
//! generation number and every note records the generation it was built
//! from; a block only mixes notes whose generation matches the project it
//! loaded, and retires older ones.
//!
//! # Usage
//!
//! ```ignore
//! let (mut control, mut render) = create_coordinator(project, registry, EngineConfig::default());
//!
//! // Input thread
//! control.trigger_note(Key::from('B'), 0)?;
//!
//! // Audio thread
//! let block = render.pull_block(256);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use arc_swap::ArcSwap;

use crate::command::{COMMAND_QUEUE_CAPACITY, Command, command_channel, retire_channel};
use crate::error::{EngineError, Result};
use crate::keymap::{Key, KeyAction, KeyMap};
use crate::note::{Note, NoteSpec};
use crate::note_set::{Admission, NoteSet};
use crate::project::Project;
use crate::waveform::WaveformRegistry;

/// Sizing of the real-time side. Everything here is allocated once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Largest number of frames a note renders in one pass. Larger
    /// requests are split.
    pub max_block: usize,
    /// Capacity of the active-note set.
    pub max_notes: usize,
    /// Capacity of the input -> render queue.
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_block: 512,
            max_notes: 32,
            command_capacity: COMMAND_QUEUE_CAPACITY,
        }
    }
}

/// A project as published to the render side.
struct Installed {
    project: Arc<Project>,
    generation: u64,
}

/// Lock-free render -> input readback.
struct SharedReadback {
    active_notes: AtomicUsize,
    frames_rendered: AtomicU64,
    blocks_rendered: AtomicU64,
    /// Triggers discarded because the note set was full.
    dropped_notes: AtomicU64,
    /// Notes silenced because they produced non-finite samples.
    faulted_notes: AtomicU64,
    running: AtomicBool,
}

impl SharedReadback {
    fn new() -> Self {
        Self {
            active_notes: AtomicUsize::new(0),
            frames_rendered: AtomicU64::new(0),
            blocks_rendered: AtomicU64::new(0),
            dropped_notes: AtomicU64::new(0),
            faulted_notes: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }
}

/// State visible to both handles.
struct Shared {
    project: ArcSwap<Installed>,
    panic_epoch: AtomicU64,
    readback: SharedReadback,
}

/// Read-only snapshot for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub running: bool,
    pub project_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub active_notes: usize,
    pub frames_rendered: u64,
    pub blocks_rendered: u64,
    pub dropped_notes: u64,
    pub faulted_notes: u64,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.running {
            write!(
                f,
                "Playing; {}, {}; notes: {}",
                self.sample_rate, self.channels, self.active_notes
            )
        } else {
            write!(f, "Stopped;")
        }
    }
}

/// Create a linked pair of handles around an initial project.
pub fn create_coordinator(
    project: Project,
    registry: Arc<WaveformRegistry>,
    config: EngineConfig,
) -> (ControlHandle, RenderHandle) {
    let channels = project.settings().channels as usize;
    let shared = Arc::new(Shared {
        project: ArcSwap::from_pointee(Installed {
            project: Arc::new(project),
            generation: 0,
        }),
        panic_epoch: AtomicU64::new(0),
        readback: SharedReadback::new(),
    });

    let max_block = config.max_block.max(1);
    let (command_tx, command_rx) = command_channel(config.command_capacity);
    // Every note that can be in flight must fit on the way back
    let (retired_tx, retired_rx) = retire_channel(config.command_capacity + config.max_notes);

    let control = ControlHandle {
        shared: Arc::clone(&shared),
        registry,
        config: EngineConfig { max_block, ..config },
        command_tx,
        retired_rx,
        generation: 0,
    };

    let render = RenderHandle {
        shared,
        notes: NoteSet::new(config.max_notes),
        command_rx,
        retired_tx,
        mix: vec![0.0; max_block],
        output: vec![0.0; max_block * channels],
        max_block,
    };

    (control, render)
}

// ═══════════════════════════════════════════════════════════════════
// ControlHandle - Input Context API
// ═══════════════════════════════════════════════════════════════════

/// Handle for the input context.
///
/// Every method may be called at any time, including while a block is
/// being rendered on another thread.
pub struct ControlHandle {
    shared: Arc<Shared>,
    registry: Arc<WaveformRegistry>,
    config: EngineConfig,
    command_tx: rtrb::Producer<Command>,
    retired_rx: rtrb::Consumer<Box<Note>>,
    generation: u64,
}

impl ControlHandle {
    /// Build a note for `key` against the current project and queue it.
    ///
    /// Fails with `UnknownVariant` or a graph error (e.g. a cycle) if the
    /// project's template cannot be instantiated; the active notes are
    /// unaffected. Triggering a key that is already held is accepted here
    /// and ignored by the render side.
    pub fn trigger_note(&mut self, key: Key, halftone_offset: i32) -> Result<()> {
        self.collect_retired();

        // Epoch before project: a panic or swap that lands in between
        // makes this note stale instead of letting it survive.
        let epoch = self.shared.panic_epoch.load(Ordering::Acquire);
        let installed = self.shared.project.load_full();
        let project = &installed.project;
        let settings = project.settings();

        let plan = match project.plan() {
            Ok(plan) => Arc::clone(plan),
            Err(e) => {
                log::warn!("cannot trigger {}: {}", key, e);
                return Err(e.into());
            }
        };

        let spec = NoteSpec {
            key,
            halftone_offset,
            reference_pitch: settings.reference_pitch,
            sample_rate: settings.sample_rate as f64,
            release_seconds: settings.release_seconds,
            max_block: self.config.max_block,
            epoch,
            generation: installed.generation,
        };
        let note = Note::new(spec, plan, &self.registry)?;
        log::debug!("trigger {} ({:+} st, {:.3} Hz)", key, halftone_offset, note.base_frequency);

        self.command_tx.push(Command::NoteOn(Box::new(note))).map_err(|_| {
            log::warn!("command queue full, trigger {} dropped", key);
            EngineError::QueueFull
        })
    }

    /// Key-up. Releasing a key with no held note does nothing.
    pub fn release_note(&mut self, key: Key) -> Result<()> {
        self.collect_retired();
        self.command_tx.push(Command::NoteOff(key)).map_err(|_| {
            log::warn!("command queue full, release {} dropped", key);
            EngineError::QueueFull
        })
    }

    /// Silence and clear every note, including ones still queued.
    pub fn panic(&mut self) {
        let epoch = self.shared.panic_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("panic (epoch {})", epoch);
        self.collect_retired();
    }

    /// Replace the project. All notes are cleared first.
    pub fn swap_project(&mut self, project: Project) {
        self.panic();
        self.generation += 1;
        log::info!(
            "swapping in project '{}' (generation {}, {} Hz, {} ch)",
            project.name(),
            self.generation,
            project.settings().sample_rate,
            project.settings().channels
        );
        self.shared.project.store(Arc::new(Installed {
            project: Arc::new(project),
            generation: self.generation,
        }));
    }

    /// Dispatch a key-down through a key map.
    pub fn key_down(&mut self, key: Key, keymap: &KeyMap) -> Result<()> {
        match keymap.resolve(key) {
            KeyAction::Trigger { halftone_offset } => self.trigger_note(key, halftone_offset),
            KeyAction::Panic => {
                self.panic();
                Ok(())
            }
            KeyAction::Unmapped => {
                log::debug!("unmapped key {}", key);
                Ok(())
            }
        }
    }

    /// Dispatch a key-up through a key map.
    pub fn key_up(&mut self, key: Key, keymap: &KeyMap) -> Result<()> {
        match keymap.resolve(key) {
            KeyAction::Trigger { .. } => self.release_note(key),
            KeyAction::Panic | KeyAction::Unmapped => Ok(()),
        }
    }

    /// The currently published project.
    pub fn project(&self) -> Arc<Project> {
        Arc::clone(&self.shared.project.load().project)
    }

    pub fn registry(&self) -> &Arc<WaveformRegistry> {
        &self.registry
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Mark whether a device is currently pulling (status display only).
    pub fn set_running(&self, running: bool) {
        self.shared.readback.running.store(running, Ordering::Release);
    }

    pub fn status(&self) -> EngineStatus {
        let installed = self.shared.project.load();
        let settings = installed.project.settings();
        let rb = &self.shared.readback;
        EngineStatus {
            running: rb.running.load(Ordering::Acquire),
            project_name: installed.project.name().to_string(),
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            active_notes: rb.active_notes.load(Ordering::Relaxed),
            frames_rendered: rb.frames_rendered.load(Ordering::Relaxed),
            blocks_rendered: rb.blocks_rendered.load(Ordering::Relaxed),
            dropped_notes: rb.dropped_notes.load(Ordering::Relaxed),
            faulted_notes: rb.faulted_notes.load(Ordering::Relaxed),
        }
    }

    /// Drop notes the render side has finished with.
    fn collect_retired(&mut self) {
        while let Ok(note) = self.retired_rx.pop() {
            drop(note);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// RenderHandle - Audio Context API
// ═══════════════════════════════════════════════════════════════════

/// Handle for the audio-pull context.
///
/// Owns the active-note set. `pull_block` must not be called
/// re-entrantly, which `&mut self` enforces.
pub struct RenderHandle {
    shared: Arc<Shared>,
    notes: NoteSet,
    command_rx: rtrb::Consumer<Command>,
    retired_tx: rtrb::Producer<Box<Note>>,
    /// Mono mix of one chunk.
    mix: Vec<f32>,
    /// Interleaved output served by `pull_block`.
    output: Vec<f32>,
    max_block: usize,
}

impl RenderHandle {
    /// Render `frames` frames and return them interleaved
    /// (`frames * channels` samples).
    ///
    /// Does not allocate unless `frames` exceeds every earlier request
    /// and the configured block size.
    pub fn pull_block(&mut self, frames: usize) -> &[f32] {
        let shared = Arc::clone(&self.shared);
        let epoch = shared.panic_epoch.load(Ordering::Acquire);
        let installed = shared.project.load();

        let channels = installed.project.settings().channels as usize;
        let len = frames * channels;
        if self.output.len() < len {
            self.output.resize(len, 0.0);
        }

        let mut output = std::mem::take(&mut self.output);
        self.render(&mut output[..len], channels, epoch, &installed);
        self.output = output;

        &self.output[..len]
    }

    /// Render into a caller-owned interleaved buffer. The frame count is
    /// `out.len() / channels`; any trailing partial frame is zeroed.
    ///
    /// Returns the number of frames rendered.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let shared = Arc::clone(&self.shared);
        let epoch = shared.panic_epoch.load(Ordering::Acquire);
        let installed = shared.project.load();

        let channels = installed.project.settings().channels as usize;
        let frames = out.len() / channels;
        let (body, tail) = out.split_at_mut(frames * channels);
        tail.fill(0.0);
        self.render(body, channels, epoch, &installed);
        frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.project.load().project.settings().sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.shared.project.load().project.settings().channels
    }

    /// Notes currently owned by the render side.
    pub fn active_notes(&self) -> usize {
        self.notes.len()
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    fn render(&mut self, out: &mut [f32], channels: usize, epoch: u64, installed: &Installed) {
        let generation = installed.generation;
        let settings = installed.project.settings();

        // 1. Anything from before the last panic or project swap goes
        self.retire(|n| n.is_done() || n.epoch() < epoch || n.generation() < generation);

        // 2. Apply queued commands in order
        self.drain_commands(epoch, generation);

        // 3. Mix every note built from this project
        out.fill(0.0);
        let frames = out.len() / channels;
        let mut faulted = 0u64;
        let mut offset = 0;

        while offset < frames {
            let chunk = (frames - offset).min(self.max_block);
            let mix = &mut self.mix[..chunk];
            mix.fill(0.0);

            for note in self.notes.iter_mut() {
                if note.is_done() || note.generation() != generation {
                    continue;
                }
                if !note.render(chunk) {
                    faulted += 1;
                    continue;
                }
                for (m, s) in mix.iter_mut().zip(note.output(chunk)) {
                    *m += s;
                }
            }

            let start = offset * channels;
            for (frame, &m) in out[start..start + chunk * channels]
                .chunks_exact_mut(channels)
                .zip(mix.iter())
            {
                frame.fill(settings.mix_policy.apply(m * settings.master_gain));
            }

            offset += chunk;
        }

        // 4. Drop what finished during this block
        self.retire(|n| n.is_done());

        let rb = &self.shared.readback;
        rb.active_notes.store(self.notes.len(), Ordering::Relaxed);
        rb.frames_rendered.fetch_add(frames as u64, Ordering::Relaxed);
        rb.blocks_rendered.fetch_add(1, Ordering::Relaxed);
        if faulted > 0 {
            rb.faulted_notes.fetch_add(faulted, Ordering::Relaxed);
        }
    }

    fn drain_commands(&mut self, epoch: u64, generation: u64) {
        while let Ok(command) = self.command_rx.pop() {
            match command {
                Command::NoteOn(note) => {
                    if note.epoch() < epoch || note.generation() < generation {
                        self.send_back(note);
                        continue;
                    }
                    match self.notes.admit(note) {
                        Admission::Admitted => {}
                        Admission::Duplicate(note) => self.send_back(note),
                        Admission::Full(note) => {
                            self.shared.readback.dropped_notes.fetch_add(1, Ordering::Relaxed);
                            self.send_back(note);
                        }
                    }
                }
                Command::NoteOff(key) => self.notes.release(key),
            }
        }
    }

    fn retire<P>(&mut self, retire: P)
    where
        P: FnMut(&Note) -> bool,
    {
        let retired_tx = &mut self.retired_tx;
        self.notes.retire_where(retire, |note| {
            // Ring full: the note drops here instead
            let _ = retired_tx.push(note);
        });
    }

    fn send_back(&mut self, note: Box<Note>) {
        let _ = self.retired_tx.push(note);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PointGraph;
    use crate::point::PointKind;
    use crate::project::{MixPolicy, ProjectSettings};
    use crate::waveforms::standard_registry;

    fn settings() -> ProjectSettings {
        ProjectSettings {
            sample_rate: 44_100,
            channels: 1,
            release_seconds: 0.0,
            mix_policy: MixPolicy::Unclipped,
            ..ProjectSettings::default()
        }
    }

    fn pair(graph: PointGraph) -> (ControlHandle, RenderHandle) {
        create_coordinator(
            Project::new("test", graph, settings()).unwrap(),
            Arc::new(standard_registry()),
            EngineConfig {
                max_block: 64,
                max_notes: 4,
                command_capacity: 16,
            },
        )
    }

    #[test]
    fn test_silence_without_notes() {
        let (_control, mut render) = pair(PointGraph::single("sine"));
        let block = render.pull_block(128);
        assert_eq!(block.len(), 128);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_pull_zero_frames() {
        let (_control, mut render) = pair(PointGraph::single("sine"));
        assert!(render.pull_block(0).is_empty());
    }

    #[test]
    fn test_block_larger_than_max_block() {
        let (mut control, mut render) = pair(PointGraph::single("sine"));
        control.trigger_note(Key::from('B'), 0).unwrap();

        let block = render.pull_block(200).to_vec();
        let inc = 440.0 / 44_100.0;
        for (n, &s) in block.iter().enumerate() {
            let expected = (std::f64::consts::TAU * inc * n as f64).sin();
            assert!((s as f64 - expected).abs() < 1e-5, "frame {}", n);
        }
    }

    #[test]
    fn test_panic_drops_queued_notes() {
        let (mut control, mut render) = pair(PointGraph::single("sine"));
        control.trigger_note(Key::from('B'), 0).unwrap();
        control.panic();

        assert!(render.pull_block(64).iter().all(|&s| s == 0.0));
        assert_eq!(render.active_notes(), 0);

        // A trigger after the panic plays normally
        control.trigger_note(Key::from('B'), 0).unwrap();
        render.pull_block(64);
        assert_eq!(render.active_notes(), 1);
    }

    #[test]
    fn test_cycle_rejected_and_render_continues() {
        let mut cyclic = PointGraph::new();
        let a = cyclic.add_point(PointKind::Gain);
        let b = cyclic.add_point(PointKind::Gain);
        cyclic.connect(a, b, 0).unwrap();
        cyclic.connect(b, a, 0).unwrap();
        let (mut control, mut render) = pair(cyclic);

        let err = control.trigger_note(Key::from('B'), 0).unwrap_err();
        assert!(matches!(err, EngineError::Graph(crate::error::GraphError::Cycle { .. })));
        assert!(render.pull_block(16).iter().all(|&s| s == 0.0));
        assert_eq!(render.active_notes(), 0);

        // A valid project plays again
        control.swap_project(Project::new("ok", PointGraph::single("sine"), settings()).unwrap());
        control.trigger_note(Key::from('B'), 0).unwrap();
        render.pull_block(16);
        assert!(render.pull_block(16).iter().any(|&s| s != 0.0));
        assert_eq!(render.active_notes(), 1);
    }

    #[test]
    fn test_queue_full() {
        let (mut control, _render) = create_coordinator(
            Project::new("test", PointGraph::single("sine"), settings()).unwrap(),
            Arc::new(standard_registry()),
            EngineConfig {
                max_block: 16,
                max_notes: 4,
                command_capacity: 1,
            },
        );
        control.release_note(Key::from('B')).unwrap();
        assert!(matches!(control.release_note(Key::from('B')), Err(EngineError::QueueFull)));
    }

    #[test]
    fn test_note_capacity_counts_dropped() {
        let (mut control, mut render) = pair(PointGraph::single("sine"));
        for c in ['Z', 'X', 'C', 'V', 'B'] {
            control.trigger_note(Key::from(c), 0).unwrap();
        }
        render.pull_block(8);

        let status = control.status();
        assert_eq!(status.active_notes, 4);
        assert_eq!(status.dropped_notes, 1);
    }

    #[test]
    fn test_status_display() {
        let (control, mut render) = pair(PointGraph::single("sine"));
        assert_eq!(control.status().to_string(), "Stopped;");

        control.set_running(true);
        render.pull_block(32);
        let status = control.status();
        assert_eq!(status.to_string(), "Playing; 44100, 1; notes: 0");
        assert_eq!(status.frames_rendered, 32);
        assert_eq!(status.blocks_rendered, 1);
    }

    #[test]
    fn test_fill_interleaves_channels() {
        let (mut control, mut render) = create_coordinator(
            Project::new(
                "stereo",
                PointGraph::single("square"),
                ProjectSettings {
                    channels: 2,
                    ..settings()
                },
            )
            .unwrap(),
            Arc::new(standard_registry()),
            EngineConfig::default(),
        );
        control.trigger_note(Key::from('B'), 0).unwrap();

        let mut out = [9.0f32; 9];
        assert_eq!(render.fill(&mut out), 4);
        assert_eq!(&out[..8], &[1.0; 8]);
        assert_eq!(out[8], 0.0);
    }
}
