// src/lib.rs
//
// Library entry point.
//
// Layers, bottom-up:
// - waveform / waveforms: per-sample generators and their registry
// - point / graph / compile: the project's synthesis template
// - note / note_set: per-key evaluation state
// - coordinator: the input <-> audio boundary
// - device / player: output and playback control

pub mod command;
pub mod compile;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod graph;
pub mod keymap;
pub mod note;
pub mod note_set;
pub mod persistence;
pub mod player;
pub mod point;
pub mod preferences;
pub mod project;
pub mod waveform;
pub mod waveforms;

// Re-export key types for Rust consumers
pub use compile::{EvaluationPlan, compile};
pub use coordinator::{ControlHandle, EngineConfig, EngineStatus, RenderHandle, create_coordinator};
pub use device::{OfflineDevice, OutputDevice, StartError, ThreadedDevice};
pub use error::{DeviceError, EngineError, GraphError, Result};
pub use graph::PointGraph;
pub use keymap::{Key, KeyAction, KeyMap};
pub use note::{NoteState, resolve_frequency};
pub use persistence::{ProjectFile, load_project, save_project, write_wav};
pub use player::Player;
pub use point::{PointId, PointKind, SoundPoint};
pub use preferences::Preferences;
pub use project::{MixPolicy, Project, ProjectSettings};
pub use waveform::{SimpleWaveformFactory, WaveParams, Waveform, WaveformFactory, WaveformRegistry};
pub use waveforms::{register_standard_waveforms, standard_registry};
