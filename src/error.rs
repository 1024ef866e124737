// src/error.rs
//
// Error types for the synthesis core and its collaborators.

use thiserror::Error;

use crate::point::PointId;

/// Structural problems in a point graph.
///
/// Cloneable so a project can cache the result of compiling its
/// template and hand the same error to every trigger attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("point graph contains a cycle through point {point}")]
    Cycle { point: PointId },

    #[error("point {0} does not exist in this graph")]
    UnknownPoint(PointId),

    #[error("input slot {slot} is out of range for point {target} (arity {arity})")]
    InvalidSlot {
        target: PointId,
        slot: usize,
        arity: usize,
    },

    #[error("point graph has no points")]
    Empty,
}

/// Failures reported by an output device collaborator.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device has not been configured")]
    NotConfigured,

    #[error("device is already running")]
    AlreadyRunning,

    #[error("device is not running")]
    NotRunning,

    #[error("unsupported output format: {sample_rate} Hz, {channels} channel(s)")]
    InvalidFormat { sample_rate: u32, channels: u16 },

    #[error("audio backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown waveform variant '{0}'")]
    UnknownVariant(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("invalid project settings: {0}")]
    InvalidSettings(String),

    #[error("command queue is full")]
    QueueFull,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid project file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid preferences: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("could not encode preferences: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("wav export failed: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
