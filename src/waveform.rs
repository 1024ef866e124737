// src/waveform.rs
//
// Waveform strategy trait and the registry of named variants.

use std::collections::BTreeMap;

use crate::error::{EngineError, Result};

/// Resolved waveform parameters for one point.
///
/// Built once when a graph is compiled; the variant only reads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveParams {
    pub amplitude: f64,
    pub frequency_ratio: f64,
    pub phase_offset: f64,
    pub mod_index: f64,
    /// Pulse width for variants that have one (0..1).
    pub duty: f64,
}

impl Default for WaveParams {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            frequency_ratio: 1.0,
            phase_offset: 0.0,
            mod_index: 1.0,
            duty: 0.5,
        }
    }
}

/// Core waveform trait.
///
/// Variants:
/// - do NOT advance phase (the note owns the phase accumulator)
/// - do NOT allocate
/// - ONLY map a phase position to a sample value
///
/// An instance belongs to exactly one note, so a variant may keep
/// private state (noise generators do) without affecting other notes.
pub trait Waveform: Send {
    /// Produce one sample.
    ///
    /// - `phase`: normalized position in the cycle, in `[0, 1)`
    /// - `time`: seconds since the note started rendering
    /// - `params`: resolved point parameters
    fn sample(&mut self, phase: f64, time: f64, params: &WaveParams) -> f64;

    /// Reset internal state (called when a note is built).
    fn reset(&mut self) {}
}

/// A factory capable of creating fresh waveform instances.
pub trait WaveformFactory: Send + Sync {
    fn create(&self) -> Box<dyn Waveform>;
}

/// Convenience factory for closures.
pub struct SimpleWaveformFactory<F>
where
    F: Fn() -> Box<dyn Waveform> + Send + Sync,
{
    create_fn: F,
}

impl<F> SimpleWaveformFactory<F>
where
    F: Fn() -> Box<dyn Waveform> + Send + Sync,
{
    pub fn new(create_fn: F) -> Self {
        Self { create_fn }
    }
}

impl<F> WaveformFactory for SimpleWaveformFactory<F>
where
    F: Fn() -> Box<dyn Waveform> + Send + Sync,
{
    fn create(&self) -> Box<dyn Waveform> {
        (self.create_fn)()
    }
}

/// Named waveform constructors.
///
/// Populated once at startup; notes ask it for fresh instances.
#[derive(Default)]
pub struct WaveformRegistry {
    factories: BTreeMap<String, Box<dyn WaveformFactory>>,
}

impl WaveformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variant. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, factory: impl WaveformFactory + 'static) {
        let name = name.into();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            log::warn!("waveform variant '{}' registered twice, keeping the latest", name);
        }
    }

    /// Register a variant from a plain constructor function.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, create_fn: F)
    where
        F: Fn() -> Box<dyn Waveform> + Send + Sync + 'static,
    {
        self.register(name, SimpleWaveformFactory::new(create_fn));
    }

    /// Create a fresh, independent instance of the named variant.
    pub fn create(&self, name: &str) -> Result<Box<dyn Waveform>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| EngineError::UnknownVariant(name.to_string()))?;
        let mut waveform = factory.create();
        waveform.reset();
        Ok(waveform)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn list_names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
