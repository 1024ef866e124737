// src/waveforms/mod.rs
//
// Standard waveform variants.

mod noise;
mod oscillators;

pub use noise::*;
pub use oscillators::*;

use crate::waveform::WaveformRegistry;

// ═══════════════════════════════════════════════════════════════════
// Variant names
// ═══════════════════════════════════════════════════════════════════

pub mod names {
    pub const SINE: &str = "sine";
    pub const SQUARE: &str = "square";
    pub const SAW: &str = "saw";
    pub const TRIANGLE: &str = "triangle";
    pub const NOISE: &str = "noise";
}

// ═══════════════════════════════════════════════════════════════════
// Registry Population
// ═══════════════════════════════════════════════════════════════════

/// Populate the registry with all standard waveform variants.
pub fn register_standard_waveforms(registry: &mut WaveformRegistry) {
    registry.register_fn(names::SINE, || Box::new(Sine));
    registry.register_fn(names::SQUARE, || Box::new(Square));
    registry.register_fn(names::SAW, || Box::new(Saw));
    registry.register_fn(names::TRIANGLE, || Box::new(Triangle));
    registry.register_fn(names::NOISE, || Box::new(Noise::new()));
}

/// A registry holding the standard variants.
pub fn standard_registry() -> WaveformRegistry {
    let mut registry = WaveformRegistry::new();
    register_standard_waveforms(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_names() {
        let registry = standard_registry();
        assert_eq!(
            registry.list_names(),
            vec!["noise", "saw", "sine", "square", "triangle"]
        );
    }
}
