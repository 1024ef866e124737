// tests/engine.rs
//
// End-to-end behaviour of the coordinator, through the public API only.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use proptest::prelude::*;

use soundmap::{
    ControlHandle, EngineConfig, Key, KeyMap, MixPolicy, PointGraph, PointKind, Project, ProjectSettings,
    RenderHandle, WaveParams, Waveform, WaveformRegistry, create_coordinator, point::params, resolve_frequency,
    standard_registry,
};

fn settings(channels: u16, release_seconds: f64) -> ProjectSettings {
    ProjectSettings {
        sample_rate: 44_100,
        channels,
        reference_pitch: 440.0,
        release_seconds,
        mix_policy: MixPolicy::Unclipped,
        ..ProjectSettings::default()
    }
}

fn sine_pair(channels: u16, release_seconds: f64) -> (ControlHandle, RenderHandle) {
    create_coordinator(
        Project::new("sine", PointGraph::single("sine"), settings(channels, release_seconds)).unwrap(),
        Arc::new(standard_registry()),
        EngineConfig::default(),
    )
}

#[test]
fn test_sine_note_end_to_end() {
    let (mut control, mut render) = sine_pair(1, 0.05);
    control.trigger_note(Key::from('B'), 0).unwrap();

    // First frame is phase zero
    let first = render.pull_block(1);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0], 0.0);

    let block = render.pull_block(100).to_vec();
    for (i, &s) in block.iter().enumerate() {
        let n = (i + 1) as f64;
        let expected = (TAU * 440.0 * n / 44_100.0).sin() as f32;
        assert!((s - expected).abs() < 1e-5, "frame {}: {} vs {}", n, s, expected);
    }
}

#[test]
fn test_stereo_channels_carry_the_same_mix() {
    let (mut control, mut render) = sine_pair(2, 0.05);
    control.trigger_note(Key::from('B'), 0).unwrap();
    let block = render.pull_block(64);
    assert_eq!(block.len(), 128);
    for frame in block.chunks_exact(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn test_notes_sum_linearly() {
    let render_keys = |keys: &[(char, i32)]| {
        let (mut control, mut render) = sine_pair(1, 0.05);
        for &(c, offset) in keys {
            control.trigger_note(Key::from(c), offset).unwrap();
        }
        render.pull_block(512).to_vec()
    };

    let b = render_keys(&[('B', 0)]);
    let n = render_keys(&[('N', 2)]);
    let both = render_keys(&[('B', 0), ('N', 2)]);

    for i in 0..512 {
        assert!((both[i] - (b[i] + n[i])).abs() < 1e-6);
    }
}

#[test]
fn test_duplicate_trigger_is_ignored() {
    let (mut single, mut single_render) = sine_pair(1, 0.05);
    single.trigger_note(Key::from('B'), 0).unwrap();
    let expected = single_render.pull_block(256).to_vec();

    let (mut control, mut render) = sine_pair(1, 0.05);
    control.trigger_note(Key::from('B'), 0).unwrap();
    control.trigger_note(Key::from('B'), 0).unwrap();
    let block = render.pull_block(256).to_vec();

    assert_eq!(block, expected);
    assert_eq!(render.active_notes(), 1);
}

#[test]
fn test_panic_silences_everything() {
    let (mut control, mut render) = sine_pair(1, 0.05);
    control.trigger_note(Key::from('B'), 0).unwrap();
    control.trigger_note(Key::from('N'), 2).unwrap();
    assert!(render.pull_block(64).iter().any(|&s| s != 0.0));

    // Still queued when the panic lands
    control.trigger_note(Key::from('M'), 3).unwrap();
    control.panic();
    assert!(render.pull_block(64).iter().all(|&s| s == 0.0));
    assert_eq!(render.active_notes(), 0);
}

#[test]
fn test_release_is_idempotent() {
    let (mut control, mut render) = sine_pair(1, 0.01);
    control.trigger_note(Key::from('B'), 0).unwrap();
    render.pull_block(64);

    control.release_note(Key::from('B')).unwrap();
    control.release_note(Key::from('B')).unwrap();
    control.release_note(Key::from('M')).unwrap();

    // 0.01 s tail is 441 frames; everything after is silence
    render.pull_block(460);
    assert!(render.pull_block(256).iter().all(|&s| s == 0.0));
    assert_eq!(render.active_notes(), 0);
}

#[test]
fn test_zero_frame_pull() {
    let (mut control, mut render) = sine_pair(2, 0.05);
    control.trigger_note(Key::from('B'), 0).unwrap();
    assert!(render.pull_block(0).is_empty());
}

#[test]
fn test_key_map_dispatch() {
    let (mut control, mut render) = sine_pair(1, 0.0);
    let keymap = KeyMap::standard();

    control.key_down(Key::from('b'), &keymap).unwrap();
    control.key_down(Key::from('n'), &keymap).unwrap();
    control.key_down(Key::from('q'), &keymap).unwrap();
    render.pull_block(32);
    assert_eq!(render.active_notes(), 2);

    control.key_up(Key::from('n'), &keymap).unwrap();
    render.pull_block(32);
    assert_eq!(render.active_notes(), 1);

    control.key_down(Key::ESCAPE, &keymap).unwrap();
    assert!(render.pull_block(32).iter().all(|&s| s == 0.0));
    assert_eq!(render.active_notes(), 0);
}

// ═══════════════════════════════════════════════════════════════════
// Concurrency
// ═══════════════════════════════════════════════════════════════════

/// Constant 1.0; the project's amplitude decides the sign.
struct Dc;

impl Waveform for Dc {
    fn sample(&mut self, _phase: f64, _time: f64, _params: &WaveParams) -> f64 {
        1.0
    }
}

fn dc_project(name: &str, amplitude: f64) -> Project {
    let mut graph = PointGraph::new();
    let id = graph.add_point(PointKind::waveform("dc"));
    graph.set_param(id, params::AMPLITUDE, amplitude).unwrap();
    graph.set_output(id).unwrap();
    Project::new(name, graph, settings(1, 0.0)).unwrap()
}

#[test]
fn test_swap_never_mixes_projects_in_one_block() {
    let mut registry = WaveformRegistry::new();
    registry.register_fn("dc", || Box::new(Dc));

    let (mut control, mut render) = create_coordinator(
        dc_project("positive", 0.25),
        Arc::new(registry),
        EngineConfig {
            max_block: 64,
            max_notes: 8,
            command_capacity: 64,
        },
    );

    let done = Arc::new(AtomicBool::new(false));
    let stop = Arc::clone(&done);

    let audio = std::thread::spawn(move || {
        let mut audible = 0usize;
        let mut mixed = 0usize;
        while !stop.load(Ordering::Acquire) {
            let block = render.pull_block(64);
            let positive = block.iter().any(|&s| s > 0.0);
            let negative = block.iter().any(|&s| s < 0.0);
            if positive || negative {
                audible += 1;
            }
            if positive && negative {
                mixed += 1;
            }
        }
        (audible, mixed)
    });

    let keys = ['Z', 'X', 'C', 'V'];
    for round in 0..500 {
        let project = if round % 2 == 0 {
            dc_project("negative", -0.5)
        } else {
            dc_project("positive", 0.25)
        };
        control.swap_project(project);
        for (i, &c) in keys.iter().enumerate() {
            // Queue may be momentarily full; that is fine here
            let _ = control.trigger_note(Key::from(c), i as i32);
        }
        if round % 3 == 0 {
            let _ = control.release_note(Key::from(keys[round % keys.len()]));
        }
        // Let the audio thread render a few blocks of this project
        std::thread::sleep(Duration::from_micros(200));
    }

    done.store(true, Ordering::Release);
    let (audible, mixed) = audio.join().unwrap();
    assert!(audible > 0, "no block carried sound");
    assert_eq!(mixed, 0);
}

/// Semitone ratios within one octave, each the previous times 2^(1/12).
fn semitone_table() -> [f64; 12] {
    let step = 2f64.powf(1.0 / 12.0);
    let mut table = [1.0; 12];
    for i in 1..12 {
        table[i] = table[i - 1] * step;
    }
    table
}

/// Reference frequency built from whole octaves (exact doublings) plus
/// a semitone remainder looked up in the table.
fn equal_temperament(reference: f64, offset: i32) -> f64 {
    let octaves = offset.div_euclid(12);
    let semitones = offset.rem_euclid(12) as usize;
    let mut f = reference * semitone_table()[semitones];
    for _ in 0..octaves.abs() {
        if octaves > 0 {
            f *= 2.0;
        } else {
            f /= 2.0;
        }
    }
    f
}

#[test]
fn test_known_pitches() {
    assert_eq!(resolve_frequency(440.0, 0), 440.0);
    assert!((resolve_frequency(440.0, 12) - 880.0).abs() < 1e-9);
    assert!((resolve_frequency(440.0, -24) - 110.0).abs() < 1e-9);
    // A4 to C5
    assert!((resolve_frequency(440.0, 3) - 523.251_130_601_197_3).abs() < 1e-9);
    // A4 to E4
    assert!((resolve_frequency(440.0, -5) - 329.627_556_912_869_9).abs() < 1e-9);
}

proptest! {
    #[test]
    fn test_frequency_matches_equal_temperament(
        reference in 20.0f64..2_000.0,
        offset in -48i32..=48,
    ) {
        let f = resolve_frequency(reference, offset);
        let expected = equal_temperament(reference, offset);
        prop_assert!((f - expected).abs() <= 1e-9 * expected);
    }

    #[test]
    fn test_octaves_double_exactly(
        reference in 20.0f64..2_000.0,
        offset in -36i32..=36,
    ) {
        let f = resolve_frequency(reference, offset);
        let up = resolve_frequency(reference, offset + 12);
        prop_assert!((up - 2.0 * f).abs() <= 1e-9 * up);
    }
}
