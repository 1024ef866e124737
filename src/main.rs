// src/main.rs
//
// Headless front end: list waveforms, render a key performance to WAV,
// or play through a threaded device and print status.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use soundmap::{
    EngineConfig, Key, KeyMap, OfflineDevice, OutputDevice, Player, Preferences, Project, ThreadedDevice,
    create_coordinator, load_project, standard_registry, write_wav,
};

#[derive(Parser)]
#[command(name = "soundmap-engine", about = "Keyboard-driven synthesis engine")]
struct Cli {
    /// Preferences file (TOML). Defaults are used if it does not exist.
    #[arg(long, global = true)]
    prefs: Option<PathBuf>,

    /// Project file (JSON). Defaults to a single-waveform project.
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List the registered waveform variants.
    List,

    /// Render a held chord to a WAV file.
    Render {
        /// Keys to press, separated by spaces (e.g. "B N M").
        #[arg(long, default_value = "B")]
        keys: String,
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,
        /// Overrides the preferred waveform for the default project.
        #[arg(long)]
        waveform: Option<String>,
        #[arg(long, default_value = "out.wav")]
        out: PathBuf,
    },

    /// Play through a headless real-time device, printing status.
    Play {
        #[arg(long, default_value = "B")]
        keys: String,
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,
    },
}

fn parse_keys(keys: &str) -> anyhow::Result<Vec<Key>> {
    keys.split_whitespace()
        .map(|k| {
            let mut chars = k.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Key::from(c)),
                _ => bail!("expected single-character keys, got '{}'", k),
            }
        })
        .collect()
}

fn open_project(cli: &Cli, prefs: &Preferences, waveform: Option<&str>) -> anyhow::Result<Project> {
    match &cli.project {
        Some(path) => load_project(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(Project::new_default(waveform.unwrap_or(&prefs.waveform))),
    }
}

fn render(
    cli: &Cli,
    prefs: &Preferences,
    keys: &str,
    seconds: f64,
    waveform: Option<&str>,
    out: &Path,
) -> anyhow::Result<()> {
    let keys = parse_keys(keys)?;
    let mut project = open_project(cli, prefs, waveform)?;
    let mut settings = project.settings().clone();
    prefs.apply_to(&mut settings);
    project = project.with_settings(settings)?;
    let (sample_rate, channels) = (project.settings().sample_rate, project.settings().channels);

    let registry = Arc::new(standard_registry());
    let (mut control, render) = create_coordinator(project, registry, EngineConfig::default());
    let keymap = KeyMap::standard();

    let mut device = OfflineDevice::new(prefs.block_frames());
    device.configure(sample_rate, channels)?;
    device.start(render).map_err(|e| e.error)?;

    // Hold for three quarters of the duration, release for the rest
    let total = (seconds.max(0.0) * sample_rate as f64) as usize;
    let held = total * 3 / 4;

    for &key in &keys {
        control.key_down(key, &keymap)?;
    }
    let mut samples = device.render(held)?;
    for &key in &keys {
        control.key_up(key, &keymap)?;
    }
    samples.extend(device.render(total - held)?);
    device.stop()?;

    write_wav(out, &samples, sample_rate, channels)?;
    println!("{}", control.status());
    println!("wrote {} ({:.2} s)", out.display(), seconds);
    Ok(())
}

fn play(cli: &Cli, prefs: &Preferences, keys: &str, seconds: f64) -> anyhow::Result<()> {
    let keys = parse_keys(keys)?;
    let project = open_project(cli, prefs, None)?;
    let (control, render) = create_coordinator(project, Arc::new(standard_registry()), EngineConfig::default());

    let peak = Arc::new(AtomicU32::new(0));
    let meter = Arc::clone(&peak);
    let device = ThreadedDevice::new(
        prefs.block_frames(),
        Box::new(move |block| {
            let p = block.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            meter.fetch_max(p.to_bits(), Ordering::Relaxed);
        }),
    );

    let mut player = Player::new(control, render, Box::new(device), prefs.clone());
    player.set_paused(false)?;
    for &key in &keys {
        player.key_down(key)?;
    }

    let ticks = (seconds.max(0.0) * 4.0).ceil() as usize;
    for _ in 0..ticks {
        std::thread::sleep(Duration::from_millis(250));
        println!(
            "{} (peak {:.3})",
            player.status(),
            f32::from_bits(peak.swap(0, Ordering::Relaxed))
        );
    }

    for &key in &keys {
        player.key_up(key)?;
    }
    player.set_paused(true)?;
    println!("{}", player.status());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let prefs = match &cli.prefs {
        Some(path) => Preferences::load_or_default(path).with_context(|| format!("loading {}", path.display()))?,
        None => Preferences::default(),
    };

    match &cli.command {
        Cmd::List => {
            for name in standard_registry().list_names() {
                println!("{}", name);
            }
            Ok(())
        }
        Cmd::Render {
            keys,
            seconds,
            waveform,
            out,
        } => render(&cli, &prefs, keys, *seconds, waveform.as_deref(), out),
        Cmd::Play { keys, seconds } => play(&cli, &prefs, keys, *seconds),
    }
}
