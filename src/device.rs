// src/device.rs
//
// Output device collaborator.
//
// A device owns the RenderHandle while it runs and pulls blocks from it
// on its own schedule. The coordinator never depends on a live device.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::coordinator::RenderHandle;
use crate::error::DeviceError;

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;
pub const MAX_CHANNELS: u16 = 8;

/// Output device contract.
///
/// The device must never call `pull_block` re-entrantly; owning the
/// RenderHandle guarantees that.
pub trait OutputDevice {
    /// Choose the output format. Must be called before `start`.
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<(), DeviceError>;

    /// Take the render handle and begin pulling.
    fn start(&mut self, source: RenderHandle) -> Result<(), StartError>;

    /// Stop pulling and hand the render handle back.
    fn stop(&mut self) -> Result<RenderHandle, DeviceError>;

    fn is_running(&self) -> bool;
}

/// A failed `start`. The render handle comes back unless the backend
/// consumed it.
pub struct StartError {
    pub error: DeviceError,
    pub source: Option<RenderHandle>,
}

impl StartError {
    fn new(error: DeviceError, source: RenderHandle) -> Self {
        Self {
            error,
            source: Some(source),
        }
    }
}

impl std::fmt::Debug for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartError")
            .field("error", &self.error)
            .field("source_returned", &self.source.is_some())
            .finish()
    }
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

fn check_format(sample_rate: u32, channels: u16) -> Result<(), DeviceError> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) || channels == 0 || channels > MAX_CHANNELS {
        return Err(DeviceError::InvalidFormat {
            sample_rate,
            channels,
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════
// Offline device
// ═══════════════════════════════════════════════════════════════════

/// Renders on demand into memory. Used for export and tests.
pub struct OfflineDevice {
    format: Option<(u32, u16)>,
    source: Option<RenderHandle>,
    block_frames: usize,
}

impl OfflineDevice {
    pub fn new(block_frames: usize) -> Self {
        Self {
            format: None,
            source: None,
            block_frames: block_frames.max(1),
        }
    }

    /// Pull `frames` frames, in device-sized blocks, and return them
    /// interleaved.
    pub fn render(&mut self, frames: usize) -> Result<Vec<f32>, DeviceError> {
        let source = self.source.as_mut().ok_or(DeviceError::NotRunning)?;
        let mut out = Vec::with_capacity(frames * source.channels() as usize);

        let mut remaining = frames;
        while remaining > 0 {
            let chunk = remaining.min(self.block_frames);
            out.extend_from_slice(source.pull_block(chunk));
            remaining -= chunk;
        }
        Ok(out)
    }

    pub fn format(&self) -> Option<(u32, u16)> {
        self.format
    }
}

impl OutputDevice for OfflineDevice {
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<(), DeviceError> {
        check_format(sample_rate, channels)?;
        self.format = Some((sample_rate, channels));
        Ok(())
    }

    fn start(&mut self, source: RenderHandle) -> Result<(), StartError> {
        if self.format.is_none() {
            return Err(StartError::new(DeviceError::NotConfigured, source));
        }
        if self.source.is_some() {
            return Err(StartError::new(DeviceError::AlreadyRunning, source));
        }
        self.source = Some(source);
        Ok(())
    }

    fn stop(&mut self) -> Result<RenderHandle, DeviceError> {
        self.source.take().ok_or(DeviceError::NotRunning)
    }

    fn is_running(&self) -> bool {
        self.source.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Threaded device
// ═══════════════════════════════════════════════════════════════════

/// Receives each rendered block on the device thread.
pub type BlockSink = Box<dyn FnMut(&[f32]) + Send>;

/// Headless real-time device: a thread pulls one block per block period
/// and hands it to a sink.
pub struct ThreadedDevice {
    format: Option<(u32, u16)>,
    block_frames: usize,
    sink: Option<BlockSink>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<(RenderHandle, BlockSink)>>,
}

impl ThreadedDevice {
    pub fn new(block_frames: usize, sink: BlockSink) -> Self {
        Self {
            format: None,
            block_frames: block_frames.max(1),
            sink: Some(sink),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn block_period(&self, sample_rate: u32) -> Duration {
        Duration::from_secs_f64(self.block_frames as f64 / sample_rate as f64)
    }
}

impl OutputDevice for ThreadedDevice {
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<(), DeviceError> {
        check_format(sample_rate, channels)?;
        self.format = Some((sample_rate, channels));
        Ok(())
    }

    fn start(&mut self, mut source: RenderHandle) -> Result<(), StartError> {
        let Some((sample_rate, _)) = self.format else {
            return Err(StartError::new(DeviceError::NotConfigured, source));
        };
        if self.worker.is_some() {
            return Err(StartError::new(DeviceError::AlreadyRunning, source));
        }
        let Some(mut sink) = self.sink.take() else {
            return Err(StartError::new(
                DeviceError::Backend("block sink lost by an earlier run".into()),
                source,
            ));
        };

        let period = self.block_period(sample_rate);
        let block_frames = self.block_frames;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        let worker = std::thread::Builder::new()
            .name("soundmap-audio".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    sink(source.pull_block(block_frames));
                    std::thread::sleep(period);
                }
                (source, sink)
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                StartError {
                    error: DeviceError::Backend(e.to_string()),
                    source: None,
                }
            })?;

        self.worker = Some(worker);
        log::info!("threaded device started ({} frames @ {} Hz)", block_frames, sample_rate);
        Ok(())
    }

    fn stop(&mut self) -> Result<RenderHandle, DeviceError> {
        let worker = self.worker.take().ok_or(DeviceError::NotRunning)?;
        self.running.store(false, Ordering::Release);

        let (source, sink) = worker
            .join()
            .map_err(|_| DeviceError::Backend("audio thread panicked".into()))?;
        self.sink = Some(sink);
        log::info!("threaded device stopped");
        Ok(source)
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for ThreadedDevice {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::coordinator::{EngineConfig, create_coordinator};
    use crate::keymap::Key;
    use crate::project::Project;
    use crate::waveforms::standard_registry;

    fn handles() -> (crate::coordinator::ControlHandle, RenderHandle) {
        create_coordinator(
            Project::new_default("sine"),
            Arc::new(standard_registry()),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_invalid_format() {
        let mut device = OfflineDevice::new(64);
        assert!(matches!(
            device.configure(1_000, 2),
            Err(DeviceError::InvalidFormat { .. })
        ));
        assert!(matches!(
            device.configure(44_100, 0),
            Err(DeviceError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_offline_requires_configure() {
        let (_control, render) = handles();
        let mut device = OfflineDevice::new(64);
        let err = device.start(render).unwrap_err();
        assert!(matches!(err.error, DeviceError::NotConfigured));
        assert!(err.source.is_some());
        assert!(matches!(device.render(10), Err(DeviceError::NotRunning)));
    }

    #[test]
    fn test_offline_render_and_stop() {
        let (mut control, render) = handles();
        let mut device = OfflineDevice::new(100);
        device.configure(44_100, 2).unwrap();
        device.start(render).unwrap();
        assert!(device.is_running());

        control.trigger_note(Key::from('B'), 0).unwrap();
        let samples = device.render(250).unwrap();
        assert_eq!(samples.len(), 500);
        assert!(samples.iter().any(|&s| s != 0.0));

        let render = device.stop().unwrap();
        assert_eq!(render.active_notes(), 1);
        assert!(!device.is_running());
    }

    #[test]
    fn test_threaded_device_pulls_and_returns_handle() {
        let (_control, render) = handles();
        let pulled = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&pulled);

        let mut device = ThreadedDevice::new(
            64,
            Box::new(move |block| {
                *counter.lock().unwrap() += block.len();
            }),
        );
        device.configure(44_100, 2).unwrap();
        device.start(render).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let render = device.stop().unwrap();

        assert!(*pulled.lock().unwrap() >= 128);
        assert_eq!(render.active_notes(), 0);

        // The sink survives a stop/start cycle
        device.start(render).unwrap();
        device.stop().unwrap();
    }
}
