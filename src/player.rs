// src/player.rs
//
// Playback controller: ties the coordinator, an output device and the
// user's preferences together.
//
// Start and stop both panic first, so a device never resumes with notes
// left over from before.

use crate::coordinator::{ControlHandle, EngineStatus, RenderHandle};
use crate::device::OutputDevice;
use crate::error::{DeviceError, EngineError, Result};
use crate::keymap::{Key, KeyMap};
use crate::preferences::Preferences;
use crate::project::Project;

pub struct Player {
    control: ControlHandle,
    device: Box<dyn OutputDevice + Send>,
    /// The render handle while no device owns it.
    idle: Option<RenderHandle>,
    keymap: KeyMap,
    preferences: Preferences,
    paused: bool,
}

impl Player {
    /// Create a paused player. Call `set_paused(false)` to start output.
    pub fn new(
        control: ControlHandle,
        render: RenderHandle,
        device: Box<dyn OutputDevice + Send>,
        preferences: Preferences,
    ) -> Self {
        Self {
            control,
            device,
            idle: Some(render),
            keymap: KeyMap::standard(),
            preferences,
            paused: true,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_playing(&self) -> bool {
        self.device.is_running()
    }

    /// Pausing stops the device; resuming starts it again.
    ///
    /// The player only counts as unpaused once the device is running, so
    /// a failed resume can be retried.
    pub fn set_paused(&mut self, paused: bool) -> Result<()> {
        if paused {
            self.paused = true;
            return self.stop_play();
        }
        self.start_play()?;
        self.paused = false;
        Ok(())
    }

    /// Configure the project and the device from preferences, then start
    /// pulling. On failure the player stays stopped.
    pub fn start_play(&mut self) -> Result<()> {
        if self.device.is_running() {
            return Ok(());
        }
        self.control.panic();
        if let Err(e) = self.configure_project() {
            log::error!("could not configure project: {}", e);
            return Err(e);
        }

        let (sample_rate, channels) = (self.preferences.sample_rate, self.preferences.channels);
        if let Err(e) = self.device.configure(sample_rate, channels) {
            log::error!("could not configure output device: {}", e);
            return Err(e.into());
        }

        let render = self
            .idle
            .take()
            .ok_or_else(|| DeviceError::Backend("render handle is not available".into()))?;
        if let Err(e) = self.device.start(render) {
            log::error!("could not start output device: {}", e);
            self.idle = e.source;
            return Err(EngineError::Device(e.error));
        }

        self.control.set_running(true);
        log::info!("playback started ({} Hz, {} ch)", sample_rate, channels);
        Ok(())
    }

    pub fn stop_play(&mut self) -> Result<()> {
        self.control.panic();
        if !self.device.is_running() {
            return Ok(());
        }
        self.control.set_running(false);
        match self.device.stop() {
            Ok(render) => {
                self.idle = Some(render);
                log::info!("playback stopped");
                Ok(())
            }
            Err(e) => {
                log::error!("could not stop output device: {}", e);
                Err(e.into())
            }
        }
    }

    /// Replace the project, restarting output around the swap if playing.
    pub fn set_project(&mut self, project: Project) -> Result<()> {
        self.restart_around(|player| player.control.swap_project(project))
    }

    pub fn project(&self) -> std::sync::Arc<Project> {
        self.control.project()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Commit edited preferences. While playing, output restarts so the
    /// new format and tuning apply right away.
    pub fn set_preferences(&mut self, preferences: &Preferences) -> Result<()> {
        self.restart_around(|player| player.preferences.copy_from(preferences))
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn keymap_mut(&mut self) -> &mut KeyMap {
        &mut self.keymap
    }

    pub fn key_down(&mut self, key: Key) -> Result<()> {
        self.control.key_down(key, &self.keymap)
    }

    pub fn key_up(&mut self, key: Key) -> Result<()> {
        self.control.key_up(key, &self.keymap)
    }

    pub fn panic(&mut self) {
        self.control.panic();
    }

    pub fn status(&self) -> EngineStatus {
        self.control.status()
    }

    /// Stop, apply `change`, and start again unless paused. A failed
    /// restart leaves the player paused.
    fn restart_around<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Self),
    {
        let restart = !self.paused;
        if restart {
            self.stop_play()?;
        }
        change(self);
        if restart {
            if let Err(e) = self.start_play() {
                self.paused = true;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Apply the output format and tuning from preferences to the current
    /// project, swapping only if something changed.
    fn configure_project(&mut self) -> Result<()> {
        let current = self.control.project();
        let mut settings = current.settings().clone();
        self.preferences.apply_to(&mut settings);
        if settings != *current.settings() {
            self.control.swap_project(current.with_settings(settings)?);
        }
        Ok(())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.device.is_running() {
            let _ = self.stop_play();
        }
    }
}
