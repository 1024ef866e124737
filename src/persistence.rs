// src/persistence.rs
//
// Project files (JSON) and sample export (WAV).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::graph::PointGraph;
use crate::project::{Project, ProjectSettings};

/// On-disk form of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,
    pub graph: PointGraph,
    #[serde(default)]
    pub settings: ProjectSettings,
}

impl From<&Project> for ProjectFile {
    fn from(project: &Project) -> Self {
        Self {
            name: project.name().to_string(),
            graph: project.graph().clone(),
            settings: project.settings().clone(),
        }
    }
}

impl TryFrom<ProjectFile> for Project {
    type Error = EngineError;

    fn try_from(file: ProjectFile) -> Result<Self> {
        Project::new(file.name, file.graph, file.settings)
    }
}

pub fn save_project(path: impl AsRef<Path>, project: &Project) -> Result<()> {
    let json = serde_json::to_string_pretty(&ProjectFile::from(project))?;
    std::fs::write(path.as_ref(), json)?;
    log::info!("saved project '{}' to {}", project.name(), path.as_ref().display());
    Ok(())
}

/// Load a project. Invalid settings are rejected; a cyclic template
/// still loads and fails when a note is triggered.
pub fn load_project(path: impl AsRef<Path>) -> Result<Project> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let file: ProjectFile = serde_json::from_str(&text)?;
    let project = Project::try_from(file)?;
    if let Err(e) = project.plan() {
        log::warn!("project '{}' loaded with an unusable graph: {}", project.name(), e);
    }
    Ok(project)
}

/// Write interleaved float samples as a 32-bit float WAV file.
pub fn write_wav(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    log::info!(
        "wrote {} frames to {}",
        samples.len() / channels.max(1) as usize,
        path.as_ref().display()
    );
    Ok(())
}
