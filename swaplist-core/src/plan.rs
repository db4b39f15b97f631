use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::playlist::PlaylistEntry;

/// ## Structure
/// A plan file describes one swap job.
///
/// ```text
/// SwapPlan
///   ├── meta: Option<Meta>
///   │   └── name: Option<String>
///   ├── output: OutputConfig
///   │   ├── path: Option<String>
///   │   └── directory: Option<String>
///   └── playlist: Vec<PlanItem>
///       ├── archive: String
///       ├── plate: Option<u32>
///       └── copies: u32 (default 1)
/// ```

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

fn default_copies() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlanItem {
    pub archive: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<u32>,
    #[serde(default = "default_copies")]
    pub copies: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SwapPlan {
    pub meta: Option<Meta>,
    pub output: OutputConfig,
    #[serde(default)]
    pub playlist: Vec<PlanItem>,
}

impl Default for SwapPlan {
    fn default() -> Self {
        Self {
            meta: Some(Meta {
                name: Some("Swap job".to_string()),
            }),
            output: OutputConfig {
                path: None,
                directory: Some("output".to_string()),
            },
            playlist: vec![PlanItem {
                archive: "project.3mf".to_string(),
                plate: None,
                copies: 1,
            }],
        }
    }
}

/// Where a plan's archive ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    Directory(PathBuf),
}

fn resolve(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn plan_dir(plan_file_path: &Path) -> Result<&Path> {
    plan_file_path
        .parent()
        .ok_or_else(|| anyhow!("Plan file has no parent directory"))
}

impl SwapPlan {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn name(&self) -> &str {
        self.meta
            .as_ref()
            .and_then(|meta| meta.name.as_deref())
            .unwrap_or("Unnamed swap job")
    }

    /// Playlist entries with archive paths resolved against the plan's directory.
    pub fn entries(&self, plan_file_path: &Path) -> Result<Vec<PlaylistEntry>> {
        let base = plan_dir(plan_file_path)?;
        self.playlist
            .iter()
            .map(|item| {
                PlaylistEntry::new(resolve(base, &item.archive), item.plate, item.copies)
                    .map_err(anyhow::Error::from)
            })
            .collect()
    }

    /// Archives referenced by the playlist, each listed once.
    pub fn archive_paths(&self, plan_file_path: &Path) -> Result<Vec<PathBuf>> {
        let base = plan_dir(plan_file_path)?;
        let mut paths: Vec<PathBuf> = Vec::new();
        for item in &self.playlist {
            let path = resolve(base, &item.archive);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// `output.path` wins over `output.directory`; a plan with neither is rejected.
    pub fn output_target(&self, plan_file_path: &Path) -> Result<OutputTarget> {
        let base = plan_dir(plan_file_path)?;
        match (&self.output.path, &self.output.directory) {
            (Some(path), _) => Ok(OutputTarget::File(resolve(base, path))),
            (None, Some(directory)) => Ok(OutputTarget::Directory(resolve(base, directory))),
            (None, None) => Err(anyhow!(
                "Plan output needs either 'path' or 'directory'"
            )),
        }
    }
}
