//! Linear recombination pipeline.
//!
//! One job moves through the stages below in order. A failing stage ends
//! the job, but the job is still closed: workspaces are removed and the
//! `cleaned_up` stage is logged on success and on failure alike.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::archive::ArchiveWorkspace;
use crate::assets::collect_assets;
use crate::config::EngineConfig;
use crate::errors::{SwapError, SwapResult};
use crate::gcode::{write_checksum, write_gcode, AssemblySummary};
use crate::metadata::{merge_slice_info, rewrite_project_descriptor, MODEL_SETTINGS_FILE, SLICE_INFO_FILE};
use crate::playlist::{expand_playlist, plate_gcode_name, PlaylistEntry, SourceArchives};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extracted,
    AssetsCopied,
    GcodeWritten,
    ChecksumWritten,
    DescriptorRewritten,
    StatsMerged,
    Repackaged,
    CleanedUp,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Extracted,
        Stage::AssetsCopied,
        Stage::GcodeWritten,
        Stage::ChecksumWritten,
        Stage::DescriptorRewritten,
        Stage::StatsMerged,
        Stage::Repackaged,
        Stage::CleanedUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extracted => "extracted",
            Stage::AssetsCopied => "assets_copied",
            Stage::GcodeWritten => "gcode_written",
            Stage::ChecksumWritten => "checksum_written",
            Stage::DescriptorRewritten => "descriptor_rewritten",
            Stage::StatsMerged => "stats_merged",
            Stage::Repackaged => "repackaged",
            Stage::CleanedUp => "cleaned_up",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a job holds on to between stages.
struct Job {
    staging: ArchiveWorkspace,
    sources: SourceArchives,
    completed: Vec<Stage>,
}

impl Job {
    fn reached(&mut self, stage: Stage) {
        info!(stage = %stage, "Pipeline stage complete");
        self.completed.push(stage);
    }

    fn close(self) {
        self.sources.close();
        self.staging.close();
        info!(stage = %Stage::CleanedUp, "Pipeline stage complete");
    }
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub output: PathBuf,
    pub plates: usize,
    pub copies: usize,
    pub checksum: String,
    pub stages: Vec<Stage>,
}

/// Recombines a playlist of project archives into one swap archive.
#[derive(Debug, Clone, Default)]
pub struct RecombinationPipeline {
    config: EngineConfig,
}

impl RecombinationPipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the job and returns the path of the written archive.
    pub fn run(&self, playlist: &[PlaylistEntry], output: &Path) -> SwapResult<PathBuf> {
        self.run_with_report(playlist, output).map(|report| report.output)
    }

    pub fn run_with_report(
        &self,
        playlist: &[PlaylistEntry],
        output: &Path,
    ) -> SwapResult<PipelineReport> {
        let first = playlist.first().ok_or(SwapError::EmptyPlaylist)?;
        info!(
            entries = playlist.len(),
            output = %output.display(),
            "Starting swap job"
        );

        let mut job = Job {
            staging: ArchiveWorkspace::extract(&first.source_path)?,
            sources: SourceArchives::new(),
            completed: Vec::new(),
        };

        let result = self.run_stages(&mut job, playlist, output);
        let mut stages = std::mem::take(&mut job.completed);
        job.close();
        stages.push(Stage::CleanedUp);

        match result {
            Ok((summary, checksum)) => Ok(PipelineReport {
                output: output.to_path_buf(),
                plates: summary.plates,
                copies: summary.copies,
                checksum,
                stages,
            }),
            Err(e) => {
                error!(
                    completed = stages.len() - 1,
                    code = e.error_code(),
                    "Swap job failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    fn run_stages(
        &self,
        job: &mut Job,
        playlist: &[PlaylistEntry],
        output: &Path,
    ) -> SwapResult<(AssemblySummary, String)> {
        let metadata_dir = self.prepare_staging(job.staging.root())?;
        let expanded = expand_playlist(playlist, &mut job.sources, &self.config)?;
        job.reached(Stage::Extracted);

        collect_assets(&expanded, &metadata_dir, &self.config)?;
        job.reached(Stage::AssetsCopied);

        let gcode_path = metadata_dir.join(plate_gcode_name(1));
        let summary = write_gcode(&expanded, &gcode_path)?;
        job.reached(Stage::GcodeWritten);

        let checksum = write_checksum(&gcode_path)?;
        job.reached(Stage::ChecksumWritten);

        rewrite_project_descriptor(
            &metadata_dir.join(MODEL_SETTINGS_FILE),
            &self.config.swap_plate_name,
        )?;
        job.reached(Stage::DescriptorRewritten);

        merge_slice_info(&expanded, &metadata_dir.join(SLICE_INFO_FILE))?;
        job.reached(Stage::StatsMerged);

        job.staging.repackage(output)?;
        job.reached(Stage::Repackaged);

        Ok((summary, checksum))
    }

    /// Empties the metadata directory of the staging copy of the first
    /// archive; everything else in it is kept for the output.
    fn prepare_staging(&self, root: &Path) -> SwapResult<PathBuf> {
        let metadata_dir = root.join(&self.config.metadata_dir);
        if metadata_dir.exists() {
            fs::remove_dir_all(&metadata_dir)?;
        }
        fs::create_dir_all(&metadata_dir)?;
        debug!(staging = %root.display(), "Prepared staging copy");
        Ok(metadata_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_playlist_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.3mf");
        let err = RecombinationPipeline::default()
            .run(&[], &output)
            .unwrap_err();
        assert!(matches!(err, SwapError::EmptyPlaylist));
        assert!(!output.exists());
    }

    #[test]
    fn unreadable_base_archive_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.3mf");
        fs::write(&bogus, "not a zip").unwrap();

        let entry = PlaylistEntry::new(&bogus, Some(1), 1).unwrap();
        let err = RecombinationPipeline::default()
            .run(&[entry], &dir.path().join("out.3mf"))
            .unwrap_err();
        assert!(matches!(err, SwapError::MalformedArchive { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn failed_stage_leaves_job_closable() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.3mf");
        fs::write(&bogus, "not a zip").unwrap();
        let output = dir.path().join("out.3mf");

        let mut job = Job {
            staging: ArchiveWorkspace::create().unwrap(),
            sources: SourceArchives::new(),
            completed: Vec::new(),
        };
        let staging_root = job.staging.root().to_path_buf();
        let entry = PlaylistEntry::new(&bogus, Some(1), 1).unwrap();

        let err = RecombinationPipeline::default()
            .run_stages(&mut job, &[entry], &output)
            .unwrap_err();
        assert!(matches!(err, SwapError::MalformedArchive { .. }));
        assert!(job.completed.is_empty());
        assert!(staging_root.exists());

        job.close();
        assert!(!staging_root.exists());
        assert!(!output.exists());
    }

    #[test]
    fn stages_display_in_snake_case() {
        let names: Vec<String> = Stage::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(names.first().map(String::as_str), Some("extracted"));
        assert_eq!(names.last().map(String::as_str), Some("cleaned_up"));
        assert_eq!(Stage::DescriptorRewritten.to_string(), "descriptor_rewritten");
    }
}
