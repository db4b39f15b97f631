use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::errors::SwapResult;
use crate::metadata::{FILAMENT_SETTINGS_PREFIX, PROJECT_SETTINGS_FILE, SLICE_INFO_FILE};
use crate::playlist::ExpandedGcodeEntry;

/// Files copied per plate: anything named after the plate's G-code stem
/// plus the configured auxiliary prefixes. G-code and the statistics
/// document are regenerated, so they never qualify.
fn is_plate_asset(name: &str, stem: &str, config: &EngineConfig) -> bool {
    if name.ends_with(".gcode") || name == SLICE_INFO_FILE {
        return false;
    }
    name.starts_with(stem)
        || config
            .auxiliary_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
}

fn is_shared_setting(name: &str) -> bool {
    name == PROJECT_SETTINGS_FILE || name.starts_with(FILAMENT_SETTINGS_PREFIX)
}

fn file_names(dir: &Path) -> SwapResult<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

/// Copies the assets of every plate into `output_dir`.
///
/// Later entries overwrite files with the same name. Project and filament
/// settings come from the first entry's directory and never overwrite.
/// Returns the number of files copied.
pub fn collect_assets(
    entries: &[ExpandedGcodeEntry],
    output_dir: &Path,
    config: &EngineConfig,
) -> SwapResult<usize> {
    let mut copied = 0;

    for entry in entries {
        let Some(source_dir) = entry.gcode_path.parent() else {
            continue;
        };
        let Some(stem) = entry.gcode_path.file_stem().and_then(|s| s.to_str()) else {
            warn!(
                gcode = %entry.gcode_path.display(),
                "G-code file name is not valid UTF-8, skipping its assets"
            );
            continue;
        };
        if !source_dir.is_dir() {
            continue;
        }

        for name in file_names(source_dir)? {
            if !is_plate_asset(&name, stem, config) {
                continue;
            }
            fs::copy(source_dir.join(&name), output_dir.join(&name))?;
            debug!(file = %name, from = %source_dir.display(), "Copied asset");
            copied += 1;
        }
    }

    let first_dir = entries
        .first()
        .and_then(|entry| entry.gcode_path.parent())
        .filter(|dir| dir.is_dir());
    if let Some(first_dir) = first_dir {
        for name in file_names(first_dir)? {
            let target = output_dir.join(&name);
            if !is_shared_setting(&name) || target.exists() {
                continue;
            }
            fs::copy(first_dir.join(&name), &target)?;
            debug!(file = %name, "Copied shared settings");
            copied += 1;
        }
    }

    info!(files = copied, output = %output_dir.display(), "Assets copied");
    Ok(copied)
}
