use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::archive::ArchiveWorkspace;
use crate::config::EngineConfig;
use crate::errors::SwapResult;
use crate::metadata::{ConfigDocument, PlateStats, SLICE_INFO_FILE};
use crate::publish::Publisher;

static PLATE_THUMBNAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^plate_(\d+)\.png$").expect("thumbnail pattern is valid"));

/// One plate found in a project archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateSummary {
    pub id: Uuid,
    pub filename: String,
    pub source_path: PathBuf,
    pub plate_index: u32,
    pub thumbnail: Option<PathBuf>,
    pub weight_grams: f64,
    pub prediction_seconds: u64,
}

/// Plate index of a thumbnail name, matched strictly: `plate_1_small.png`
/// and `plate_no_light_1.png` are not plate thumbnails.
pub fn thumbnail_plate_index(name: &str) -> Option<u32> {
    PLATE_THUMBNAIL
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Header statistics per plate index. Sections without an index count as
/// plate 1. An unreadable document yields an empty map.
pub fn plate_statistics(path: &Path) -> HashMap<u32, PlateStats> {
    let mut stats = HashMap::new();
    let document = match ConfigDocument::load(path) {
        Ok(document) => document,
        Err(e) => {
            warn!(path = %path.display(), code = e.error_code(), "{}", e);
            return stats;
        }
    };

    for plate in document.plates() {
        let index = match plate.index().unwrap_or("1").trim().parse::<u32>() {
            Ok(index) => index,
            Err(_) => {
                warn!(path = %path.display(), index = ?plate.index(), "Ignoring plate with invalid index");
                continue;
            }
        };
        let plate_stats = plate.stats().unwrap_or_else(|e| {
            warn!(path = %path.display(), index, error = %e, "Unreadable plate statistics");
            PlateStats::default()
        });
        stats.insert(index, plate_stats);
    }
    stats
}

/// Lists the plates of a project archive, optionally publishing their
/// thumbnails, in ascending plate order.
pub fn inspect_archive(path: &Path, publish: Option<&Publisher>) -> SwapResult<Vec<PlateSummary>> {
    inspect_archive_with(path, publish, &EngineConfig::default())
}

pub fn inspect_archive_with(
    path: &Path,
    publish: Option<&Publisher>,
    config: &EngineConfig,
) -> SwapResult<Vec<PlateSummary>> {
    let workspace = ArchiveWorkspace::extract(path)?;
    let metadata_dir = workspace.root().join(&config.metadata_dir);
    if !metadata_dir.is_dir() {
        warn!(archive = %path.display(), "No {} folder in archive", config.metadata_dir);
        workspace.close();
        return Ok(Vec::new());
    }

    let stats = plate_statistics(&metadata_dir.join(SLICE_INFO_FILE));
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut thumbnails: Vec<(u32, PathBuf)> = fs::read_dir(&metadata_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            thumbnail_plate_index(name.to_str()?).map(|index| (index, entry.path()))
        })
        .collect();
    thumbnails.sort();

    let mut plates = Vec::with_capacity(thumbnails.len());
    for (plate_index, thumbnail_path) in thumbnails {
        let thumbnail = match publish {
            Some(publisher) => Some(publisher.publish_thumbnail(&thumbnail_path)?),
            None => None,
        };
        let plate_stats = stats.get(&plate_index).copied().unwrap_or_default();
        plates.push(PlateSummary {
            id: Uuid::new_v4(),
            filename: filename.clone(),
            source_path: path.to_path_buf(),
            plate_index,
            thumbnail,
            weight_grams: plate_stats.weight_grams,
            prediction_seconds: plate_stats.prediction_seconds,
        });
    }

    debug!(archive = %path.display(), plates = plates.len(), "Inspected archive");
    workspace.close();
    Ok(plates)
}
