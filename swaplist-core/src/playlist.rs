use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive::ArchiveWorkspace;
use crate::config::EngineConfig;
use crate::errors::{SwapError, SwapResult};

static PLATE_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"plate_(\d+)").expect("plate index pattern is valid"));

/// One line of a swap playlist: which archive, which plate (all when
/// `None`) and how many copies of each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub source_path: PathBuf,
    pub plate_index: Option<u32>,
    pub copy_count: u32,
}

impl PlaylistEntry {
    pub fn new(
        source_path: impl Into<PathBuf>,
        plate_index: Option<u32>,
        copy_count: u32,
    ) -> SwapResult<Self> {
        let source_path = source_path.into();
        if copy_count == 0 {
            return Err(SwapError::invalid_entry(
                source_path.display().to_string(),
                "copy count must be at least 1",
            ));
        }
        if plate_index == Some(0) {
            return Err(SwapError::invalid_entry(
                source_path.display().to_string(),
                "plate index must be a positive integer",
            ));
        }
        Ok(Self {
            source_path,
            plate_index,
            copy_count,
        })
    }
}

/// Parses `ARCHIVE[:PLATE[:COPIES]]`. `PLATE` may be empty or `*` for every plate.
impl FromStr for PlaylistEntry {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_positive = |value: &str, what: &str| -> SwapResult<u32> {
            value
                .parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| SwapError::invalid_entry(s, format!("{} must be a positive integer", what)))
        };

        let is_number = |value: &str| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit());
        let is_plate_field = |value: &str| value.is_empty() || value == "*" || is_number(value);

        // Fields are taken from the right so colons inside the path survive.
        let (path, plate, copies) = match s.rsplit_once(':') {
            Some((head, last)) if is_plate_field(last) => match head.rsplit_once(':') {
                // A plate field before the last one makes it COPIES, even when empty.
                Some((path, plate)) if is_plate_field(plate) => (path, Some(plate), Some(last)),
                _ => (head, Some(last), None),
            },
            _ => (s, None, None),
        };

        if path.is_empty() {
            return Err(SwapError::invalid_entry(s, "archive path is empty"));
        }

        let plate_index = match plate {
            None | Some("") | Some("*") => None,
            Some(value) => Some(parse_positive(value, "plate index")?),
        };
        let copy_count = match copies {
            None => 1,
            Some(value) => parse_positive(value, "copy count")?,
        };

        PlaylistEntry::new(path, plate_index, copy_count)
    }
}

/// A resolved plate G-code file and how many times to print it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedGcodeEntry {
    pub gcode_path: PathBuf,
    pub copy_count: u32,
}

/// Numeric plate index from names such as `plate_12.gcode`.
pub fn plate_index_from_name(name: &str) -> Option<u32> {
    PLATE_INDEX
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn plate_index_from_path(path: &Path) -> Option<u32> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(plate_index_from_name)
}

pub fn plate_gcode_name(index: u32) -> String {
    format!("plate_{}.gcode", index)
}

/// Every `plate_*.gcode` in `metadata_dir`, by ascending plate index.
/// Names without a parsable index sort last in name order.
pub fn discover_plate_gcode(metadata_dir: &Path) -> SwapResult<Vec<PathBuf>> {
    let mut names: Vec<String> = fs::read_dir(metadata_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with("plate_") && name.ends_with(".gcode"))
        .collect();
    names.sort();
    names.sort_by_key(|name| plate_index_from_name(name).map_or((1, 0), |idx| (0, idx)));
    Ok(names.into_iter().map(|name| metadata_dir.join(name)).collect())
}

/// Source archives extracted for one job, each extracted at most once.
#[derive(Debug, Default)]
pub struct SourceArchives {
    workspaces: IndexMap<PathBuf, ArchiveWorkspace>,
}

impl SourceArchives {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata directory of `archive`, extracting it on first use.
    pub fn metadata_dir(&mut self, archive: &Path, config: &EngineConfig) -> SwapResult<PathBuf> {
        if !self.workspaces.contains_key(archive) {
            let workspace = ArchiveWorkspace::extract(archive)?;
            self.workspaces.insert(archive.to_path_buf(), workspace);
        }
        let root = self.workspaces[archive].root();
        Ok(root.join(&config.metadata_dir))
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// Removes every extraction directory.
    pub fn close(self) {
        for (_, workspace) in self.workspaces {
            workspace.close();
        }
    }
}

/// Resolves playlist entries into plate G-code files, keeping playlist order.
///
/// A requested plate missing from its archive, or an archive without a
/// metadata directory, is logged and contributes nothing.
pub fn expand_playlist(
    entries: &[PlaylistEntry],
    sources: &mut SourceArchives,
    config: &EngineConfig,
) -> SwapResult<Vec<ExpandedGcodeEntry>> {
    let mut expanded = Vec::new();

    for entry in entries {
        if entry.copy_count == 0 {
            warn!(archive = %entry.source_path.display(), "Skipping entry with zero copies");
            continue;
        }

        let metadata_dir = sources.metadata_dir(&entry.source_path, config)?;
        if !metadata_dir.is_dir() {
            warn!(
                archive = %entry.source_path.display(),
                "No {} folder in archive, skipping entry",
                config.metadata_dir
            );
            continue;
        }

        let found = match entry.plate_index {
            Some(index) => {
                let path = metadata_dir.join(plate_gcode_name(index));
                if path.is_file() {
                    vec![path]
                } else {
                    warn!(
                        archive = %entry.source_path.display(),
                        plate = index,
                        "Plate not found in archive, skipping entry"
                    );
                    Vec::new()
                }
            }
            None => discover_plate_gcode(&metadata_dir)?,
        };

        debug!(
            archive = %entry.source_path.display(),
            plates = found.len(),
            copies = entry.copy_count,
            "Resolved playlist entry"
        );
        expanded.extend(found.into_iter().map(|gcode_path| ExpandedGcodeEntry {
            gcode_path,
            copy_count: entry.copy_count,
        }));
    }

    info!(
        entries = entries.len(),
        plates = expanded.len(),
        archives = sources.len(),
        "Expanded playlist"
    );
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plate_index_from_names() {
        assert_eq!(plate_index_from_name("plate_1.gcode"), Some(1));
        assert_eq!(plate_index_from_name("plate_12.gcode"), Some(12));
        assert_eq!(plate_index_from_name("plate_x.gcode"), None);
        assert_eq!(plate_index_from_path(Path::new("/tmp/Metadata/plate_3.gcode")), Some(3));
    }

    #[test]
    fn discovers_plates_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "plate_10.gcode",
            "plate_2.gcode",
            "plate_extra.gcode",
            "plate_1.gcode",
            "plate_1.gcode.md5",
            "plate_1.png",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let found: Vec<String> = discover_plate_gcode(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            found,
            vec![
                "plate_1.gcode",
                "plate_2.gcode",
                "plate_10.gcode",
                "plate_extra.gcode"
            ]
        );
    }

    #[test]
    fn parses_entry_syntax() {
        let entry: PlaylistEntry = "parts.3mf".parse().unwrap();
        assert_eq!(entry, PlaylistEntry::new("parts.3mf", None, 1).unwrap());

        let entry: PlaylistEntry = "parts.3mf:2".parse().unwrap();
        assert_eq!(entry.plate_index, Some(2));
        assert_eq!(entry.copy_count, 1);

        let entry: PlaylistEntry = "parts.3mf:2:3".parse().unwrap();
        assert_eq!(entry.plate_index, Some(2));
        assert_eq!(entry.copy_count, 3);

        let entry: PlaylistEntry = "parts.3mf:*:4".parse().unwrap();
        assert_eq!(entry.plate_index, None);
        assert_eq!(entry.copy_count, 4);

        let entry: PlaylistEntry = "parts.3mf::2".parse().unwrap();
        assert_eq!(entry.plate_index, None);
        assert_eq!(entry.copy_count, 2);
    }

    #[test]
    fn keeps_colons_that_belong_to_the_path() {
        let entry: PlaylistEntry = r"C:\prints\parts.3mf:1:2".parse().unwrap();
        assert_eq!(entry.source_path, PathBuf::from(r"C:\prints\parts.3mf"));
        assert_eq!(entry.plate_index, Some(1));
        assert_eq!(entry.copy_count, 2);
    }

    #[test]
    fn rejects_zero_copies_and_plates() {
        assert!("parts.3mf:1:0".parse::<PlaylistEntry>().is_err());
        assert!("parts.3mf:0".parse::<PlaylistEntry>().is_err());
        assert!(PlaylistEntry::new("parts.3mf", None, 0).is_err());
        assert!(":1".parse::<PlaylistEntry>().is_err());
    }

    #[test]
    fn rejects_empty_trailing_copy_count() {
        for input in ["parts.3mf:2:", "parts.3mf:*:", "parts.3mf::", "parts.3mf:2:*"] {
            let err = input.parse::<PlaylistEntry>().unwrap_err();
            assert!(
                err.to_string().contains("copy count"),
                "{} gave {}",
                input,
                err
            );
            assert_eq!(err.error_code(), "INVALID_PLAYLIST_ENTRY");
        }

        let entry: PlaylistEntry = "parts.3mf:".parse().unwrap();
        assert_eq!(entry.source_path, PathBuf::from("parts.3mf"));
        assert_eq!(entry.plate_index, None);
    }
}
