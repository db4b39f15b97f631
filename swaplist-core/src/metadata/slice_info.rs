use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::document::{ConfigDocument, FilamentUsage, PlateSection, PlateStats};
use super::{INDEX_KEY, PREDICTION_KEY, SLICE_INFO_FILE, WEIGHT_KEY};
use crate::errors::{SwapError, SwapResult};
use crate::playlist::{plate_index_from_path, ExpandedGcodeEntry};

/// Result of merging the statistics of a playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedStats {
    pub header: PlateStats,
    /// True when the header came from a plate with index 1.
    pub authoritative: bool,
    /// Accumulated filament usage by ascending id.
    pub filaments: Vec<FilamentUsage>,
    pub sources: usize,
}

/// Header statistics offered by each matched plate, in playlist order.
///
/// The first capture is provisional. A plate with index 1 replaces it once;
/// after that the header is fixed. A zero weight counts as "nothing
/// captured yet".
#[derive(Debug, Clone, Copy, Default)]
struct HeaderAuthority {
    stats: PlateStats,
    authoritative: bool,
}

impl HeaderAuthority {
    fn offer(&mut self, stats: PlateStats, is_index_one: bool) {
        if self.stats.weight_grams == 0.0 {
            self.stats = stats;
            self.authoritative = is_index_one;
        } else if is_index_one && !self.authoritative {
            self.stats = stats;
            self.authoritative = true;
        }
    }
}

/// Grams are summed in micrograms and rounded to centigrams only when
/// read, so per-source values with more than two decimals do not drift.
#[derive(Debug, Clone)]
struct FilamentTally {
    usage: FilamentUsage,
    meters: f64,
    micrograms: i64,
}

impl FilamentTally {
    fn grams(&self) -> f64 {
        (self.micrograms as f64 / 10_000.0).round() / 100.0
    }
}

/// One matched plate section reduced to what the merge needs.
struct SectionContribution {
    stats: PlateStats,
    is_index_one: bool,
    filaments: Vec<FilamentUsage>,
}

/// Accumulates `slice_info.config` documents into a single-plate document.
#[derive(Debug, Default)]
pub struct StatsMerger {
    template: Option<ConfigDocument>,
    header: HeaderAuthority,
    filaments: IndexMap<String, FilamentTally>,
    sources: usize,
}

fn section_matches(section: &PlateSection, target: Option<u32>) -> bool {
    match (target, section.index()) {
        (Some(target), Some(index)) => index.trim() == target.to_string(),
        _ => true,
    }
}

fn filament_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// First plate only, no filaments, index forced to 1.
fn template_from(document: &ConfigDocument) -> Option<ConfigDocument> {
    let mut template = document.clone();
    template.retain_first_plate();
    let plate = template.first_plate_mut()?;
    plate.clear_filaments();
    plate.set_metadata(INDEX_KEY, "1");
    Some(template)
}

impl StatsMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the statistics document beside `gcode_path` and merges it.
    pub fn add(&mut self, gcode_path: &Path, copies: u32) -> SwapResult<()> {
        let config_path = stats_path_for(gcode_path);
        let document = ConfigDocument::load(&config_path)?;
        self.add_document(&document, plate_index_from_path(gcode_path), copies, &config_path)
    }

    /// Merges the sections of `document` matching `target_index`.
    ///
    /// Nothing is applied when any matched section is malformed. Returns
    /// `IndexMismatch` when no section matches.
    pub fn add_document(
        &mut self,
        document: &ConfigDocument,
        target_index: Option<u32>,
        copies: u32,
        path: &Path,
    ) -> SwapResult<()> {
        if self.template.is_none() {
            self.template = template_from(document);
            if self.template.is_some() {
                debug!(path = %path.display(), "Using statistics template");
            }
        }

        let mut contributions = Vec::new();
        for section in document.plates().filter(|s| section_matches(s, target_index)) {
            let stats = section
                .stats()
                .map_err(|e| SwapError::unreadable(path, e))?;
            contributions.push(SectionContribution {
                stats,
                is_index_one: section.index().map(str::trim) == Some("1"),
                filaments: section.filaments().cloned().collect(),
            });
        }

        if contributions.is_empty() {
            return Err(SwapError::IndexMismatch {
                path: path.to_path_buf(),
                index: target_index.map_or_else(|| "any".to_string(), |i| i.to_string()),
            });
        }

        for contribution in contributions {
            self.header
                .offer(contribution.stats, contribution.is_index_one);
            for filament in contribution.filaments {
                self.accumulate(filament, copies);
            }
        }
        self.sources += 1;
        Ok(())
    }

    fn accumulate(&mut self, filament: FilamentUsage, copies: u32) {
        let meters = filament.used_meters * f64::from(copies);
        let micrograms = (filament.used_grams * f64::from(copies) * 1_000_000.0).round() as i64;
        self.filaments
            .entry(filament.id.clone())
            .and_modify(|tally| {
                tally.meters += meters;
                tally.micrograms += micrograms;
            })
            .or_insert(FilamentTally {
                usage: filament,
                meters,
                micrograms,
            });
    }

    /// Writes the accumulated values into the template.
    pub fn finish(self) -> SwapResult<(ConfigDocument, MergedStats)> {
        let mut document = self.template.ok_or(SwapError::NoStatistics)?;

        let mut filaments: Vec<FilamentUsage> = self
            .filaments
            .into_values()
            .map(|tally| FilamentUsage {
                used_meters: tally.meters,
                used_grams: tally.grams(),
                ..tally.usage
            })
            .collect();
        filaments.sort_by(|a, b| filament_order(&a.id, &b.id));

        let plate = document.first_plate_mut().ok_or(SwapError::NoStatistics)?;
        plate.set_metadata(
            PREDICTION_KEY,
            self.header.stats.prediction_seconds.to_string(),
        );
        plate.set_metadata(WEIGHT_KEY, format!("{:.2}", self.header.stats.weight_grams));
        for filament in &filaments {
            plate.push_filament(filament.clone());
        }

        let merged = MergedStats {
            header: self.header.stats,
            authoritative: self.header.authoritative,
            filaments,
            sources: self.sources,
        };
        Ok((document, merged))
    }
}

/// `slice_info.config` in the same directory as a plate's G-code.
pub fn stats_path_for(gcode_path: &Path) -> PathBuf {
    gcode_path
        .parent()
        .map(|dir| dir.join(SLICE_INFO_FILE))
        .unwrap_or_else(|| PathBuf::from(SLICE_INFO_FILE))
}

/// Merges the statistics of every entry and writes the result to `output`.
///
/// Missing, unreadable or non-matching documents are logged and skipped.
/// Fails only when no entry provides a usable document.
pub fn merge_slice_info(entries: &[ExpandedGcodeEntry], output: &Path) -> SwapResult<MergedStats> {
    let mut merger = StatsMerger::new();
    for entry in entries {
        if let Err(e) = merger.add(&entry.gcode_path, entry.copy_count) {
            if !e.is_recoverable() {
                return Err(e);
            }
            warn!(
                gcode = %entry.gcode_path.display(),
                code = e.error_code(),
                "{}",
                e
            );
        }
    }

    let (document, merged) = merger.finish()?;
    document.save(output)?;
    info!(
        path = %output.display(),
        weight = merged.header.weight_grams,
        prediction = merged.header.prediction_seconds,
        authoritative = merged.authoritative,
        filaments = merged.filaments.len(),
        "Merged slice statistics"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(plates: &[(u32, u64, &str, &[(&str, f64, f64)])]) -> ConfigDocument {
        let mut xml = String::from("<config>\n  <header/>\n");
        for (index, prediction, weight, filaments) in plates {
            xml.push_str("  <plate>\n");
            xml.push_str(&format!("    <metadata key=\"index\" value=\"{}\"/>\n", index));
            xml.push_str(&format!(
                "    <metadata key=\"prediction\" value=\"{}\"/>\n",
                prediction
            ));
            xml.push_str(&format!("    <metadata key=\"weight\" value=\"{}\"/>\n", weight));
            for (id, m, g) in filaments.iter() {
                xml.push_str(&format!(
                    "    <filament id=\"{}\" type=\"PLA\" color=\"#FFFFFF\" used_m=\"{}\" used_g=\"{}\"/>\n",
                    id, m, g
                ));
            }
            xml.push_str("  </plate>\n");
        }
        xml.push_str("</config>\n");
        ConfigDocument::parse(&xml).unwrap()
    }

    fn two_plates() -> ConfigDocument {
        doc(&[
            (1, 200, "20.00", &[("1", 6.5, 19.4)]),
            (2, 100, "10.00", &[("1", 3.0, 9.1), ("2", 1.0, 2.5)]),
        ])
    }

    #[test]
    fn plate_one_wins_regardless_of_position() {
        let source = two_plates();
        let path = Path::new("slice_info.config");
        let mut merger = StatsMerger::new();
        merger.add_document(&source, Some(2), 2, path).unwrap();
        merger.add_document(&source, Some(1), 3, path).unwrap();

        let (document, merged) = merger.finish().unwrap();
        assert!(merged.authoritative);
        assert_eq!(merged.header.weight_grams, 20.0);
        assert_eq!(merged.header.prediction_seconds, 200);

        let plate = document.plates().next().unwrap();
        assert_eq!(plate.metadata("weight"), Some("20.00"));
        assert_eq!(plate.metadata("prediction"), Some("200"));
        assert_eq!(plate.index(), Some("1"));
        assert_eq!(document.plate_count(), 1);
    }

    #[test]
    fn first_seen_is_fallback_without_plate_one() {
        let source = doc(&[
            (2, 100, "10.00", &[]),
            (3, 300, "30.00", &[]),
        ]);
        let path = Path::new("slice_info.config");
        let mut merger = StatsMerger::new();
        merger.add_document(&source, Some(3), 1, path).unwrap();
        merger.add_document(&source, Some(2), 1, path).unwrap();

        let (_, merged) = merger.finish().unwrap();
        assert!(!merged.authoritative);
        assert_eq!(merged.header.weight_grams, 30.0);
        assert_eq!(merged.header.prediction_seconds, 300);
    }

    #[test]
    fn authority_is_not_overridden_by_later_plates() {
        let source = two_plates();
        let path = Path::new("slice_info.config");
        let mut merger = StatsMerger::new();
        merger.add_document(&source, Some(1), 1, path).unwrap();
        merger.add_document(&source, Some(2), 1, path).unwrap();
        merger.add_document(&source, Some(1), 1, path).unwrap();

        let (_, merged) = merger.finish().unwrap();
        assert_eq!(merged.header.weight_grams, 20.0);
    }

    #[test]
    fn filaments_are_scaled_and_summed() {
        let source = two_plates();
        let path = Path::new("slice_info.config");
        let mut merger = StatsMerger::new();
        merger.add_document(&source, Some(2), 2, path).unwrap();
        merger.add_document(&source, Some(1), 3, path).unwrap();

        let (document, merged) = merger.finish().unwrap();
        let ids: Vec<&str> = merged.filaments.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        // 9.1 * 2 + 19.4 * 3
        assert_eq!(merged.filaments[0].used_grams, 76.4);
        assert!((merged.filaments[0].used_meters - 25.5).abs() < 1e-9);
        assert_eq!(merged.filaments[1].used_grams, 5.0);

        let written = String::from_utf8(document.to_xml().unwrap()).unwrap();
        assert!(written.contains(
            r##"<filament id="1" type="PLA" color="#FFFFFF" used_m="25.50" used_g="76.40"/>"##
        ));
    }

    #[test]
    fn grams_are_rounded_after_summing() {
        let source = doc(&[(1, 10, "1.00", &[("1", 0.001, 0.004), ("2", 0.001, 0.005)])]);
        let path = Path::new("slice_info.config");
        let mut merger = StatsMerger::new();
        merger.add_document(&source, Some(1), 3, path).unwrap();
        merger.add_document(&source, Some(1), 1, path).unwrap();

        let (document, merged) = merger.finish().unwrap();
        // 0.004 * 3 + 0.004 = 0.016; 0.005 * 3 + 0.005 = 0.020
        assert_eq!(merged.filaments[0].used_grams, 0.02);
        assert_eq!(merged.filaments[1].used_grams, 0.02);

        let single = doc(&[(1, 10, "1.00", &[("1", 0.001, 0.004)])]);
        let mut merger = StatsMerger::new();
        merger.add_document(&single, Some(1), 3, path).unwrap();
        let (_, merged) = merger.finish().unwrap();
        assert_eq!(merged.filaments[0].used_grams, 0.01);

        let written = String::from_utf8(document.to_xml().unwrap()).unwrap();
        assert!(written.contains(r#"used_g="0.02""#));
    }

    #[test]
    fn filament_ids_sort_numeric_then_lexicographic() {
        let mut ids = vec!["b", "10", "2", "a", "1"];
        ids.sort_by(|a, b| filament_order(a, b));
        assert_eq!(ids, vec!["1", "2", "10", "a", "b"]);
    }

    #[test]
    fn unmatched_index_is_reported() {
        let source = two_plates();
        let mut merger = StatsMerger::new();
        let err = merger
            .add_document(&source, Some(7), 1, Path::new("slice_info.config"))
            .unwrap_err();
        assert!(matches!(err, SwapError::IndexMismatch { ref index, .. } if index == "7"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn finishing_without_documents_fails() {
        let err = StatsMerger::new().finish().unwrap_err();
        assert!(matches!(err, SwapError::NoStatistics));
    }

    #[test]
    fn missing_header_keys_are_inserted() {
        let source = ConfigDocument::parse(
            r#"<config><plate><metadata key="index" value="4"/></plate></config>"#,
        )
        .unwrap();
        let mut merger = StatsMerger::new();
        merger
            .add_document(&source, Some(4), 1, Path::new("slice_info.config"))
            .unwrap();
        let (document, _) = merger.finish().unwrap();
        let plate = document.plates().next().unwrap();
        assert_eq!(plate.index(), Some("1"));
        assert_eq!(plate.metadata("prediction"), Some("0"));
        assert_eq!(plate.metadata("weight"), Some("0.00"));
    }
}
