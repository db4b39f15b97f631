use std::path::Path;

use tracing::{debug, info};

use super::document::ConfigDocument;
use super::PLATER_NAME_KEY;
use crate::errors::SwapResult;

/// Plate keys that describe the source layout and would misrepresent a
/// merged swap plate.
pub const VOLATILE_PLATE_KEYS: [&str; 4] = [
    "filament_map_mode",
    "filament_maps",
    "thumbnail_no_light_file",
    "locked",
];

/// Collapses the descriptor to its first plate, names it `plate_name` and
/// drops the volatile keys. Returns the number of plates removed.
pub fn collapse_to_swap_plate(document: &mut ConfigDocument, plate_name: &str) -> usize {
    let removed = document.retain_first_plate();
    if let Some(plate) = document.first_plate_mut() {
        plate.set_metadata(PLATER_NAME_KEY, plate_name);
        let dropped = plate.remove_metadata(&VOLATILE_PLATE_KEYS);
        debug!(dropped, "Removed volatile plate keys");
    }
    removed
}

/// Rewrites `model_settings.config` in place. A missing descriptor is left alone.
pub fn rewrite_project_descriptor(path: &Path, plate_name: &str) -> SwapResult<bool> {
    if !path.is_file() {
        debug!(path = %path.display(), "No project descriptor to rewrite");
        return Ok(false);
    }

    let mut document = ConfigDocument::load(path)?;
    let removed = collapse_to_swap_plate(&mut document, plate_name);
    document.save(path)?;
    info!(
        path = %path.display(),
        removed_plates = removed,
        plater_name = plate_name,
        "Rewrote project descriptor"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<config>
  <object id="2">
    <metadata key="name" value="Cube"/>
  </object>
  <plate>
    <metadata key="plater_id" value="1"/>
    <metadata key="plater_name" value="Front"/>
    <metadata key="locked" value="false"/>
    <metadata key="filament_map_mode" value="Auto For Flush"/>
    <metadata key="filament_maps" value="1 1"/>
    <metadata key="thumbnail_file" value="Metadata/plate_1.png"/>
    <metadata key="thumbnail_no_light_file" value="Metadata/plate_no_light_1.png"/>
    <model_instance>
      <metadata key="object_id" value="2"/>
    </model_instance>
  </plate>
  <plate>
    <metadata key="plater_id" value="2"/>
    <metadata key="plater_name" value="Back"/>
  </plate>
  <assemble>
    <assemble_item object_id="2" instance_id="0"/>
  </assemble>
</config>
"#;

    #[test]
    fn collapses_to_single_swap_plate() {
        let mut document = ConfigDocument::parse(MODEL_SETTINGS).unwrap();
        assert_eq!(collapse_to_swap_plate(&mut document, "SWAP"), 1);
        assert_eq!(document.plate_count(), 1);

        let plate = document.plates().next().unwrap();
        assert_eq!(plate.metadata("plater_name"), Some("SWAP"));
        assert_eq!(plate.metadata("plater_id"), Some("1"));
        assert_eq!(plate.metadata("thumbnail_file"), Some("Metadata/plate_1.png"));
        for key in VOLATILE_PLATE_KEYS {
            assert_eq!(plate.metadata(key), None, "{} should be removed", key);
        }

        let written = String::from_utf8(document.to_xml().unwrap()).unwrap();
        assert!(written.contains(r#"<metadata key="object_id" value="2"/>"#));
        assert!(written.contains(r#"<assemble_item object_id="2" instance_id="0"/>"#));
        assert!(!written.contains("Back"));
    }

    #[test]
    fn inserts_plater_name_when_absent() {
        let mut document = ConfigDocument::parse(
            r#"<config><plate><metadata key="plater_id" value="1"/></plate></config>"#,
        )
        .unwrap();
        assert_eq!(collapse_to_swap_plate(&mut document, "SWAP"), 0);
        let plate = document.plates().next().unwrap();
        assert_eq!(plate.metadata("plater_name"), Some("SWAP"));
    }

    #[test]
    fn missing_descriptor_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let rewritten =
            rewrite_project_descriptor(&dir.path().join("model_settings.config"), "SWAP").unwrap();
        assert!(!rewritten);
    }

    #[test]
    fn rewrites_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_settings.config");
        std::fs::write(&path, MODEL_SETTINGS).unwrap();

        assert!(rewrite_project_descriptor(&path, "SWAP").unwrap());
        let reloaded = ConfigDocument::load(&path).unwrap();
        assert_eq!(reloaded.plate_count(), 1);
        assert_eq!(
            reloaded.plates().next().unwrap().metadata("plater_name"),
            Some("SWAP")
        );
    }
}
