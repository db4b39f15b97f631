use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use zip::{write::FileOptions, ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
 <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
 <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
 <Default Extension="png" ContentType="image/png"/>
 <Default Extension="gcode" ContentType="text/x.gcode"/>
</Types>
"#;

const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
 <Relationship Target="/3D/3dmodel.model" Id="rel-1" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>
"#;

const MODEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter" xml:lang="en-US" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
 <resources/>
 <build/>
</model>
"#;

/// Filament usage reported by one plate.
#[derive(Debug, Clone)]
pub struct FilamentFixture {
    pub id: String,
    pub filament_type: String,
    pub color: String,
    pub used_m: f64,
    pub used_g: f64,
}

/// One sliced plate inside a synthetic project archive.
#[derive(Debug, Clone)]
pub struct PlateFixture {
    pub index: u32,
    pub gcode: String,
    pub prediction: u64,
    pub weight: f64,
    pub filaments: Vec<FilamentFixture>,
}

impl PlateFixture {
    pub fn new(index: u32, gcode: &str) -> Self {
        Self {
            index,
            gcode: gcode.to_string(),
            prediction: 0,
            weight: 0.0,
            filaments: Vec::new(),
        }
    }

    pub fn stats(mut self, prediction: u64, weight: f64) -> Self {
        self.prediction = prediction;
        self.weight = weight;
        self
    }

    pub fn filament(mut self, id: &str, used_m: f64, used_g: f64) -> Self {
        self.filaments.push(FilamentFixture {
            id: id.to_string(),
            filament_type: "PLA".to_string(),
            color: "#FFFFFF".to_string(),
            used_m,
            used_g,
        });
        self
    }
}

/// Builds slicer project archives laid out the way the slicer writes them.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    plates: Vec<PlateFixture>,
    files: Vec<(String, Vec<u8>)>,
    without_slice_info: bool,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plate(mut self, plate: PlateFixture) -> Self {
        self.plates.push(plate);
        self
    }

    /// Adds or replaces an arbitrary entry, e.g. `Metadata/custom.json`.
    pub fn file(mut self, name: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.retain(|(existing, _)| existing != name);
        self.files.push((name.to_string(), content.into()));
        self
    }

    pub fn without_slice_info(mut self) -> Self {
        self.without_slice_info = true;
        self
    }

    pub fn slice_info_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<config>\n");
        xml.push_str("  <header>\n    <header_item key=\"X-BBL-Client-Type\" value=\"slicer\"/>\n  </header>\n");
        for plate in &self.plates {
            xml.push_str("  <plate>\n");
            xml.push_str(&format!("    <metadata key=\"index\" value=\"{}\"/>\n", plate.index));
            xml.push_str(&format!(
                "    <metadata key=\"prediction\" value=\"{}\"/>\n",
                plate.prediction
            ));
            xml.push_str(&format!(
                "    <metadata key=\"weight\" value=\"{:.2}\"/>\n",
                plate.weight
            ));
            xml.push_str("    <metadata key=\"outside\" value=\"false\"/>\n");
            for filament in &plate.filaments {
                xml.push_str(&format!(
                    "    <filament id=\"{}\" tray_info_idx=\"GFA00\" type=\"{}\" color=\"{}\" used_m=\"{:.2}\" used_g=\"{:.2}\" />\n",
                    filament.id, filament.filament_type, filament.color, filament.used_m, filament.used_g
                ));
            }
            xml.push_str("  </plate>\n");
        }
        xml.push_str("</config>\n");
        xml
    }

    pub fn model_settings_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<config>\n");
        xml.push_str("  <object id=\"2\">\n    <metadata key=\"name\" value=\"Part\"/>\n  </object>\n");
        for plate in &self.plates {
            xml.push_str("  <plate>\n");
            xml.push_str(&format!("    <metadata key=\"plater_id\" value=\"{}\"/>\n", plate.index));
            xml.push_str(&format!(
                "    <metadata key=\"plater_name\" value=\"Plate {}\"/>\n",
                plate.index
            ));
            xml.push_str("    <metadata key=\"locked\" value=\"false\"/>\n");
            xml.push_str("    <metadata key=\"filament_map_mode\" value=\"Auto For Flush\"/>\n");
            xml.push_str("    <metadata key=\"filament_maps\" value=\"1\"/>\n");
            xml.push_str(&format!(
                "    <metadata key=\"thumbnail_file\" value=\"Metadata/plate_{}.png\"/>\n",
                plate.index
            ));
            xml.push_str(&format!(
                "    <metadata key=\"thumbnail_no_light_file\" value=\"Metadata/plate_no_light_{}.png\"/>\n",
                plate.index
            ));
            xml.push_str("  </plate>\n");
        }
        xml.push_str("</config>\n");
        xml
    }

    fn entries(&self) -> Vec<(String, Vec<u8>)> {
        let mut entries: Vec<(String, Vec<u8>)> = vec![
            ("[Content_Types].xml".to_string(), CONTENT_TYPES.into()),
            ("_rels/.rels".to_string(), RELS.into()),
            ("3D/3dmodel.model".to_string(), MODEL.into()),
            (
                "Metadata/project_settings.config".to_string(),
                b"{\"printer_model\": \"test\"}".to_vec(),
            ),
            (
                "Metadata/filament_settings_1.config".to_string(),
                b"{\"filament_type\": [\"PLA\"]}".to_vec(),
            ),
            (
                "Metadata/model_settings.config".to_string(),
                self.model_settings_xml().into_bytes(),
            ),
        ];
        if !self.without_slice_info {
            entries.push((
                "Metadata/slice_info.config".to_string(),
                self.slice_info_xml().into_bytes(),
            ));
        }

        for plate in &self.plates {
            let n = plate.index;
            entries.push((format!("Metadata/plate_{}.gcode", n), plate.gcode.clone().into_bytes()));
            entries.push((format!("Metadata/plate_{}.gcode.md5", n), b"stale".to_vec()));
            for thumb in [
                format!("plate_{}.png", n),
                format!("plate_{}_small.png", n),
                format!("plate_no_light_{}.png", n),
                format!("pick_{}.png", n),
                format!("top_{}.png", n),
            ] {
                let content = format!("png:{}", thumb).into_bytes();
                entries.push((format!("Metadata/{}", thumb), content));
            }
        }

        for (name, content) in &self.files {
            entries.retain(|(existing, _)| existing != name);
            entries.push((name.clone(), content.clone()));
        }
        entries
    }

    /// Writes the archive to `path` and returns it.
    pub fn write(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = ZipWriter::new(fs::File::create(path)?);
        for (name, content) in self.entries() {
            writer.start_file(name, FileOptions::default())?;
            writer.write_all(&content)?;
        }
        writer.finish()?;
        Ok(path.to_path_buf())
    }
}

/// Sorted entry names of a zip archive.
pub fn archive_entry_names(path: &Path) -> Result<Vec<String>> {
    let archive = ZipArchive::new(fs::File::open(path)?)?;
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    Ok(names)
}

/// Contents of one entry of a zip archive.
pub fn read_archive_entry(path: &Path, name: &str) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(fs::File::open(path)?)?;
    let mut entry = archive
        .by_name(name)
        .map_err(|e| anyhow!("{} has no entry {}: {}", path.display(), name, e))?;
    let mut content = Vec::new();
    entry.read_to_end(&mut content)?;
    Ok(content)
}
