use std::fs;
use std::path::Path;

use serde::Serialize;

use super::xml::{parse_element_tree, write_element_tree, XmlElement, XmlNode};
use super::{DocumentError, DocumentResult, INDEX_KEY, PREDICTION_KEY, WEIGHT_KEY};
use crate::errors::{SwapError, SwapResult};

const PLATE_TAG: &str = "plate";
const METADATA_TAG: &str = "metadata";
const FILAMENT_TAG: &str = "filament";

/// A slicer configuration document (`slice_info.config`,
/// `model_settings.config`) lifted into plate sections. Everything the
/// engine does not reason about is carried as raw nodes and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    pub root_name: String,
    pub root_attributes: Vec<(String, String)>,
    pub nodes: Vec<ConfigNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Plate(PlateSection),
    Other(XmlNode),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlateSection {
    pub attributes: Vec<(String, String)>,
    pub nodes: Vec<PlateNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlateNode {
    Metadata(MetadataEntry),
    /// `source` is the element as read; parsed records are written back
    /// from it untouched, records added later are emitted canonically.
    Filament {
        usage: FilamentUsage,
        source: Option<XmlElement>,
    },
    Other(XmlNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    /// Element as read, with any further attributes and text content.
    element: XmlElement,
}

/// Header-level statistics of one plate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PlateStats {
    pub prediction_seconds: u64,
    pub weight_grams: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilamentUsage {
    pub id: String,
    pub filament_type: String,
    pub color: String,
    pub tray_info_idx: Option<String>,
    pub used_meters: f64,
    pub used_grams: f64,
}

/// Nodes that can carry the indentation text between elements.
trait Spacing: Sized {
    fn spacing(text: String) -> Self;
    fn as_spacing(&self) -> Option<&str>;
}

impl Spacing for ConfigNode {
    fn spacing(text: String) -> Self {
        ConfigNode::Other(XmlNode::Text(text))
    }

    fn as_spacing(&self) -> Option<&str> {
        match self {
            ConfigNode::Other(XmlNode::Text(text)) if text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

impl Spacing for PlateNode {
    fn spacing(text: String) -> Self {
        PlateNode::Other(XmlNode::Text(text))
    }

    fn as_spacing(&self) -> Option<&str> {
        match self {
            PlateNode::Other(XmlNode::Text(text)) if text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

/// Drops nodes rejected by `keep` together with the indentation in front of them.
fn retain_spaced<N: Spacing>(nodes: &mut Vec<N>, mut keep: impl FnMut(&N) -> bool) -> usize {
    let mut removed = 0;
    let mut retained: Vec<N> = Vec::with_capacity(nodes.len());
    for node in nodes.drain(..) {
        if node.as_spacing().is_some() || keep(&node) {
            retained.push(node);
            continue;
        }
        if retained.last().and_then(Spacing::as_spacing).is_some() {
            retained.pop();
        }
        removed += 1;
    }
    *nodes = retained;
    removed
}

/// Appends after the last element, repeating the indentation used before it.
fn append_spaced<N: Spacing>(nodes: &mut Vec<N>, node: N) {
    let Some(last) = nodes.iter().rposition(|n| n.as_spacing().is_none()) else {
        nodes.insert(0, node);
        return;
    };
    let indent = last
        .checked_sub(1)
        .and_then(|i| nodes[i].as_spacing())
        .map(str::to_string);
    match indent {
        Some(indent) => {
            nodes.insert(last + 1, N::spacing(indent));
            nodes.insert(last + 2, node);
        }
        None => nodes.insert(last + 1, node),
    }
}

impl ConfigDocument {
    pub fn parse(xml: &str) -> DocumentResult<Self> {
        let root = parse_element_tree(xml)?;
        let mut nodes = Vec::with_capacity(root.children.len());
        for child in root.children {
            match child {
                XmlNode::Element(element) if element.name == PLATE_TAG => {
                    nodes.push(ConfigNode::Plate(PlateSection::from_element(element)?));
                }
                other => nodes.push(ConfigNode::Other(other)),
            }
        }
        Ok(Self {
            root_name: root.name,
            root_attributes: root.attributes,
            nodes,
        })
    }

    /// Reads a document from disk. A missing file and an unparsable file
    /// are reported as distinct, recoverable failures.
    pub fn load(path: &Path) -> SwapResult<Self> {
        if !path.is_file() {
            return Err(SwapError::MissingDocument(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|e| SwapError::unreadable(path, e))?;
        Self::parse(&content).map_err(|e| SwapError::unreadable(path, e))
    }

    pub fn to_xml(&self) -> DocumentResult<Vec<u8>> {
        write_element_tree(&self.to_element())
    }

    pub fn save(&self, path: &Path) -> SwapResult<()> {
        let bytes = self.to_xml().map_err(|e| SwapError::unreadable(path, e))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn to_element(&self) -> XmlElement {
        let mut root = XmlElement::new(self.root_name.clone());
        root.attributes = self.root_attributes.clone();
        root.children = self
            .nodes
            .iter()
            .map(|node| match node {
                ConfigNode::Plate(plate) => XmlNode::Element(plate.to_element()),
                ConfigNode::Other(other) => other.clone(),
            })
            .collect();
        root
    }

    pub fn plates(&self) -> impl Iterator<Item = &PlateSection> {
        self.nodes.iter().filter_map(|node| match node {
            ConfigNode::Plate(plate) => Some(plate),
            ConfigNode::Other(_) => None,
        })
    }

    pub fn plate_count(&self) -> usize {
        self.plates().count()
    }

    pub fn first_plate_mut(&mut self) -> Option<&mut PlateSection> {
        self.nodes.iter_mut().find_map(|node| match node {
            ConfigNode::Plate(plate) => Some(plate),
            ConfigNode::Other(_) => None,
        })
    }

    /// Removes every plate section after the first. Returns how many were dropped.
    pub fn retain_first_plate(&mut self) -> usize {
        let mut seen_plate = false;
        retain_spaced(&mut self.nodes, |node| match node {
            ConfigNode::Plate(_) if seen_plate => false,
            ConfigNode::Plate(_) => {
                seen_plate = true;
                true
            }
            ConfigNode::Other(_) => true,
        })
    }
}

impl PlateSection {
    fn from_element(element: XmlElement) -> DocumentResult<Self> {
        let mut nodes = Vec::with_capacity(element.children.len());
        for child in element.children {
            let node = match child {
                XmlNode::Element(inner)
                    if inner.name == METADATA_TAG
                        && !inner.has_element_children()
                        && inner.attribute("key").is_some() =>
                {
                    PlateNode::Metadata(MetadataEntry::from_element(inner))
                }
                XmlNode::Element(inner)
                    if inner.name == FILAMENT_TAG && inner.attribute("id").is_some() =>
                {
                    PlateNode::Filament {
                        usage: FilamentUsage::from_element(&inner)?,
                        source: Some(inner),
                    }
                }
                other => PlateNode::Other(other),
            };
            nodes.push(node);
        }
        Ok(Self {
            attributes: element.attributes,
            nodes,
        })
    }

    fn to_element(&self) -> XmlElement {
        let mut element = XmlElement::new(PLATE_TAG);
        element.attributes = self.attributes.clone();
        element.children = self
            .nodes
            .iter()
            .map(|node| match node {
                PlateNode::Metadata(entry) => XmlNode::Element(entry.to_element()),
                PlateNode::Filament {
                    source: Some(source),
                    ..
                } => XmlNode::Element(source.clone()),
                PlateNode::Filament { usage, source: None } => {
                    XmlNode::Element(usage.to_element())
                }
                PlateNode::Other(other) => other.clone(),
            })
            .collect();
        element
    }

    /// First value stored under `key`.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.nodes.iter().find_map(|node| match node {
            PlateNode::Metadata(entry) if entry.key == key => Some(entry.value.as_str()),
            _ => None,
        })
    }

    pub fn index(&self) -> Option<&str> {
        self.metadata(INDEX_KEY)
    }

    /// Overwrites every entry stored under `key`, appending one when absent.
    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let mut found = false;
        for node in &mut self.nodes {
            if let PlateNode::Metadata(entry) = node {
                if entry.key == key {
                    entry.value = value.clone();
                    found = true;
                }
            }
        }
        if !found {
            append_spaced(
                &mut self.nodes,
                PlateNode::Metadata(MetadataEntry::new(key, value)),
            );
        }
    }

    /// Drops entries whose key is listed. Absent keys are ignored.
    pub fn remove_metadata(&mut self, keys: &[&str]) -> usize {
        retain_spaced(&mut self.nodes, |node| match node {
            PlateNode::Metadata(entry) => !keys.contains(&entry.key.as_str()),
            _ => true,
        })
    }

    pub fn filaments(&self) -> impl Iterator<Item = &FilamentUsage> {
        self.nodes.iter().filter_map(|node| match node {
            PlateNode::Filament { usage, .. } => Some(usage),
            _ => None,
        })
    }

    pub fn clear_filaments(&mut self) -> usize {
        retain_spaced(&mut self.nodes, |node| !matches!(node, PlateNode::Filament { .. }))
    }

    pub fn push_filament(&mut self, filament: FilamentUsage) {
        append_spaced(
            &mut self.nodes,
            PlateNode::Filament {
                usage: filament,
                source: None,
            },
        );
    }

    /// Reads `prediction` and `weight`; absent entries count as zero.
    pub fn stats(&self) -> DocumentResult<PlateStats> {
        let mut stats = PlateStats::default();
        if let Some(value) = self.metadata(PREDICTION_KEY) {
            stats.prediction_seconds = parse_value(PREDICTION_KEY, value)?;
        }
        if let Some(value) = self.metadata(WEIGHT_KEY) {
            stats.weight_grams = parse_value(WEIGHT_KEY, value)?;
        }
        Ok(stats)
    }
}

impl MetadataEntry {
    pub fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
            element: XmlElement::new(METADATA_TAG),
        }
    }

    fn from_element(element: XmlElement) -> Self {
        Self {
            key: element.attribute("key").unwrap_or_default().to_string(),
            value: element.attribute("value").unwrap_or_default().to_string(),
            element,
        }
    }

    fn to_element(&self) -> XmlElement {
        let mut element = self.element.clone();
        element.set_attribute("key", self.key.clone());
        element.set_attribute("value", self.value.clone());
        element
    }
}

impl FilamentUsage {
    fn from_element(element: &XmlElement) -> DocumentResult<Self> {
        let used_meters = match element.attribute("used_m") {
            Some(value) => parse_value("used_m", value)?,
            None => 0.0,
        };
        let used_grams = match element.attribute("used_g") {
            Some(value) => parse_value("used_g", value)?,
            None => 0.0,
        };
        Ok(Self {
            id: element.attribute("id").unwrap_or_default().to_string(),
            filament_type: element.attribute("type").unwrap_or_default().to_string(),
            color: element.attribute("color").unwrap_or_default().to_string(),
            tray_info_idx: element
                .attribute("tray_info_idx")
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            used_meters,
            used_grams,
        })
    }

    fn to_element(&self) -> XmlElement {
        let mut element = XmlElement::new(FILAMENT_TAG)
            .with_attribute("id", self.id.clone())
            .with_attribute("type", self.filament_type.clone())
            .with_attribute("color", self.color.clone());
        if let Some(tray) = &self.tray_info_idx {
            element.set_attribute("tray_info_idx", tray.clone());
        }
        element
            .with_attribute("used_m", format!("{:.2}", self.used_meters))
            .with_attribute("used_g", format!("{:.2}", self.used_grams))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> DocumentResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DocumentError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLICE_INFO: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<config>
  <header>
    <header_item key="X-BBL-Client-Type" value="slicer"/>
  </header>
  <plate>
    <metadata key="index" value="1"/>
    <metadata key="prediction" value="200"/>
    <metadata key="weight" value="20.00"/>
    <object identify_id="71" name="Cube" skipped="false"/>
    <filament id="1" tray_info_idx="GFA00" type="PLA" color="#FFFFFF" used_m="6.50" used_g="19.40"/>
  </plate>
  <plate>
    <metadata key="index" value="2"/>
    <metadata key="prediction" value="100"/>
    <metadata key="weight" value="10.00"/>
  </plate>
</config>
"##;

    #[test]
    fn lifts_plate_sections() {
        let doc = ConfigDocument::parse(SLICE_INFO).unwrap();
        assert_eq!(doc.root_name, "config");
        assert_eq!(doc.plate_count(), 2);

        let first = doc.plates().next().unwrap();
        assert_eq!(first.index(), Some("1"));
        let stats = first.stats().unwrap();
        assert_eq!(stats.prediction_seconds, 200);
        assert_eq!(stats.weight_grams, 20.0);

        let filament = first.filaments().next().unwrap();
        assert_eq!(filament.id, "1");
        assert_eq!(filament.filament_type, "PLA");
        assert_eq!(filament.tray_info_idx.as_deref(), Some("GFA00"));
        assert_eq!(filament.used_grams, 19.4);
    }

    #[test]
    fn unchanged_document_keeps_unknown_elements() {
        let doc = ConfigDocument::parse(SLICE_INFO).unwrap();
        let written = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert!(written.contains(r#"<header_item key="X-BBL-Client-Type" value="slicer"/>"#));
        assert!(written.contains(r#"<object identify_id="71" name="Cube" skipped="false"/>"#));
        assert!(written.contains("  <plate>\n    <metadata key=\"index\" value=\"1\"/>"));
    }

    #[test]
    fn retain_first_plate_drops_the_rest() {
        let mut doc = ConfigDocument::parse(SLICE_INFO).unwrap();
        assert_eq!(doc.retain_first_plate(), 1);
        assert_eq!(doc.plate_count(), 1);

        let written = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert!(!written.contains(r#"value="2""#));
        assert!(!written.contains("\n\n"));
    }

    #[test]
    fn set_metadata_appends_with_matching_indentation() {
        let mut doc = ConfigDocument::parse(SLICE_INFO).unwrap();
        let plate = doc.first_plate_mut().unwrap();
        plate.set_metadata("plater_name", "SWAP");
        assert_eq!(plate.metadata("plater_name"), Some("SWAP"));

        let written = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert!(written.contains("\n    <metadata key=\"plater_name\" value=\"SWAP\"/>\n  </plate>"));
    }

    #[test]
    fn remove_metadata_ignores_absent_keys() {
        let mut doc = ConfigDocument::parse(SLICE_INFO).unwrap();
        let plate = doc.first_plate_mut().unwrap();
        assert_eq!(plate.remove_metadata(&["weight", "locked"]), 1);
        assert_eq!(plate.metadata("weight"), None);
        assert_eq!(plate.metadata("prediction"), Some("200"));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let xml = r#"<config><plate><metadata key="prediction" value="soon"/></plate></config>"#;
        let doc = ConfigDocument::parse(xml).unwrap();
        let err = doc.plates().next().unwrap().stats().unwrap_err();
        assert!(matches!(err, DocumentError::InvalidValue { .. }));
    }

    #[test]
    fn filament_emission_uses_two_decimals() {
        let filament = FilamentUsage {
            id: "2".to_string(),
            filament_type: "PETG".to_string(),
            color: "#000000".to_string(),
            tray_info_idx: None,
            used_meters: 1.0 / 3.0,
            used_grams: 4.5,
        };
        let element = filament.to_element();
        assert_eq!(element.attribute("used_m"), Some("0.33"));
        assert_eq!(element.attribute("used_g"), Some("4.50"));
        assert_eq!(element.attribute("tray_info_idx"), None);
        assert_eq!(element.attributes[0].0, "id");
    }

    #[test]
    fn untouched_records_keep_their_attributes_and_text() {
        let xml = r##"<config>
  <plate>
    <metadata value="3" key="index" source="auto">
      kept
    </metadata>
    <filament id="1" type="PLA" color="#FFFFFF" used_m="1.234" used_g="0.004" nozzle="0"/>
  </plate>
</config>"##;
        let mut doc = ConfigDocument::parse(xml).unwrap();
        let written = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert!(written.contains(
            "<metadata value=\"3\" key=\"index\" source=\"auto\">\n      kept\n    </metadata>"
        ));
        assert!(written.contains(
            r##"<filament id="1" type="PLA" color="#FFFFFF" used_m="1.234" used_g="0.004" nozzle="0"/>"##
        ));

        doc.first_plate_mut().unwrap().set_metadata("index", "1");
        let written = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert!(written.contains("<metadata value=\"1\" key=\"index\" source=\"auto\">"));
    }

    #[test]
    fn pushed_filaments_are_written_canonically() {
        let mut doc = ConfigDocument::parse(SLICE_INFO).unwrap();
        let plate = doc.first_plate_mut().unwrap();
        let mut filament = plate.filaments().next().unwrap().clone();
        assert_eq!(plate.clear_filaments(), 1);
        filament.used_grams = 38.8;
        plate.push_filament(filament);

        let written = String::from_utf8(doc.to_xml().unwrap()).unwrap();
        assert!(written.contains(
            r##"<filament id="1" type="PLA" color="#FFFFFF" tray_info_idx="GFA00" used_m="6.50" used_g="38.80"/>"##
        ));
    }
}
