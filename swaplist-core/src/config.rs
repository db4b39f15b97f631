/// Configuration knobs for the recombination engine. Defaults match the
/// archive layout written by the slicer and the names its printers expect.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory inside a project archive that holds per-plate assets.
    pub metadata_dir: String,
    /// Value written to the retained plate's `plater_name`.
    pub swap_plate_name: String,
    /// File name prefixes copied alongside every selected plate.
    pub auxiliary_prefixes: Vec<String>,
    /// Prefix of archives published into a shared output directory.
    pub archive_prefix: String,
    /// Prefix of thumbnails published into a shared output directory.
    pub thumbnail_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metadata_dir: "Metadata".to_string(),
            swap_plate_name: "SWAP".to_string(),
            auxiliary_prefixes: vec![
                "pick_".to_string(),
                "top_".to_string(),
                crate::metadata::MODEL_SETTINGS_PREFIX.to_string(),
            ],
            archive_prefix: "swap_playlist_".to_string(),
            thumbnail_prefix: "thumb_".to_string(),
        }
    }
}
