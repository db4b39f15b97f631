//! Typed access to the slicer's XML configuration documents.
//!
//! `slice_info.config` (statistics) and `model_settings.config` (project
//! descriptor) share one shape: a root holding `<plate>` sections, each an
//! ordered list of `<metadata key=.. value=..>` entries, `<filament>` usage
//! records and elements the engine passes through untouched.

pub mod document;
pub mod model_settings;
pub mod slice_info;
pub mod xml;

use thiserror::Error;

pub use document::{ConfigDocument, FilamentUsage, PlateSection, PlateStats};
pub use model_settings::rewrite_project_descriptor;
pub use slice_info::{merge_slice_info, MergedStats};

pub const SLICE_INFO_FILE: &str = "slice_info.config";
pub const MODEL_SETTINGS_FILE: &str = "model_settings.config";
pub const MODEL_SETTINGS_PREFIX: &str = "model_settings";
pub const PROJECT_SETTINGS_FILE: &str = "project_settings.config";
pub const FILAMENT_SETTINGS_PREFIX: &str = "filament_settings";

pub const INDEX_KEY: &str = "index";
pub const PREDICTION_KEY: &str = "prediction";
pub const WEIGHT_KEY: &str = "weight";
pub const PLATER_NAME_KEY: &str = "plater_name";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("Invalid attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Malformed document: {0}")]
    Structure(String),

    #[error("Invalid value for '{key}': '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Failed to write document: {0}")]
    Write(String),
}

impl DocumentError {
    fn write<E: std::fmt::Display>(err: E) -> Self {
        DocumentError::Write(err.to_string())
    }
}

pub type DocumentResult<T> = Result<T, DocumentError>;
