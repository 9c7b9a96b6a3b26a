//! TOML configuration for a merge run.
//!
//! ```toml
//! mergeplan = "max"
//! import_fields = ["domain", "severity", "public_comment"]
//! export_fields = ["domain", "severity", "public_comment"]
//! allowlist = ["friendly.example"]
//! save_path = "merged.csv"
//!
//! [[blocklist_files]]
//! path = "lists/ours.csv"
//!
//! [[blocklist_instances]]
//! host = "mastodon.social"
//!
//! [[blocklist_instance_destinations]]
//! host = "our.example"
//! token = "..."
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    api::mastodon::{InstanceDestination, InstanceSource},
    block::Field,
    error::Result,
    export::DEFAULT_EXPORT_FIELDS,
    merge::MergePlan,
    parse::{FileSource, SourceFormat, DEFAULT_IMPORT_FIELDS},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mergeplan: MergePlan,

    #[serde(default = "default_import_fields")]
    pub import_fields: Vec<Field>,

    #[serde(default = "default_export_fields")]
    pub export_fields: Vec<Field>,

    #[serde(default)]
    pub blocklist_files: Vec<FileSource>,

    #[serde(default)]
    pub blocklist_instances: Vec<InstanceSource>,

    /// Instances the merged list is pushed to.
    #[serde(default)]
    pub blocklist_instance_destinations: Vec<InstanceDestination>,

    /// Domains that are never part of the merged output.
    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Where to write the merged list; stdout when unset.
    #[serde(default)]
    pub save_path: Option<PathBuf>,

    #[serde(default)]
    pub save_format: SourceFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mergeplan: MergePlan::default(),
            import_fields: default_import_fields(),
            export_fields: default_export_fields(),
            blocklist_files: Vec::new(),
            blocklist_instances: Vec::new(),
            blocklist_instance_destinations: Vec::new(),
            allowlist: Vec::new(),
            save_path: None,
            save_format: SourceFormat::default(),
        }
    }
}

fn default_import_fields() -> Vec<Field> {
    DEFAULT_IMPORT_FIELDS.to_vec()
}

fn default_export_fields() -> Vec<Field> {
    DEFAULT_EXPORT_FIELDS.to_vec()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
