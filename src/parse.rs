//! Turns raw blocklist sources into [`DomainBlock`] records ready for merging.

use std::{fmt, path::PathBuf, str::FromStr};

use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    api::mastodon::InstanceDomainBlock,
    block::{normalize_domain, DomainBlock, Field, Severity},
    error::{Error, Result},
};

/// Fields imported when a source doesn't specify any.
pub const DEFAULT_IMPORT_FIELDS: [Field; 2] = [Field::Domain, Field::Severity];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    #[default]
    Csv,
    Json,
    /// The public `/api/v1/instance/domain_blocks` response.
    Mastodon,
}

impl SourceFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Json => "json",
            SourceFormat::Mastodon => "mastodon",
        }
    }
}

impl FromStr for SourceFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "json" => Ok(SourceFormat::Json),
            "mastodon" => Ok(SourceFormat::Mastodon),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SourceFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SourceFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// A blocklist stored on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSource {
    pub path: PathBuf,
    #[serde(default)]
    pub format: SourceFormat,
    /// Fields to take from this file; falls back to the global import fields.
    #[serde(default)]
    pub import_fields: Option<Vec<Field>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, format: SourceFormat) -> Self {
        Self {
            path: path.into(),
            format,
            import_fields: None,
        }
    }

    pub fn load(&self, import_fields: &[Field]) -> Result<Vec<DomainBlock>> {
        let data = std::fs::read(&self.path)?;
        let fields = self.import_fields.as_deref().unwrap_or(import_fields);
        parse_blocklist(&data, &self.path.display().to_string(), self.format, fields)
    }
}

/// Loads and parses every file in parallel.
///
/// The result keeps the order of `files` so the merge stays deterministic.
pub fn load_files(files: &[FileSource], import_fields: &[Field]) -> Result<Vec<Vec<DomainBlock>>> {
    files
        .par_iter()
        .map(|file| file.load(import_fields))
        .collect()
}

/// Parses one source into blocks, keeping only `import_fields`.
///
/// Fields that aren't imported keep their defaults. `origin` only shows up in
/// log output and errors.
pub fn parse_blocklist(
    data: &[u8],
    origin: &str,
    format: SourceFormat,
    import_fields: &[Field],
) -> Result<Vec<DomainBlock>> {
    let blocks = match format {
        SourceFormat::Csv => parse_csv(data, origin, import_fields)?,
        SourceFormat::Json => serde_json::from_slice::<Vec<JsonDomainBlock>>(data)?
            .into_iter()
            .map(DomainBlock::from)
            .collect(),
        SourceFormat::Mastodon => serde_json::from_slice::<Vec<InstanceDomainBlock>>(data)?
            .into_iter()
            .filter_map(|b| b.into_domain_block(origin))
            .collect(),
    };

    let total = blocks.len();
    let blocks = blocks
        .into_iter()
        .filter(|b| {
            if b.domain.is_empty() {
                tracing::warn!(origin, "skipping block with an empty domain");
            }
            !b.domain.is_empty()
        })
        .map(|b| restrict_fields(b, import_fields))
        .collect::<Vec<_>>();

    tracing::info!(origin, %format, kept = blocks.len(), total, "parsed blocklist");
    Ok(blocks)
}

/// Resets every field not in `fields` to its default.
pub fn restrict_fields(block: DomainBlock, fields: &[Field]) -> DomainBlock {
    let keep = |f: Field| fields.contains(&f);
    let mut restricted = DomainBlock::new(&block.domain, Severity::None);

    if keep(Field::Severity) {
        restricted.severity = block.severity;
    }
    if keep(Field::PublicComment) {
        restricted.public_comment = block.public_comment;
    }
    if keep(Field::PrivateComment) {
        restricted.private_comment = block.private_comment;
    }
    if keep(Field::RejectMedia) {
        restricted.reject_media = block.reject_media;
    }
    if keep(Field::RejectReports) {
        restricted.reject_reports = block.reject_reports;
    }
    if keep(Field::Obfuscate) {
        restricted.obfuscate = block.obfuscate;
    }

    restricted
}

/// Reads only the imported columns, so a malformed value in a skipped column
/// can't fail the source.
fn parse_csv(data: &[u8], origin: &str, import_fields: &[Field]) -> Result<Vec<DomainBlock>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);

    let columns = reader
        .headers()
        .map_err(|e| Error::csv(origin, e))?
        .iter()
        .map(|h| match h.parse::<Field>() {
            Ok(field) if field == Field::Domain || import_fields.contains(&field) => Some(field),
            Ok(field) => {
                tracing::trace!(origin, %field, "skipping column not in import fields");
                None
            }
            Err(_) => {
                tracing::debug!(origin, column = h, "ignoring unknown csv column");
                None
            }
        })
        .collect::<Vec<_>>();

    let mut blocks = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::csv(origin, e))?;
        let mut block = DomainBlock::default();

        for (field, value) in columns.iter().zip(record.iter()) {
            let Some(field) = field else { continue };
            match field {
                Field::Domain => block.domain = normalize_domain(value),
                Field::Severity => block.severity = value.parse()?,
                Field::PublicComment => block.public_comment = text(value),
                Field::PrivateComment => block.private_comment = text(value),
                Field::RejectMedia => block.reject_media = parse_flag(*field, value)?,
                Field::RejectReports => block.reject_reports = parse_flag(*field, value)?,
                Field::Obfuscate => block.obfuscate = parse_flag(*field, value)?,
            }
        }

        blocks.push(block);
    }

    Ok(blocks)
}

fn text(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_flag(field: Field, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "" | "false" | "0" | "no" => Ok(false),
        _ => Err(Error::InvalidFlag {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Loosely-shaped JSON entry; older exports carry a single `comment`.
#[derive(Deserialize)]
struct JsonDomainBlock {
    domain: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    public_comment: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    private_comment: Option<String>,
    #[serde(default)]
    reject_media: bool,
    #[serde(default)]
    reject_reports: bool,
    #[serde(default)]
    obfuscate: bool,
}

impl From<JsonDomainBlock> for DomainBlock {
    fn from(value: JsonDomainBlock) -> Self {
        Self {
            domain: normalize_domain(&value.domain),
            severity: value.severity,
            public_comment: value.public_comment.or(value.comment).filter(|c| !c.is_empty()),
            private_comment: value.private_comment.filter(|c| !c.is_empty()),
            reject_media: value.reject_media,
            reject_reports: value.reject_reports,
            obfuscate: value.obfuscate,
        }
    }
}
