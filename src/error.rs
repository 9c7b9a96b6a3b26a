/// Errors produced while loading, merging and writing blocklists.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid mergeplan '{0}', expected 'max' or 'min'")]
    InvalidMergePlan(String),

    /// The pairwise reducer was handed records for two different domains.
    #[error("cannot merge blocks for different domains: '{left}' and '{right}'")]
    DomainMismatch { left: String, right: String },

    #[error("unknown severity '{0}'")]
    UnknownSeverity(String),

    #[error("unknown blocklist format '{0}'")]
    UnknownFormat(String),

    #[error("'{0}' cannot be used as an output format, expected 'csv' or 'json'")]
    UnsupportedExportFormat(String),

    #[error("invalid value '{value}' for {field}, expected true/false, 1/0 or yes/no")]
    InvalidFlag { field: String, value: String },

    #[error("unknown domain block field '{0}'")]
    UnknownField(String),

    #[error("csv error in {origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn csv(origin: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            origin: origin.into(),
            source,
        }
    }
}
