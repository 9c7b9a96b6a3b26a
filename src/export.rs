use std::io::Write;

use serde_json::{Map, Value};

use crate::{
    block::{DomainBlock, Field},
    error::{Error, Result},
    merge::Blocklist,
    parse::SourceFormat,
};

/// Fields written when the config doesn't name any.
pub const DEFAULT_EXPORT_FIELDS: [Field; 2] = [Field::Domain, Field::Severity];

/// Fails for formats that can only be read, such as the public instance API response.
pub fn check_export_format(format: SourceFormat) -> Result<()> {
    match format {
        SourceFormat::Csv | SourceFormat::Json => Ok(()),
        SourceFormat::Mastodon => Err(Error::UnsupportedExportFormat(format.to_string())),
    }
}

/// Writes the merged blocklist in insertion order.
///
/// Only `export_fields` are written; `domain` always comes first. CSV headers
/// carry a `#` prefix, the layout Mastodon's admin domain block import reads.
pub fn write_blocklist<W: Write>(
    writer: W,
    blocklist: &Blocklist,
    format: SourceFormat,
    export_fields: &[Field],
) -> Result<()> {
    let fields = export_columns(export_fields);

    match format {
        SourceFormat::Csv => write_csv(writer, blocklist, &fields),
        SourceFormat::Mastodon => Err(Error::UnsupportedExportFormat(format.to_string())),
        SourceFormat::Json => {
            let rows = blocklist
                .iter()
                .map(|b| {
                    fields
                        .iter()
                        .map(|&f| (f.as_str().to_string(), json_value(b, f)))
                        .collect::<Map<_, _>>()
                })
                .collect::<Vec<_>>();
            serde_json::to_writer_pretty(writer, &rows)?;
            Ok(())
        }
    }
}

pub(crate) fn export_columns(export_fields: &[Field]) -> Vec<Field> {
    let mut fields = vec![Field::Domain];
    for &field in export_fields {
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    fields
}

fn write_csv<W: Write>(writer: W, blocklist: &Blocklist, fields: &[Field]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer
        .write_record(fields.iter().map(|f| format!("#{f}")))
        .map_err(|e| Error::csv("export", e))?;

    for block in blocklist {
        writer
            .write_record(fields.iter().map(|&f| csv_value(block, f)))
            .map_err(|e| Error::csv("export", e))?;
    }

    writer.flush()?;
    Ok(())
}

fn csv_value(block: &DomainBlock, field: Field) -> String {
    match field {
        Field::Domain => block.domain.clone(),
        Field::Severity => block.severity.to_string(),
        Field::PublicComment => block.public_comment.clone().unwrap_or_default(),
        Field::PrivateComment => block.private_comment.clone().unwrap_or_default(),
        Field::RejectMedia => block.reject_media.to_string(),
        Field::RejectReports => block.reject_reports.to_string(),
        Field::Obfuscate => block.obfuscate.to_string(),
    }
}

pub(crate) fn json_value(block: &DomainBlock, field: Field) -> Value {
    match field {
        Field::Domain => Value::from(block.domain.as_str()),
        Field::Severity => Value::from(block.severity.as_str()),
        Field::PublicComment => Value::from(block.public_comment.clone().unwrap_or_default()),
        Field::PrivateComment => Value::from(block.private_comment.clone().unwrap_or_default()),
        Field::RejectMedia => Value::from(block.reject_media),
        Field::RejectReports => Value::from(block.reject_reports),
        Field::Obfuscate => Value::from(block.obfuscate),
    }
}
