use std::borrow::Cow;
use std::io::Write;

use itertools::Itertools;
use log::{debug, warn};

use crate::encoder::{
    EncoderState, EncodingContext, FeatureEncoder, FeatureRecord, PropertyValue, StreamMetadata,
};
use crate::error::{EncodingError, Result};

/// Options for the CSV encoder.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Write a header row with the column names.
    pub header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self { header: true }
    }
}

/// Replace every run of line breaks with a single space.
fn collapse_line_breaks(value: &str) -> Cow<'_, str> {
    if !value.contains(['\n', '\r']) {
        return Cow::Borrowed(value);
    }
    let mut collapsed = String::with_capacity(value.len());
    let mut in_break = false;
    for c in value.chars() {
        if c == '\n' || c == '\r' {
            if !in_break {
                collapsed.push(' ');
            }
            in_break = true;
        } else {
            collapsed.push(c);
            in_break = false;
        }
    }
    Cow::Owned(collapsed)
}

/// Escape one field: line breaks are collapsed, then the value is quoted if it contains a
/// comma or a quote character.
pub(crate) fn escape_value(value: &str) -> Cow<'_, str> {
    let value = collapse_line_breaks(value);
    if value.contains([',', '"', '\'']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        value
    }
}

fn format_value(column: &str, value: &PropertyValue) -> Result<String> {
    match value {
        PropertyValue::Float(f) if !f.is_finite() => Err(EncodingError::ColumnTypeMismatch {
            column: column.to_string(),
            expected: "finite number",
            found: f.to_string(),
        }),
        value => Ok(escape_value(&value.to_string()).into_owned()),
    }
}

/// Streams features as comma-separated rows.
///
/// Geometries are not written. Object and array properties that were not flattened have no
/// column.
pub struct CsvEncoder<'a, W: Write> {
    context: &'a EncodingContext,
    options: CsvOptions,
    writer: W,
    columns: Vec<String>,
    state: EncoderState,
    written: u64,
    skipped: u64,
}

impl<'a, W: Write> CsvEncoder<'a, W> {
    pub fn new(context: &'a EncodingContext, writer: W) -> Self {
        Self::with_options(context, writer, Default::default())
    }

    pub fn with_options(context: &'a EncodingContext, writer: W, options: CsvOptions) -> Self {
        let columns = context
            .schema()
            .properties()
            .iter()
            .filter(|p| p.is_value() && context.includes(p))
            .map(|p| p.name().to_string())
            .collect();
        Self {
            context,
            options,
            writer,
            columns,
            state: EncoderState::default(),
            written: 0,
            skipped: 0,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn written_features(&self) -> u64 {
        self.written
    }

    pub fn skipped_features(&self) -> u64 {
        self.skipped
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn format_row(&self, record: &FeatureRecord) -> Result<String> {
        let fields = self
            .columns
            .iter()
            .map(|column| match record.get(column) {
                Some(value) => format_value(column, value),
                None => Ok(String::new()),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{}\n", fields.iter().join(",")))
    }
}

impl<W: Write> FeatureEncoder for CsvEncoder<'_, W> {
    type Feature = FeatureRecord;

    fn on_start(&mut self, _metadata: &StreamMetadata) -> Result<()> {
        self.state.start()?;
        if self.options.header {
            let header = self.columns.iter().map(|c| escape_value(c)).join(",");
            writeln!(self.writer, "{header}")?;
        }
        Ok(())
    }

    fn on_feature(&mut self, feature: &FeatureRecord) -> Result<()> {
        self.state.check_feature()?;
        match self.format_row(feature) {
            Ok(row) => {
                self.writer.write_all(row.as_bytes())?;
                self.written += 1;
            }
            Err(err) => {
                warn!(
                    "skipping feature '{}' of collection '{}': {err}",
                    feature.id().unwrap_or_default(),
                    self.context.collection_id()
                );
                self.skipped += 1;
            }
        }
        Ok(())
    }

    fn on_end(&mut self, _metadata: &StreamMetadata) -> Result<()> {
        self.state.end()?;
        self.writer.flush()?;
        debug!(
            "finished CSV stream for '{}': {} written, {} skipped",
            self.context.collection_id(),
            self.written,
            self.skipped
        );
        Ok(())
    }
}
