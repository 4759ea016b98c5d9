//! Rewriting of coordinate text in coordinate-bearing elements.

use log::warn;

use crate::crs::CrsTransformer;
use crate::error::{EncodingError, Result};

/// Separators of a coordinate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatesFormat {
    /// Between the values of one tuple.
    pub coordinate_separator: char,

    /// Between tuples.
    pub tuple_separator: char,
}

impl CoordinatesFormat {
    /// `gml:coordinates` style: `1,2 3,4`.
    pub fn comma_separated() -> Self {
        Self {
            coordinate_separator: ',',
            tuple_separator: ' ',
        }
    }

    /// `gml:pos` and `gml:posList` style: `1 2 3 4`.
    pub fn space_separated() -> Self {
        Self {
            coordinate_separator: ' ',
            tuple_separator: ' ',
        }
    }

    pub fn for_element(local_name: &str) -> Self {
        if local_name == "coordinates" {
            Self::comma_separated()
        } else {
            Self::space_separated()
        }
    }
}

/// Streaming rewriter of coordinate text.
///
/// Text may arrive in arbitrary chunks; a number split across two chunks is joined before it
/// is parsed. Every complete tuple is optionally reprojected and written with the output
/// dimension.
#[derive(Debug)]
pub(crate) struct CoordinatesWriter<'a> {
    format: CoordinatesFormat,
    transformer: Option<&'a dyn CrsTransformer>,
    input_dimension: usize,
    output_dimension: usize,
    precision: Option<usize>,
    token: String,
    tuple: Vec<f64>,
    tuples: usize,
}

impl<'a> CoordinatesWriter<'a> {
    pub(crate) fn new(
        format: CoordinatesFormat,
        transformer: Option<&'a dyn CrsTransformer>,
        input_dimension: usize,
        output_dimension: Option<usize>,
        precision: Option<usize>,
    ) -> Self {
        if input_dimension < 2 {
            warn!("srsDimension {input_dimension} is below 2, reading coordinates as 2D");
        }
        let input_dimension = input_dimension.max(2);
        Self {
            format,
            transformer,
            input_dimension,
            output_dimension: output_dimension.unwrap_or(input_dimension),
            precision,
            token: String::new(),
            tuple: Vec::with_capacity(input_dimension),
            tuples: 0,
        }
    }

    /// Consume a chunk of coordinate text, appending finished tuples to `out`.
    pub(crate) fn write(&mut self, text: &str, out: &mut String) -> Result<()> {
        for c in text.chars() {
            if c.is_whitespace() || c == ',' {
                self.end_token(out)?;
            } else {
                self.token.push(c);
            }
        }
        Ok(())
    }

    /// Flush the last token. An incomplete trailing tuple is dropped.
    pub(crate) fn finish(&mut self, out: &mut String) -> Result<()> {
        self.end_token(out)?;
        if !self.tuple.is_empty() {
            warn!(
                "dropping incomplete coordinate tuple of {} values, expected {}",
                self.tuple.len(),
                self.input_dimension
            );
            self.tuple.clear();
        }
        Ok(())
    }

    fn end_token(&mut self, out: &mut String) -> Result<()> {
        if self.token.is_empty() {
            return Ok(());
        }
        let value = self.token.parse::<f64>().map_err(|_| {
            EncodingError::Markup(format!("invalid coordinate value '{}'", self.token))
        })?;
        self.token.clear();
        self.tuple.push(value);
        if self.tuple.len() == self.input_dimension {
            self.write_tuple(out)?;
        }
        Ok(())
    }

    fn write_tuple(&mut self, out: &mut String) -> Result<()> {
        if let Some(transformer) = self.transformer {
            let n = self.tuple.len().min(3);
            transformer.transform(&mut self.tuple[..n])?;
        }
        self.tuple.resize(self.output_dimension, 0.0);

        if self.tuples > 0 {
            out.push(self.format.tuple_separator);
        }
        for (i, value) in self.tuple.iter().enumerate() {
            if i > 0 {
                out.push(self.format.coordinate_separator);
            }
            match self.precision {
                Some(precision) => out.push_str(&format!("{value:.precision$}")),
                None => out.push_str(&value.to_string()),
            }
        }
        self.tuple.clear();
        self.tuples += 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::crs::OffsetTransformer;

    fn rewrite(writer: &mut CoordinatesWriter, chunks: &[&str]) -> String {
        let mut out = String::new();
        for chunk in chunks {
            writer.write(chunk, &mut out).unwrap();
        }
        writer.finish(&mut out).unwrap();
        out
    }

    #[test]
    fn pos_list_passthrough() {
        let mut writer =
            CoordinatesWriter::new(CoordinatesFormat::space_separated(), None, 2, None, None);
        assert_eq!(rewrite(&mut writer, &["1 2 3.5 4"]), "1 2 3.5 4");
    }

    #[test]
    fn numbers_split_across_chunks() {
        let mut writer =
            CoordinatesWriter::new(CoordinatesFormat::space_separated(), None, 2, None, None);
        assert_eq!(rewrite(&mut writer, &["1 2 ", "3 4"]), "1 2 3 4");

        let mut writer =
            CoordinatesWriter::new(CoordinatesFormat::space_separated(), None, 2, None, None);
        assert_eq!(rewrite(&mut writer, &["10.", "25 7"]), "10.25 7");
    }

    #[test]
    fn comma_separated_tuples() {
        let mut writer =
            CoordinatesWriter::new(CoordinatesFormat::comma_separated(), None, 2, None, None);
        assert_eq!(rewrite(&mut writer, &["1,2 3,4"]), "1,2 3,4");
    }

    #[test]
    fn reprojection_and_dimension_override() {
        let transformer = OffsetTransformer::new(10.0, 20.0);
        let mut writer = CoordinatesWriter::new(
            CoordinatesFormat::space_separated(),
            Some(&transformer),
            3,
            Some(2),
            None,
        );
        assert_eq!(rewrite(&mut writer, &["1 2 3 4 5 6"]), "11 22 14 25");
    }

    #[test]
    fn dimension_below_two_reads_pairs() {
        let transformer = OffsetTransformer::new(10.0, 20.0);
        for dimension in [0, 1] {
            let mut writer = CoordinatesWriter::new(
                CoordinatesFormat::space_separated(),
                Some(&transformer),
                dimension,
                None,
                None,
            );
            assert_eq!(rewrite(&mut writer, &["5 6 7 8"]), "15 26 17 28");
        }
    }

    #[test]
    fn precision() {
        let mut writer = CoordinatesWriter::new(
            CoordinatesFormat::space_separated(),
            None,
            2,
            None,
            Some(2),
        );
        assert_eq!(rewrite(&mut writer, &["1.23456 7"]), "1.23 7.00");
    }

    #[test]
    fn incomplete_tuple_is_dropped() {
        let mut writer =
            CoordinatesWriter::new(CoordinatesFormat::space_separated(), None, 2, None, None);
        assert_eq!(rewrite(&mut writer, &["1 2 3"]), "1 2");
    }

    #[test]
    fn invalid_number_is_fatal() {
        let mut writer =
            CoordinatesWriter::new(CoordinatesFormat::space_separated(), None, 2, None, None);
        let mut out = String::new();
        let err = writer.write("1 abc ", &mut out).unwrap_err();
        assert!(err.is_fatal());
    }
}
