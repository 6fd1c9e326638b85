//! LibSVM format dataset implementation
//!
//! Supports loading datasets in the libsvm format:
//! label index:value index:value ...
//!
//! Example:
//! 2 1:0.5 3:1.2 7:0.8
//! 0.75 2:0.3 5:2.1
//!
//! Labels are kept as written: class labels for classification, real
//! targets for regression. Indices are 1-based in the file and 0-based in
//! memory.

use crate::core::{Dataset, MKLError, Result, Sample, SparseVector};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Dataset implementation for LibSVM format files
#[derive(Debug, Clone)]
pub struct LibSVMDataset {
    samples: Vec<Sample>,
    dimensions: usize,
}

impl LibSVMDataset {
    /// Load a dataset from a LibSVM format file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load a dataset from a reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut samples = Vec::new();
        let mut dimensions = 0;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let sample = Self::parse_line(line)
                .map_err(|e| MKLError::Parse(format!("line {}: {e}", line_num + 1)))?;
            dimensions = dimensions.max(sample.features.dim());
            samples.push(sample);
        }

        if samples.is_empty() {
            return Err(MKLError::EmptyDataset);
        }

        Ok(LibSVMDataset {
            samples,
            dimensions,
        })
    }

    /// Parse a single line in libsvm format
    fn parse_line(line: &str) -> Result<Sample> {
        let mut parts = line.split_whitespace();
        let label_str = parts
            .next()
            .ok_or_else(|| MKLError::Parse("empty line".to_string()))?;
        let label = label_str
            .trim_start_matches('+')
            .parse::<f64>()
            .map_err(|_| MKLError::Parse(format!("invalid label: {label_str}")))?;
        if !label.is_finite() {
            return Err(MKLError::InvalidLabel(label));
        }

        let mut indices = Vec::new();
        let mut values = Vec::new();
        for feature in parts {
            let (index, value) = feature
                .split_once(':')
                .ok_or_else(|| MKLError::Parse(format!("invalid feature format: {feature}")))?;
            let index = index
                .parse::<usize>()
                .map_err(|_| MKLError::Parse(format!("invalid feature index: {index}")))?;
            let value = value
                .parse::<f64>()
                .map_err(|_| MKLError::Parse(format!("invalid feature value: {value}")))?;
            if index == 0 {
                return Err(MKLError::Parse(
                    "feature indices are 1-based, got 0".to_string(),
                ));
            }
            indices.push(index - 1);
            values.push(value);
        }

        Ok(Sample::new(SparseVector::new(indices, values), label))
    }

    /// Write samples in LibSVM format
    pub fn write<W: Write>(samples: &[Sample], mut writer: W) -> Result<()> {
        for sample in samples {
            write!(writer, "{}", sample.label)?;
            for (&i, &v) in sample.features.indices.iter().zip(&sample.features.values) {
                write!(writer, " {}:{}", i + 1, v)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

impl Dataset for LibSVMDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn dim(&self) -> usize {
        self.dimensions
    }

    fn get_sample(&self, i: usize) -> Sample {
        self.samples[i].clone()
    }

    fn get_labels(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_line_basic() {
        let sample = LibSVMDataset::parse_line("+1 1:0.5 3:1.2").unwrap();

        assert_eq!(sample.label, 1.0);
        assert_eq!(sample.features.indices, vec![0, 2]); // 1-based to 0-based
        assert_eq!(sample.features.values, vec![0.5, 1.2]);
    }

    #[test]
    fn test_labels_are_kept() {
        assert_eq!(LibSVMDataset::parse_line("2 1:1.0").unwrap().label, 2.0);
        assert_eq!(LibSVMDataset::parse_line("-3.5 1:1.0").unwrap().label, -3.5);
        assert_eq!(LibSVMDataset::parse_line("0").unwrap().label, 0.0);
    }

    #[test]
    fn test_parse_line_invalid_format() {
        assert!(LibSVMDataset::parse_line("+1 1").is_err());
        assert!(LibSVMDataset::parse_line("+1 abc:1.0").is_err());
        assert!(LibSVMDataset::parse_line("+1 1:abc").is_err());
        // Zero index (libsvm is 1-based)
        assert!(LibSVMDataset::parse_line("+1 0:1.0").is_err());
        assert!(matches!(
            LibSVMDataset::parse_line("nan 1:1.0"),
            Err(MKLError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_from_reader_empty_lines_and_comments() {
        let data = "# Comment line\n1 1:0.5\n\n# Another comment\n0 2:0.3 5:2.1\n";
        let dataset = LibSVMDataset::from_reader(Cursor::new(data)).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.dim(), 5);
        assert_eq!(dataset.get_labels(), vec![1.0, 0.0]);
        assert_eq!(dataset.features()[1].indices, vec![1, 4]);
    }

    #[test]
    fn test_from_reader_empty_dataset() {
        let result = LibSVMDataset::from_reader(Cursor::new("# Only comments\n\n"));
        assert!(matches!(result, Err(MKLError::EmptyDataset)));
    }

    #[test]
    fn test_parse_error_reports_line() {
        match LibSVMDataset::from_reader(Cursor::new("1 1:0.5\n1 x\n")) {
            Err(MKLError::Parse(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_write_then_read() {
        let samples = vec![
            Sample::new(SparseVector::new(vec![0, 999], vec![1.0, 2.0]), 1.0),
            Sample::new(SparseVector::new(vec![4], vec![-0.5]), 0.25),
        ];
        let mut buffer = Vec::new();
        LibSVMDataset::write(&samples, &mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer.clone()).unwrap(), "1 1:1 1000:2\n0.25 5:-0.5\n");

        let dataset = LibSVMDataset::from_reader(Cursor::new(buffer)).unwrap();
        assert_eq!(dataset.dim(), 1000);
        assert_eq!(dataset.get_sample(1), samples[1]);
    }

    #[test]
    fn test_from_file_io_error() {
        let result = LibSVMDataset::from_file("/non/existent/file.libsvm");
        assert!(matches!(result, Err(MKLError::Io(_))));
    }
}
