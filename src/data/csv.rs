//! CSV format dataset implementation
//!
//! Supports loading datasets from CSV files where:
//! - The last column is the label (or regression target)
//! - All other columns are features
//! - First row can be headers (automatically detected)

use crate::core::{Dataset, MKLError, Result, Sample, SparseVector};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Dataset implementation for CSV format files
#[derive(Debug, Clone)]
pub struct CSVDataset {
    samples: Vec<Sample>,
    dimensions: usize,
}

impl CSVDataset {
    /// Load a dataset from a CSV file
    ///
    /// The last column is assumed to be the label.
    /// Headers are automatically detected if present.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load a dataset from a reader, detecting a header row
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::from_reader_with_options(reader, true)
    }

    /// Load a dataset from a reader with explicit header option
    pub fn from_reader_with_options<R: BufRead>(
        reader: R,
        auto_detect_header: bool,
    ) -> Result<Self> {
        let mut samples = Vec::new();
        let mut dimensions = 0;
        let mut first_data_line = true;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if first_data_line {
                first_data_line = false;
                if auto_detect_header && Self::is_header_line(line) {
                    continue;
                }
            }

            let (sample, n_columns) = Self::parse_data_line(line)
                .map_err(|e| MKLError::Parse(format!("line {}: {e}", line_num + 1)))?;
            dimensions = dimensions.max(n_columns);
            samples.push(sample);
        }

        if samples.is_empty() {
            return Err(MKLError::EmptyDataset);
        }

        Ok(CSVDataset {
            samples,
            dimensions,
        })
    }

    /// Check if a line appears to be a header
    fn is_header_line(line: &str) -> bool {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 2 {
            return false;
        }

        // Most feature columns non-numeric
        let non_numeric = fields
            .iter()
            .take(fields.len() - 1)
            .filter(|field| field.trim().parse::<f64>().is_err())
            .count();
        non_numeric > fields.len() / 2
    }

    /// Parse a CSV data line into a sample and its feature column count
    fn parse_data_line(line: &str) -> Result<(Sample, usize)> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let Some((label_str, features)) = fields.split_last().filter(|(_, f)| !f.is_empty()) else {
            return Err(MKLError::Parse(format!("too few fields: {line}")));
        };

        let label = label_str
            .parse::<f64>()
            .map_err(|_| MKLError::Parse(format!("invalid label: {label_str}")))?;
        if !label.is_finite() {
            return Err(MKLError::InvalidLabel(label));
        }

        // Zeros are left out of the sparse representation
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (idx, field) in features.iter().enumerate() {
            let value = field.parse::<f64>().map_err(|_| {
                MKLError::Parse(format!("invalid feature value at column {}: {field}", idx + 1))
            })?;
            if value != 0.0 {
                indices.push(idx);
                values.push(value);
            }
        }

        Ok((
            Sample::new(SparseVector::new(indices, values), label),
            features.len(),
        ))
    }
}

impl Dataset for CSVDataset {
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
    fn test_csv_basic() {
        let dataset = CSVDataset::from_reader(Cursor::new("1.0,2.0,1\n3.0,4.0,-1\n")).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.dim(), 2);

        let sample = dataset.get_sample(1);
        assert_eq!(sample.label, -1.0);
        assert_eq!(sample.features.indices, vec![0, 1]);
        assert_eq!(sample.features.values, vec![3.0, 4.0]);
    }

    #[test]
    fn test_csv_with_headers_and_comments() {
        let data = "# exported\nfeature1,feature2,target\n1.0,2.0,0.5\n\n3.0,4.0,-2.5\n";
        let dataset = CSVDataset::from_reader(Cursor::new(data)).unwrap();

        assert_eq!(dataset.len(), 2);
        // Regression targets are not rounded to classes
        assert_eq!(dataset.get_labels(), vec![0.5, -2.5]);
    }

    #[test]
    fn test_csv_sparse_features() {
        let dataset =
            CSVDataset::from_reader(Cursor::new("1.0,0.0,2.0,1\n0.0,0.0,0.0,2\n")).unwrap();

        let sample = dataset.get_sample(0);
        assert_eq!(sample.features.indices, vec![0, 2]);
        assert_eq!(sample.features.values, vec![1.0, 2.0]);

        // All-zero rows still count their columns
        assert!(dataset.get_sample(1).features.is_empty());
        assert_eq!(dataset.dim(), 3);
    }

    #[test]
    fn test_csv_invalid_format() {
        assert!(CSVDataset::from_reader(Cursor::new("1.0\n")).is_err());
        assert!(CSVDataset::from_reader(Cursor::new("1.0,2.0,1\n1.0,abc,-1\n")).is_err());
        assert!(matches!(
            CSVDataset::from_reader(Cursor::new("\n# nothing\n")),
            Err(MKLError::EmptyDataset)
        ));
    }

    #[test]
    fn test_csv_manual_header_control() {
        let data = "x1,x2,y\n1.0,2.0,1\n";
        assert_eq!(CSVDataset::from_reader(Cursor::new(data)).unwrap().len(), 1);
        // Without detection the header is parsed as data and rejected
        assert!(CSVDataset::from_reader_with_options(Cursor::new(data), false).is_err());
    }

    #[test]
    fn test_is_header_line() {
        assert!(CSVDataset::is_header_line("feature1,feature2,label"));
        assert!(CSVDataset::is_header_line("x1,x2,x3,y"));
        assert!(!CSVDataset::is_header_line("1.0,2.0,3.0,1"));
        assert!(!CSVDataset::is_header_line("1"));
    }
}
