//! Data loading and dataset implementations

pub mod csv;
pub mod libsvm;

pub use self::csv::CSVDataset;
pub use self::libsvm::LibSVMDataset;

use crate::core::{Dataset, MKLError, Result};
use log::warn;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// On-disk sample formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    LibSVM,
    CSV,
}

impl DataFormat {
    /// Guess the format from the file extension, LibSVM when unsure
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => DataFormat::CSV,
            Some("libsvm") | Some("svm") | Some("txt") => DataFormat::LibSVM,
            Some(_) => {
                warn!("Unknown file extension, assuming LibSVM format");
                DataFormat::LibSVM
            }
            None => {
                warn!("No file extension, assuming LibSVM format");
                DataFormat::LibSVM
            }
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::LibSVM => f.write_str("libsvm"),
            DataFormat::CSV => f.write_str("csv"),
        }
    }
}

impl FromStr for DataFormat {
    type Err = MKLError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "libsvm" | "svm" => Ok(DataFormat::LibSVM),
            "csv" => Ok(DataFormat::CSV),
            other => Err(MKLError::Parse(format!(
                "unsupported format '{other}', use 'libsvm' or 'csv'"
            ))),
        }
    }
}

/// Load a dataset in the given format, or the one detected from its path
pub fn load_dataset<P: AsRef<Path>>(
    path: P,
    format: Option<DataFormat>,
) -> Result<Box<dyn Dataset>> {
    let path = path.as_ref();
    match format.unwrap_or_else(|| DataFormat::detect(path)) {
        DataFormat::CSV => Ok(Box::new(CSVDataset::from_file(path)?)),
        DataFormat::LibSVM => Ok(Box::new(LibSVMDataset::from_file(path)?)),
    }
}
