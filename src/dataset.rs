//! Dataset loading and schema validation.
//!
//! The input is a CSV file with a header row. Each data row describes one
//! city page. Before any page is generated the header is checked against the
//! column contract the page template relies on:
//!
//! ```text
//! City, State, Latitude, Longitude, Introduction, CityIntro,
//! ResidentialContent, CommercialContent, IndustrialContent, AgriculturalContent
//! ```
//!
//! A dataset missing any of these is rejected as a whole with a
//! [`SchemaError`] listing every missing column. Extra columns are ignored.
//!
//! Rows are decoded once into the typed [`Record`] structure. Cell *values*
//! are not interpreted here: coordinates stay as text and are parsed by the
//! composer, so a single bad cell fails only its own page. The same holds
//! for the row's shape:
//!
//! - a short row reads its missing trailing cells as empty strings
//! - a cell that is not valid UTF-8 is decoded lossily and the record
//!   remembers the column, which the composer turns into a per-record error
//!
//! Only a bad header rejects the dataset.

use crate::sections::Section;
use crate::types::RecordId;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Columns the page template needs, in reporting order.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "City",
    "State",
    "Latitude",
    "Longitude",
    "Introduction",
    "CityIntro",
    "ResidentialContent",
    "CommercialContent",
    "IndustrialContent",
    "AgriculturalContent",
];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("cannot open dataset {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("row {row} is malformed: {source}")]
    Row { row: usize, source: csv::Error },
}

/// The dataset header lacks columns the template requires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing required columns: {}", .missing.join(", "))]
pub struct SchemaError {
    /// Every missing column, in [`REQUIRED_COLUMNS`] order.
    pub missing: Vec<String>,
}

/// One dataset row.
#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    /// 1-based data row number, assigned after decoding.
    #[serde(skip)]
    pub row: usize,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Latitude")]
    pub latitude: String,
    #[serde(rename = "Longitude")]
    pub longitude: String,
    #[serde(rename = "Introduction")]
    pub introduction: String,
    #[serde(rename = "CityIntro")]
    pub city_intro: String,
    #[serde(rename = "ResidentialContent")]
    pub residential_content: String,
    #[serde(rename = "CommercialContent")]
    pub commercial_content: String,
    #[serde(rename = "IndustrialContent")]
    pub industrial_content: String,
    #[serde(rename = "AgriculturalContent")]
    pub agricultural_content: String,
    /// Column of the first cell that was not valid UTF-8.
    #[serde(skip)]
    pub undecodable: Option<String>,
}

impl Record {
    pub fn id(&self) -> RecordId {
        RecordId {
            row: self.row,
            city: self.city.clone(),
            state: self.state.clone(),
        }
    }

    /// The row's own text for `section`. Empty cells come back as `""`.
    pub fn dynamic_content(&self, section: Section) -> &str {
        match section {
            Section::Residential => &self.residential_content,
            Section::Commercial => &self.commercial_content,
            Section::Industrial => &self.industrial_content,
            Section::Agricultural => &self.agricultural_content,
        }
    }
}

/// A schema-checked dataset, rows in file order.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Check that every required column is present.
pub fn validate_columns<S: AsRef<str>>(columns: &[S]) -> Result<(), SchemaError> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.iter().any(|c| c.as_ref() == **required))
        .map(|c| c.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError { missing })
    }
}

/// Parse and validate CSV data from any reader.
pub fn read_dataset<R: Read>(reader: R) -> Result<Dataset, DatasetError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns: Vec<String> = headers.iter().map(str::to_string).collect();
    validate_columns(&columns)?;

    let mut records = Vec::new();
    for (idx, result) in rdr.byte_records().enumerate() {
        let row = idx + 1;
        let raw = result.map_err(|source| DatasetError::Row { row, source })?;
        let (mut cells, undecodable) = match csv::StringRecord::from_byte_record(raw) {
            Ok(cells) => (cells, None),
            Err(err) => {
                let field = err.utf8_error().field();
                let column = columns
                    .get(field)
                    .cloned()
                    .unwrap_or_else(|| format!("column {}", field + 1));
                tracing::warn!(row, column = %column, "cell is not valid UTF-8");
                let cells = csv::StringRecord::from_byte_record_lossy(err.into_byte_record());
                (cells, Some(column))
            }
        };
        while cells.len() < headers.len() {
            cells.push_field("");
        }
        let mut record: Record = cells
            .deserialize(Some(&headers))
            .map_err(|source| DatasetError::Row { row, source })?;
        record.row = row;
        record.undecodable = undecodable;
        records.push(record);
    }

    Ok(Dataset { columns, records })
}

/// Load the dataset at `path`.
pub fn load_dataset(path: &Path) -> Result<Dataset, DatasetError> {
    tracing::info!(path = %path.display(), "reading dataset");
    let file = File::open(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    match read_dataset(file) {
        Ok(dataset) => {
            tracing::info!(rows = dataset.len(), "dataset loaded");
            Ok(dataset)
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "dataset rejected");
            Err(e)
        }
    }
}
