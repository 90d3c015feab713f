use crate::error::{Result, PrepError};
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

pub const CHARACTERISTIC_ID: &str = "CHARACTERISTIC_ID";
pub const CHARACTERISTIC_NAME: &str = "CHARACTERISTIC_NAME";

/// Geographic level carrying the country-wide aggregates.
pub const GEO_LEVEL_COUNTRY: &str = "Country";
/// Geographic level the map renders, one value per dissemination area.
pub const GEO_LEVEL_DISSEMINATION_AREA: &str = "Dissemination area";

/// One record of a census characteristic export. Only the columns the
/// pipeline consumes are mapped; the exports carry many more.
#[derive(Debug, Clone, Deserialize)]
pub struct CensusRow {
    #[serde(rename = "CHARACTERISTIC_ID")]
    pub characteristic_id: u32,
    #[serde(rename = "CHARACTERISTIC_NAME")]
    pub characteristic_name: String,
    #[serde(rename = "GEO_LEVEL", default)]
    pub geo_level: String,
    #[serde(rename = "C1_COUNT_TOTAL", default)]
    pub c1_count_total: String,
    #[serde(rename = "DGUID", default)]
    pub dguid: String,
}

impl CensusRow {
    /// Leading-whitespace count of the name field, encoding hierarchy depth.
    pub fn indentation(&self) -> usize {
        self.characteristic_name
            .chars()
            .take_while(|c| c.is_whitespace())
            .count()
    }

    pub fn trimmed_name(&self) -> &str {
        self.characteristic_name.trim()
    }

    /// Count total as a number. StatCan exports use suppression markers
    /// ("x", "..", "F") and blanks in this column; those read as `None`.
    pub fn count_total(&self) -> Option<f64> {
        self.c1_count_total.trim().parse().ok()
    }
}

/// Census characteristic CSV reader. The exports are latin-1 encoded, so
/// decoding happens here before the bytes reach the CSV parser.
pub struct CensusReader {
    reader: csv::Reader<DecodeReaderBytes<File, Vec<u8>>>,
}

impl std::fmt::Debug for CensusReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CensusReader").finish_non_exhaustive()
    }
}

impl CensusReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let transcoded = DecodeReaderBytesBuilder::new()
            .encoding(Some(encoding_rs::WINDOWS_1252))
            .build(file);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(transcoded);

        let headers = reader.headers()?.clone();
        for required in [CHARACTERISTIC_ID, CHARACTERISTIC_NAME] {
            if !headers.iter().any(|h| h == required) {
                return Err(PrepError::MissingColumn(required.to_string()));
            }
        }

        Ok(Self { reader })
    }

    pub fn rows(&mut self) -> impl Iterator<Item = Result<CensusRow>> + '_ {
        self.reader
            .deserialize::<CensusRow>()
            .map(|row| row.map_err(Into::into))
    }
}
