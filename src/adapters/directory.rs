//! Port directory: reference metadata keyed by port code.
//!
//! Rows are validated at the boundary. Blank or unparseable coordinates become
//! `None` and are never read as zero. Headers may use either the English names
//! or the customs code-table names (`COD_PUERTO`, `NOMBRE_PUERTO`, ...).

use crate::domain::model::{Coordinates, DirectoryEntry, PortCode};
use crate::utils::error::{RerouteError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawDirectoryRecord {
    #[serde(alias = "COD_PUERTO")]
    code: String,
    #[serde(alias = "NOMBRE_PUERTO", default)]
    name: Option<String>,
    #[serde(alias = "PAIS", default)]
    country: Option<String>,
    #[serde(alias = "TIPO_PUERTO", default)]
    port_type: Option<String>,
    #[serde(alias = "LATITUD", default)]
    latitude: Option<String>,
    #[serde(alias = "LONGITUD", default)]
    longitude: Option<String>,
}

#[derive(Debug, Serialize)]
struct DirectoryRecord<'a> {
    code: u32,
    name: &'a str,
    country: &'a str,
    port_type: Option<&'a str>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortDirectory {
    entries: BTreeMap<PortCode, DirectoryEntry>,
    rejected_rows: usize,
}

impl PortDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I: IntoIterator<Item = DirectoryEntry>>(entries: I) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.code, e)).collect(),
            rejected_rows: 0,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let directory = Self::from_reader(file)?;
        tracing::info!(
            "Loaded {} port(s) from directory {}",
            directory.len(),
            path.as_ref().display()
        );
        Ok(directory)
    }

    /// A missing file yields an empty directory so ranking can still run on
    /// graph connectivity alone.
    pub fn from_path_or_empty<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::from_path(path.as_ref()) {
            Err(RerouteError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Port directory {} not found; ports will have no metadata",
                    path.as_ref().display()
                );
                Ok(Self::new())
            }
            other => other,
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut directory = Self::new();
        for (index, row) in csv_reader.deserialize::<RawDirectoryRecord>().enumerate() {
            // Header is line 1.
            let line = index as u64 + 2;
            let parsed = row
                .map_err(|e| e.to_string())
                .and_then(parse_record);
            match parsed {
                Ok(entry) => {
                    directory.entries.insert(entry.code, entry);
                }
                Err(reason) => {
                    tracing::warn!("Skipping directory row at line {}: {}", line, reason);
                    directory.rejected_rows += 1;
                }
            }
        }
        Ok(directory)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for entry in self.entries.values() {
            csv_writer.serialize(DirectoryRecord {
                code: entry.code.value(),
                name: &entry.name,
                country: &entry.country,
                port_type: entry.port_type.as_deref(),
                latitude: entry.coordinates.map(|c| c.latitude),
                longitude: entry.coordinates.map(|c| c.longitude),
            })?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Writes the directory back to `path`, e.g. after geocoding.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path.as_ref())?;
        self.write_to(std::io::BufWriter::new(file))?;
        tracing::info!("Saved port directory to {}", path.as_ref().display());
        Ok(())
    }

    pub fn get(&self, code: PortCode) -> Option<&DirectoryEntry> {
        self.entries.get(&code)
    }

    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rejected_rows(&self) -> usize {
        self.rejected_rows
    }

    /// Returns `false` if `code` has no entry.
    pub fn set_coordinates(&mut self, code: PortCode, coordinates: Coordinates) -> bool {
        match self.entries.get_mut(&code) {
            Some(entry) => {
                entry.coordinates = Some(coordinates);
                true
            }
            None => false,
        }
    }
}

impl<'a> IntoIterator for &'a PortDirectory {
    type Item = &'a DirectoryEntry;
    type IntoIter = std::collections::btree_map::Values<'a, PortCode, DirectoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

fn parse_record(raw: RawDirectoryRecord) -> std::result::Result<DirectoryEntry, String> {
    let code = raw
        .code
        .parse::<PortCode>()
        .map_err(|e| format!("invalid port code '{}': {}", raw.code, e))?;

    let coordinates = match (
        parse_degrees(raw.latitude.as_deref()),
        parse_degrees(raw.longitude.as_deref()),
    ) {
        (Some(latitude), Some(longitude)) => {
            let coordinates = Coordinates::new(latitude, longitude);
            if coordinates.is_none() {
                tracing::warn!(
                    "Port {} has out-of-range coordinates ({}, {}); ignoring them",
                    code,
                    latitude,
                    longitude
                );
            }
            coordinates
        }
        _ => None,
    };

    Ok(DirectoryEntry {
        code,
        name: non_blank(raw.name).unwrap_or_default(),
        country: non_blank(raw.country).unwrap_or_default(),
        port_type: non_blank(raw.port_type),
        coordinates,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts decimal commas, which the code tables use.
fn parse_degrees(value: Option<&str>) -> Option<f64> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    text.replace(',', ".").parse::<f64>().ok()
}
