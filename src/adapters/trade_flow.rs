//! Reads import/export declaration files into origin/destination pairs.
//!
//! Files are recognised by name (`Exportaciones enero 2024.txt`,
//! `imports_march_2024.csv`, ...). A record with an empty port field is
//! excluded; a record whose port field is not a code is skipped with a
//! warning. Neither aborts the run.

use crate::domain::model::{
    ColumnSelector, DeclarationKind, FlowLayout, LoadSummary, Period, PortCode, TradeFlow,
    TradeFlowBatch,
};
use crate::utils::error::{RerouteError, Result};
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};

const FLOW_FILE_PATTERN: &str =
    r"(?i)^(importaciones|exportaciones|imports|exports)[ _-]+([[:alpha:]]+)[ _-]+(\d{4})";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeFlowFile {
    pub path: PathBuf,
    pub kind: DeclarationKind,
    pub period: Period,
}

#[derive(Debug, Clone)]
pub struct TradeFlowLoader {
    imports: FlowLayout,
    exports: FlowLayout,
    file_pattern: Regex,
}

impl TradeFlowLoader {
    pub fn new(imports: FlowLayout, exports: FlowLayout) -> Result<Self> {
        let file_pattern =
            Regex::new(FLOW_FILE_PATTERN).map_err(|e| RerouteError::ConfigValidationError {
                field: "trade_flows.file_pattern".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            imports,
            exports,
            file_pattern,
        })
    }

    pub fn layout(&self, kind: DeclarationKind) -> &FlowLayout {
        match kind {
            DeclarationKind::Import => &self.imports,
            DeclarationKind::Export => &self.exports,
        }
    }

    /// Classifies a declaration file by its name.
    pub fn classify(&self, path: &Path) -> Option<TradeFlowFile> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if extension != "txt" && extension != "csv" {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let captures = self.file_pattern.captures(stem)?;

        let kind = match captures[1].to_ascii_lowercase().as_str() {
            "importaciones" | "imports" => DeclarationKind::Import,
            _ => DeclarationKind::Export,
        };
        let year = captures[3].parse::<u16>().ok()?;

        Some(TradeFlowFile {
            path: path.to_path_buf(),
            kind,
            period: Period {
                month: captures[2].to_lowercase(),
                year,
            },
        })
    }

    /// Lists declaration files in `dir`, sorted by path.
    pub fn discover(&self, dir: &Path, summary: &mut LoadSummary) -> Result<Vec<TradeFlowFile>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut files = Vec::new();
        for path in paths {
            match self.classify(&path) {
                Some(file) => files.push(file),
                None => {
                    tracing::warn!(
                        "Skipping {}: not a recognised declaration file name",
                        path.display()
                    );
                    summary.files_skipped += 1;
                }
            }
        }
        Ok(files)
    }

    /// Loads every declaration file in `dir`.
    ///
    /// A missing directory or an unreadable file is logged and skipped; the
    /// caller decides what an empty batch means.
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<TradeFlowBatch> {
        let dir = dir.as_ref();
        let mut batch = TradeFlowBatch::default();
        if !dir.is_dir() {
            tracing::warn!("Trade-flow directory {} does not exist", dir.display());
            return Ok(batch);
        }

        for file in self.discover(dir, &mut batch.summary)? {
            tracing::info!(
                "Reading {} ({}, {} {})",
                file.path.display(),
                file.kind,
                file.period.month,
                file.period.year
            );
            let reader = match std::fs::File::open(&file.path) {
                Ok(reader) => reader,
                Err(e) => {
                    tracing::warn!("Cannot open {}: {}", file.path.display(), e);
                    batch.summary.files_skipped += 1;
                    continue;
                }
            };
            match self.read_flows(&file, reader, &mut batch.summary) {
                Ok(flows) => {
                    batch.summary.files_read += 1;
                    batch.flows.extend(flows);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", file.path.display(), e);
                    batch.summary.files_skipped += 1;
                }
            }
        }

        batch.summary.flows = batch.flows.len();
        tracing::info!(
            "Loaded {} trade flow(s) from {} file(s); {} without ports, {} malformed",
            batch.summary.flows,
            batch.summary.files_read,
            batch.summary.records_missing_ports,
            batch.summary.records_malformed
        );
        Ok(batch)
    }

    pub fn read_flows<R: Read>(
        &self,
        file: &TradeFlowFile,
        reader: R,
        summary: &mut LoadSummary,
    ) -> Result<Vec<TradeFlow>> {
        let layout = self.layout(file.kind);
        let delimiter = u8::try_from(layout.delimiter).map_err(|_| {
            RerouteError::InvalidConfigValueError {
                field: "trade_flows.delimiter".to_string(),
                value: layout.delimiter.to_string(),
                reason: "Delimiter must be a single-byte character".to_string(),
            }
        })?;
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(layout.has_headers)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let file_name = file.path.display().to_string();
        let (origin_index, destination_index) = if layout.has_headers {
            let headers = csv_reader.byte_headers()?.clone();
            (
                resolve_column(&layout.origin, &headers, &file_name)?,
                resolve_column(&layout.destination, &headers, &file_name)?,
            )
        } else {
            (
                positional_column(&layout.origin, &file_name)?,
                positional_column(&layout.destination, &file_name)?,
            )
        };

        // Free-text columns are often Latin-1; only the port fields are decoded.
        let mut flows = Vec::new();
        for record in csv_reader.byte_records() {
            summary.records_read += 1;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or_default();
                    warn_malformed(&file_name, line, &e.to_string());
                    summary.records_malformed += 1;
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            let origin = record.get(origin_index).unwrap_or_default();
            let destination = record.get(destination_index).unwrap_or_default();
            if origin.is_empty() || destination.is_empty() {
                summary.records_missing_ports += 1;
                continue;
            }

            let (Ok(origin), Ok(destination)) =
                (std::str::from_utf8(origin), std::str::from_utf8(destination))
            else {
                warn_malformed(&file_name, line, "port field is not valid UTF-8");
                summary.records_malformed += 1;
                continue;
            };

            match (origin.parse::<PortCode>(), destination.parse::<PortCode>()) {
                (Ok(origin), Ok(destination)) => flows.push(TradeFlow {
                    origin,
                    destination,
                    kind: file.kind,
                    period: Some(file.period.clone()),
                }),
                _ => {
                    warn_malformed(
                        &file_name,
                        line,
                        &format!("port codes '{}' / '{}' are not numeric", origin, destination),
                    );
                    summary.records_malformed += 1;
                }
            }
        }
        Ok(flows)
    }
}

fn warn_malformed(file: &str, line: u64, reason: &str) {
    let err = RerouteError::MalformedRecord {
        file: file.to_string(),
        line,
        reason: reason.to_string(),
    };
    tracing::warn!("{}", err);
}

fn resolve_column(
    selector: &ColumnSelector,
    headers: &csv::ByteRecord,
    file: &str,
) -> Result<usize> {
    match selector {
        ColumnSelector::Index(index) => Ok(*index),
        ColumnSelector::Name(name) => headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name.as_bytes()))
            .ok_or_else(|| RerouteError::MalformedRecord {
                file: file.to_string(),
                line: 1,
                reason: format!(
                    "header has no column named '{}'; headerless DIN/DUS extracts need \
                     `has_headers = false` and column positions",
                    name
                ),
            }),
    }
}

fn positional_column(selector: &ColumnSelector, file: &str) -> Result<usize> {
    match selector {
        ColumnSelector::Index(index) => Ok(*index),
        ColumnSelector::Name(name) => Err(RerouteError::ConfigValidationError {
            field: "trade_flows".to_string(),
            message: format!(
                "column '{}' selected by name but {} is read without headers",
                name, file
            ),
        }),
    }
}
