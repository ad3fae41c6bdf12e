use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Customs code identifying a maritime port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortCode(u32);

impl PortCode {
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PortCode {
    type Err = std::num::ParseIntError;

    /// Accepts surrounding whitespace and a trailing `.0`, which spreadsheet
    /// exports emit for integer columns.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        digits.parse::<u32>().map(PortCode)
    }
}

impl From<u32> for PortCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` for non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortNode {
    pub code: PortCode,
    pub name: Option<String>,
    pub country: Option<String>,
    pub port_type: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl PortNode {
    pub fn bare(code: PortCode) -> Self {
        Self {
            code,
            name: None,
            country: None,
            port_type: None,
            coordinates: None,
        }
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.code),
            None => self.code.to_string(),
        }
    }
}

/// Validated row of the port directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub code: PortCode,
    pub name: String,
    pub country: String,
    pub port_type: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl DirectoryEntry {
    /// Copies directory metadata onto a graph node, keeping the node's code.
    pub fn apply_to(&self, node: &mut PortNode) {
        node.name = Some(self.name.clone());
        node.country = Some(self.country.clone());
        node.port_type = self.port_type.clone();
        node.coordinates = self.coordinates;
    }

    pub fn to_node(&self) -> PortNode {
        let mut node = PortNode::bare(self.code);
        self.apply_to(&mut node);
        node
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Import,
    Export,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationKind::Import => write!(f, "import"),
            DeclarationKind::Export => write!(f, "export"),
        }
    }
}

/// Reporting period of a declaration file, e.g. `enero 2024`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub month: String,
    pub year: u16,
}

/// One shipment leg taken from an import or export declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFlow {
    pub origin: PortCode,
    pub destination: PortCode,
    pub kind: DeclarationKind,
    pub period: Option<Period>,
}

impl TradeFlow {
    pub fn pair(&self) -> (PortCode, PortCode) {
        (self.origin, self.destination)
    }
}

/// Selects a column either by zero-based position or by header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSelector {
    Index(usize),
    Name(String),
}

/// How origin and destination ports are read from one kind of declaration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowLayout {
    #[serde(default = "FlowLayout::default_delimiter")]
    pub delimiter: char,
    #[serde(default = "FlowLayout::default_has_headers")]
    pub has_headers: bool,
    pub origin: ColumnSelector,
    pub destination: ColumnSelector,
}

impl FlowLayout {
    fn default_delimiter() -> char {
        ';'
    }

    fn default_has_headers() -> bool {
        true
    }
}

impl Default for FlowLayout {
    fn default() -> Self {
        Self {
            delimiter: Self::default_delimiter(),
            has_headers: Self::default_has_headers(),
            origin: ColumnSelector::Name("PTO_EMB".to_string()),
            destination: ColumnSelector::Name("PTO_DESEM".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingOptions {
    /// Number of nearest ports returned by the distance fallback.
    pub limit: usize,
    pub neighbor_limit: Option<usize>,
    pub sort_neighbors_by_distance: bool,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            neighbor_limit: None,
            sort_neighbors_by_distance: false,
        }
    }
}

/// Per-run counters from the trade-flow loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub files_read: usize,
    pub files_skipped: usize,
    pub records_read: usize,
    pub records_missing_ports: usize,
    pub records_malformed: usize,
    pub flows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeFlowBatch {
    pub flows: Vec<TradeFlow>,
    pub summary: LoadSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingBasis {
    DirectNeighbors,
    NearestByDistance,
    CoordinatesUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub code: PortCode,
    pub name: Option<String>,
    pub distance_km: Option<f64>,
    /// `[origin, alternative]` for neighbor-based results, empty otherwise.
    pub path: Vec<PortCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub origin: PortCode,
    pub disrupted: PortCode,
    pub basis: RankingBasis,
    pub alternatives: Vec<Alternative>,
    pub skipped_without_coordinates: usize,
}

impl Ranking {
    pub fn codes(&self) -> Vec<PortCode> {
        self.alternatives.iter().map(|a| a.code).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisruptionStatus {
    Removed,
    NotInGraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerouteRequest {
    pub origin: PortCode,
    pub disrupted: PortCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub edges_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerouteReport {
    pub request: RerouteRequest,
    pub generated_at: DateTime<Utc>,
    pub load: LoadSummary,
    pub graph: GraphStats,
    pub disruption: DisruptionStatus,
    pub ranking: Ranking,
}
