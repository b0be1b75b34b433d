use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::frequency::Frequency;
use crate::states::UsState;

/// Validation failures when building a [`LocationQuery`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("ZIP code must be exactly 5 digits, got \"{0}\"")]
    InvalidZip(String),

    #[error("unrecognized state \"{0}\"")]
    InvalidState(String),

    #[error("{0} name must not be empty")]
    EmptyName(&'static str),
}

/// Suffixes the upstream site and users append to county names
const COUNTY_SUFFIXES: [&str; 5] = [" county", " parish", " borough", " census area", " municipality"];

/// Remove a trailing "County" / "Parish" / "Borough" / "Census Area" suffix
pub fn strip_county_suffix(name: &str) -> &str {
    let trimmed = name.trim();
    let lower = trimmed.to_lowercase();
    for suffix in COUNTY_SUFFIXES {
        if lower.len() == trimmed.len() && lower.ends_with(suffix) && lower.len() > suffix.len() {
            // Suffixes are ASCII so byte offsets line up with the original
            return trimmed[..trimmed.len() - suffix.len()].trim_end();
        }
    }
    trimmed
}

/// A user supplied location, validated at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationQuery {
    Zip(String),
    CityState { city: String, state: UsState },
    CountyState { county: String, state: UsState },
}

impl LocationQuery {
    pub fn zip(code: &str) -> Result<Self, QueryError> {
        let code = code.trim();
        if code.len() != 5 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(QueryError::InvalidZip(code.to_string()));
        }
        Ok(LocationQuery::Zip(code.to_string()))
    }

    pub fn city(city: &str, state: &str) -> Result<Self, QueryError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(QueryError::EmptyName("city"));
        }
        Ok(LocationQuery::CityState {
            city: city.to_string(),
            state: parse_state(state)?,
        })
    }

    pub fn county(county: &str, state: &str) -> Result<Self, QueryError> {
        let county = strip_county_suffix(county);
        if county.is_empty() {
            return Err(QueryError::EmptyName("county"));
        }
        Ok(LocationQuery::CountyState {
            county: county.to_string(),
            state: parse_state(state)?,
        })
    }

    pub fn state(&self) -> Option<UsState> {
        match self {
            LocationQuery::Zip(_) => None,
            LocationQuery::CityState { state, .. } | LocationQuery::CountyState { state, .. } => Some(*state),
        }
    }
}

fn parse_state(state: &str) -> Result<UsState, QueryError> {
    UsState::parse(state).ok_or_else(|| QueryError::InvalidState(state.trim().to_string()))
}

impl std::fmt::Display for LocationQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationQuery::Zip(code) => write!(f, "ZIP {}", code),
            LocationQuery::CityState { city, state } => write!(f, "{}, {}", city, state),
            LocationQuery::CountyState { county, state } => write!(f, "{} County, {}", county, state),
        }
    }
}

/// Which kind of query produced a [`ResolvedLocation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LocationKind {
    Zip,
    City,
    County,
}

/// Upstream page key for a resolved location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamId {
    /// County listing (`ctid`)
    County(u32),
    /// State-wide listing, keyed by the state's query id
    State(u32),
}

impl UpstreamId {
    /// Page URL on the upstream site
    pub fn page_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            UpstreamId::County(id) => format!("{}/db/browse/ctid/{}", base, id),
            UpstreamId::State(id) => format!("{}/apps/db/?stid={}", base, id),
        }
    }
}

/// Concrete upstream locator produced by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub kind: LocationKind,
    pub upstream: UpstreamId,
    pub display_name: String,
    pub state: UsState,
    /// City the user asked about, if any
    pub city: Option<String>,
    /// County the location resolved to, if any
    pub county: Option<String>,
}

impl ResolvedLocation {
    /// Short label used in record comments ("Los Angeles" or "CA")
    pub fn scope_label(&self) -> String {
        self.county.clone().unwrap_or_else(|| self.state.code().to_string())
    }
}

/// Squelch tone annotation found next to a frequency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToneInfo {
    /// CTCSS tone in Hz, e.g. "100.0"
    Ctcss(String),
    /// DCS code, e.g. "023"
    Dcs(String),
    /// Anything else (P25 NAC, DMR color code, ...)
    Other(String),
}

/// Transmit/receive relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Duplex {
    #[default]
    Simplex,
    Plus,
    Minus,
    Split,
    /// Receive only
    Off,
}

impl Duplex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Duplex::Simplex => "",
            Duplex::Plus => "+",
            Duplex::Minus => "-",
            Duplex::Split => "split",
            Duplex::Off => "off",
        }
    }
}

impl Serialize for Duplex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One frequency as extracted from a listing page (pre-normalization)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrequencyRecord {
    pub frequency: Frequency,
    /// Repeater input frequency
    pub input: Option<Frequency>,
    pub duplex: Option<Duplex>,
    pub offset: Option<Frequency>,
    /// Mode text as shown upstream ("FMN", "DMR", "P25", ...)
    pub mode: Option<String>,
    pub tone: Option<ToneInfo>,
    pub alpha_tag: Option<String>,
    pub description: Option<String>,
    pub license_class: Option<String>,
    /// Station usage code from the "Type" column ("RM", "BM", "FB2", ...)
    pub usage: Option<String>,
    /// Header → cell text for every column of the source row
    pub raw_fields: BTreeMap<String, String>,
}

impl FrequencyRecord {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            ..Default::default()
        }
    }
}

/// Modes accepted in the CHIRP `Mode` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChirpMode {
    FM,
    NFM,
    WFM,
    AM,
    DMR,
    P25,
    NXDN,
    /// D-STAR
    DV,
    /// Yaesu System Fusion (C4FM)
    DN,
    /// Other digital voice
    DIG,
}

impl ChirpMode {
    pub const ALL: [ChirpMode; 10] = [
        ChirpMode::FM,
        ChirpMode::NFM,
        ChirpMode::WFM,
        ChirpMode::AM,
        ChirpMode::DMR,
        ChirpMode::P25,
        ChirpMode::NXDN,
        ChirpMode::DV,
        ChirpMode::DN,
        ChirpMode::DIG,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChirpMode::FM => "FM",
            ChirpMode::NFM => "NFM",
            ChirpMode::WFM => "WFM",
            ChirpMode::AM => "AM",
            ChirpMode::DMR => "DMR",
            ChirpMode::P25 => "P25",
            ChirpMode::NXDN => "NXDN",
            ChirpMode::DV => "DV",
            ChirpMode::DN => "DN",
            ChirpMode::DIG => "DIG",
        }
    }

    pub fn is_analog(&self) -> bool {
        matches!(self, ChirpMode::FM | ChirpMode::NFM | ChirpMode::WFM | ChirpMode::AM)
    }

    pub fn from_chirp_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl std::fmt::Display for ChirpMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ChirpMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// CHIRP `Tone` column values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToneMode {
    #[default]
    None,
    Tone,
    Tsql,
    Dtcs,
}

impl ToneMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToneMode::None => "",
            ToneMode::Tone => "Tone",
            ToneMode::Tsql => "TSQL",
            ToneMode::Dtcs => "DTCS",
        }
    }
}

impl Serialize for ToneMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One row of the CHIRP CSV interchange format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChirpRow {
    #[serde(rename = "Location")]
    pub location: u32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Frequency")]
    pub frequency: Frequency,
    #[serde(rename = "Duplex")]
    pub duplex: Duplex,
    #[serde(rename = "Offset")]
    pub offset: Frequency,
    #[serde(rename = "Tone")]
    pub tone: ToneMode,
    #[serde(rename = "rToneFreq")]
    pub r_tone_freq: String,
    #[serde(rename = "cToneFreq")]
    pub c_tone_freq: String,
    #[serde(rename = "DtcsCode")]
    pub dtcs_code: String,
    #[serde(rename = "DtcsPolarity")]
    pub dtcs_polarity: String,
    #[serde(rename = "Mode")]
    pub mode: ChirpMode,
    #[serde(rename = "TStep")]
    pub tstep: String,
    #[serde(rename = "Skip")]
    pub skip: String,
    #[serde(rename = "Comment")]
    pub comment: String,
    #[serde(rename = "URCALL")]
    pub urcall: String,
    #[serde(rename = "RPT1CALL")]
    pub rpt1call: String,
    #[serde(rename = "RPT2CALL")]
    pub rpt2call: String,
    #[serde(rename = "DVCODE")]
    pub dvcode: String,
}

impl ChirpRow {
    /// Fixed column order of the CSV header
    pub const HEADER: [&'static str; 18] = [
        "Location", "Name", "Frequency", "Duplex", "Offset", "Tone",
        "rToneFreq", "cToneFreq", "DtcsCode", "DtcsPolarity", "Mode", "TStep",
        "Skip", "Comment", "URCALL", "RPT1CALL", "RPT2CALL", "DVCODE",
    ];

    pub const DEFAULT_TONE_FREQ: &'static str = "88.5";
    pub const DEFAULT_DTCS_CODE: &'static str = "023";
    pub const DEFAULT_DTCS_POLARITY: &'static str = "NN";
    pub const DEFAULT_TSTEP: &'static str = "5.00";

    /// A row with every optional column at its neutral default
    pub fn with_defaults(location: u32, name: String, frequency: Frequency, mode: ChirpMode) -> Self {
        Self {
            location,
            name,
            frequency,
            duplex: Duplex::Simplex,
            offset: Frequency::ZERO,
            tone: ToneMode::None,
            r_tone_freq: Self::DEFAULT_TONE_FREQ.to_string(),
            c_tone_freq: Self::DEFAULT_TONE_FREQ.to_string(),
            dtcs_code: Self::DEFAULT_DTCS_CODE.to_string(),
            dtcs_polarity: Self::DEFAULT_DTCS_POLARITY.to_string(),
            mode,
            tstep: Self::DEFAULT_TSTEP.to_string(),
            skip: String::new(),
            comment: String::new(),
            urcall: String::new(),
            rpt1call: String::new(),
            rpt2call: String::new(),
            dvcode: String::new(),
        }
    }
}
