///! Exact radio frequency representation
///!
///! Frequencies are kept as integer Hz so that deduplication and ordering
///! never depend on floating point rounding of scraped text.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of decimal places used when rendering MHz values
pub const MHZ_DECIMALS: usize = 5;

/// A frequency (or offset) in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Frequency(u64);

impl Frequency {
    pub const ZERO: Frequency = Frequency(0);

    pub const fn from_hz(hz: u64) -> Self {
        Frequency(hz)
    }

    pub const fn from_khz(khz: u64) -> Self {
        Frequency(khz * 1_000)
    }

    pub fn hz(&self) -> u64 {
        self.0
    }

    pub fn mhz(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Absolute difference between two frequencies
    pub fn abs_diff(&self, other: Frequency) -> Frequency {
        Frequency(self.0.abs_diff(other.0))
    }

    /// Parse a decimal MHz string such as "146.520" or "453.00625".
    ///
    /// Digits past 1 Hz resolution are dropped. Signs, units and
    /// surrounding text are not accepted here; callers extract the number first.
    pub fn parse_mhz(s: &str) -> Option<Self> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let whole: u64 = whole.parse().ok()?;
        let mut frac_digits: String = frac.chars().take(6).collect();
        while frac_digits.len() < 6 {
            frac_digits.push('0');
        }
        let frac: u64 = frac_digits.parse().ok()?;

        whole.checked_mul(1_000_000)?.checked_add(frac).map(Frequency)
    }

    /// Render as MHz with a fixed number of decimals
    pub fn to_mhz_string(&self) -> String {
        let whole = self.0 / 1_000_000;
        let frac = self.0 % 1_000_000;
        let scaled = frac / 10u64.pow((6 - MHZ_DECIMALS) as u32);
        format!("{}.{:0width$}", whole, scaled, width = MHZ_DECIMALS)
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_mhz_string())
    }
}

impl Serialize for Frequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_mhz_string())
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Frequency::parse_mhz(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid frequency: {}", s)))
    }
}
