///! Cell level parsing: column roles, frequencies, tones and duplex hints

use regex::Regex;
use std::sync::LazyLock;

use rrchirp_common::{Duplex, Frequency, ToneInfo};

static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+)").expect("valid regex"));
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("valid regex"));
static DCS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b(?:D|DCS|DPL|DTCS)\s*(\d{3})\s*[NI]?\b|\b(\d{3})\s*[NI]?\s*(?:DCS|DPL|DTCS)\b)").expect("valid regex")
});
static CTCSS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{2,3}\.\d)\b").expect("valid regex"));
static PL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:PL\s*(\d{2,3})|(\d{2,3})\s*PL)\b").expect("valid regex"));

/// Lowest and highest standard CTCSS tones
const CTCSS_RANGE: std::ops::RangeInclusive<f64> = 60.0..=260.0;

/// Which column holds what, found from the header row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub frequency: Option<usize>,
    pub input: Option<usize>,
    pub license: Option<usize>,
    pub usage: Option<usize>,
    pub tone: Option<usize>,
    pub alpha_tag: Option<usize>,
    pub description: Option<usize>,
    pub mode: Option<usize>,
}

impl ColumnMap {
    /// Header texts are matched by keyword; the first column wins each role
    pub fn from_headers(headers: &[String]) -> Self {
        let mut map = ColumnMap::default();
        for (idx, header) in headers.iter().enumerate() {
            let h = header.to_lowercase();
            let slot = if h.contains("input") {
                &mut map.input
            } else if h.contains("freq") || h.contains("mhz") || h == "output" {
                &mut map.frequency
            } else if h.contains("license") || h.contains("callsign") {
                &mut map.license
            } else if h.contains("tone") || h == "pl" || h.contains("nac") {
                &mut map.tone
            } else if h.contains("alpha") {
                &mut map.alpha_tag
            } else if h.contains("desc") {
                &mut map.description
            } else if h.contains("mode") {
                &mut map.mode
            } else if h.contains("type") || h.contains("usage") {
                &mut map.usage
            } else {
                continue;
            };
            slot.get_or_insert(idx);
        }
        map
    }

    /// True if the table carries frequencies at all
    pub fn is_frequency_table(headers: &[String]) -> bool {
        headers.iter().any(|h| {
            let h = h.to_lowercase();
            h.contains("freq") || h.contains("mhz")
        })
    }
}

/// First decimal number in `text` as a frequency in MHz
pub fn parse_frequency(text: &str) -> Option<Frequency> {
    DECIMAL_RE
        .captures(text)
        .and_then(|c| Frequency::parse_mhz(&c[1]))
        .filter(|f| !f.is_zero())
}

/// Duplex direction written next to the frequency ("146.940 -", "147.300(+)")
pub fn parse_duplex_hint(freq_text: &str) -> Option<Duplex> {
    let rest = match DECIMAL_RE.find(freq_text) {
        Some(m) => &freq_text[m.end()..],
        None => freq_text,
    };
    let upper = rest.to_uppercase();
    if rest.contains('+') || upper.contains("POS") {
        Some(Duplex::Plus)
    } else if rest.contains('-') || upper.contains("NEG") {
        Some(Duplex::Minus)
    } else if upper.contains("SPLIT") {
        Some(Duplex::Split)
    } else {
        None
    }
}

/// Offset from a cell that talks about an offset or split ("+0.600 MHz offset")
pub fn parse_offset_cell(text: &str) -> Option<(Frequency, Option<Duplex>)> {
    let lower = text.to_lowercase();
    if !lower.contains("offset") && !lower.contains("split") {
        return None;
    }
    let m = NUMBER_RE.captures(text)?;
    let number = m.get(1)?;
    let offset = Frequency::parse_mhz(number.as_str())?;
    let sign = text[..number.start()].trim_end().chars().next_back();
    let duplex = match sign {
        Some('+') => Some(Duplex::Plus),
        Some('-') => Some(Duplex::Minus),
        _ => None,
    };
    Some((offset, duplex))
}

/// Squelch tone from a tone cell.
///
/// DCS codes ("D023N", "DCS 023", "023 DPL") are checked first, then CTCSS
/// tones ("100.0", "PL 100"). Anything else that is not empty is kept as
/// [`ToneInfo::Other`] (NAC, color code, ...).
pub fn parse_tone(text: &str) -> Option<ToneInfo> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let upper = trimmed.to_uppercase();

    if let Some(c) = DCS_RE.captures(&upper) {
        if let Some(code) = c.get(1).or_else(|| c.get(2)) {
            return Some(ToneInfo::Dcs(code.as_str().to_string()));
        }
    }

    if let Some(c) = CTCSS_RE.captures(&upper) {
        let tone = &c[1];
        if tone.parse::<f64>().is_ok_and(|t| CTCSS_RANGE.contains(&t)) {
            return Some(ToneInfo::Ctcss(tone.to_string()));
        }
    }

    if let Some(c) = PL_RE.captures(&upper) {
        if let Some(whole) = c.get(1).or_else(|| c.get(2)) {
            if whole.as_str().parse::<f64>().is_ok_and(|t| CTCSS_RANGE.contains(&t)) {
                return Some(ToneInfo::Ctcss(format!("{}.0", whole.as_str())));
            }
        }
    }

    Some(ToneInfo::Other(trimmed.to_string()))
}
