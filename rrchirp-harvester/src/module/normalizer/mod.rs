///! Record normalization into CHIRP rows
///!
///! Maps upstream modes to CHIRP modes, applies the optional mode filter,
///! drops duplicates, settles duplex/offset and tone columns, names the
///! channel and numbers the rows.

pub mod presets;

use std::collections::HashSet;
use tracing::debug;

use rrchirp_common::{ChirpMode, ChirpRow, Duplex, Frequency, FrequencyRecord, ToneInfo, ToneMode};

/// Where numbering starts and what scope label goes into comments
#[derive(Debug, Clone, Default)]
pub struct AppendContext {
    /// Highest Location already present in the output file
    pub existing_max_location: Option<u32>,
    /// County or state label used in generated comments
    pub scope: Option<String>,
}

impl AppendContext {
    pub fn fresh(scope: impl Into<String>) -> Self {
        Self {
            existing_max_location: None,
            scope: Some(scope.into()),
        }
    }

    fn first_location(&self) -> u32 {
        self.existing_max_location.map_or(0, |max| max + 1)
    }
}

/// Case-insensitive mode filter applied to mapped modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeFilter {
    token: String,
}

impl ModeFilter {
    /// `None` for an empty token
    pub fn new(token: &str) -> Option<Self> {
        let token = token.trim().to_uppercase();
        if token.is_empty() {
            None
        } else {
            Some(Self { token })
        }
    }

    pub fn matches(&self, mode: ChirpMode) -> bool {
        match self.token.as_str() {
            "FM" | "ANALOG" => mode.is_analog(),
            "DIGITAL" | "ENCRYPTED" => !mode.is_analog(),
            // P25 also keeps unidentified digital (DIG) entries
            "P25" | "APCO" => matches!(mode, ChirpMode::P25 | ChirpMode::DIG),
            "DSTAR" | "D-STAR" => mode == ChirpMode::DV,
            "C4FM" | "FUSION" | "YSF" => mode == ChirpMode::DN,
            token => {
                let mode = mode.as_str();
                mode == token || mode.contains(token) || token.contains(mode)
            }
        }
    }
}

/// Map an upstream mode string to a CHIRP mode; absent or unknown is FM
pub fn map_mode(raw: Option<&str>) -> ChirpMode {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return ChirpMode::FM;
    };
    let upper = raw.to_uppercase();

    if upper == "FMN" {
        return ChirpMode::NFM;
    }
    if let Some(mode) = ChirpMode::from_chirp_str(&upper) {
        return mode;
    }

    if upper.contains("P25") || upper.contains("APCO") {
        ChirpMode::P25
    } else if upper.contains("DMR") || upper.contains("TRBO") {
        ChirpMode::DMR
    } else if upper.contains("NXDN") || upper.contains("IDAS") {
        ChirpMode::NXDN
    } else if upper.contains("DSTAR") || upper.contains("D-STAR") {
        ChirpMode::DV
    } else if upper.contains("C4FM") || upper.contains("FUSION") || upper.contains("YSF") {
        ChirpMode::DN
    } else if upper.contains("FMN") || upper.contains("NFM") {
        ChirpMode::NFM
    } else if upper.contains("TDMA") || upper.contains("DIGITAL") {
        ChirpMode::DIG
    } else if upper.starts_with("AM") {
        ChirpMode::AM
    } else {
        ChirpMode::FM
    }
}

/// Standard repeater shift for a band, if the band has one.
///
/// 2 m repeaters below 147 MHz shift down, above shift up; 1.25 m shifts
/// down 1.6 MHz; 70 cm shifts up 5 MHz.
pub fn band_default_offset(frequency: Frequency) -> Option<(Duplex, Frequency)> {
    let khz = frequency.hz() / 1_000;
    match khz {
        144_000..=146_999 => Some((Duplex::Minus, Frequency::from_khz(600))),
        147_000..=148_000 => Some((Duplex::Plus, Frequency::from_khz(600))),
        222_000..=225_000 => Some((Duplex::Minus, Frequency::from_khz(1_600))),
        420_000..=450_000 => Some((Duplex::Plus, Frequency::from_khz(5_000))),
        _ => None,
    }
}

fn is_repeater(usage: Option<&str>) -> bool {
    usage.is_some_and(|u| {
        let u = u.trim().to_uppercase();
        u.starts_with("RM") || u.contains("REPEATER")
    })
}

fn resolve_duplex(record: &FrequencyRecord) -> (Duplex, Frequency) {
    if let Some(duplex) = record.duplex {
        let offset = match duplex {
            Duplex::Simplex | Duplex::Off => Frequency::ZERO,
            // CHIRP puts the transmit frequency in the offset column for split
            Duplex::Split => record.input.unwrap_or(Frequency::ZERO),
            Duplex::Plus | Duplex::Minus => record
                .offset
                .or_else(|| record.input.map(|input| input.abs_diff(record.frequency)))
                .or_else(|| band_default_offset(record.frequency).map(|(_, offset)| offset))
                .unwrap_or(Frequency::ZERO),
        };
        return (duplex, offset);
    }

    if let Some(input) = record.input.filter(|input| *input != record.frequency) {
        let duplex = if input > record.frequency { Duplex::Plus } else { Duplex::Minus };
        return (duplex, input.abs_diff(record.frequency));
    }

    if is_repeater(record.usage.as_deref()) {
        if let Some(default) = band_default_offset(record.frequency) {
            return default;
        }
    }

    (Duplex::Simplex, Frequency::ZERO)
}

/// Turn extracted records into numbered CHIRP rows.
///
/// Rows keep record order. A record is dropped if the filter rejects its
/// mode or if an earlier record had the same frequency, mode and alpha tag.
pub fn normalize(
    records: impl IntoIterator<Item = FrequencyRecord>,
    filter: Option<&ModeFilter>,
    context: &AppendContext,
) -> Vec<ChirpRow> {
    let mut seen: HashSet<(Frequency, ChirpMode, Option<String>)> = HashSet::new();
    let mut rows = Vec::new();
    let mut location = context.first_location();
    let mut filtered = 0;

    for record in records {
        let mode = map_mode(record.mode.as_deref());
        if filter.is_some_and(|f| !f.matches(mode)) {
            filtered += 1;
            continue;
        }
        if !seen.insert((record.frequency, mode, record.alpha_tag.clone())) {
            debug!("Dropping duplicate {} {} {:?}", record.frequency, mode, record.alpha_tag);
            continue;
        }

        rows.push(build_row(&record, mode, location, context));
        location += 1;
    }

    if filtered > 0 {
        debug!("Mode filter removed {} records", filtered);
    }
    rows
}

fn build_row(record: &FrequencyRecord, mode: ChirpMode, location: u32, context: &AppendContext) -> ChirpRow {
    let name = record
        .alpha_tag
        .clone()
        .or_else(|| record.description.clone())
        .unwrap_or_else(|| format!("Frequency {}", record.frequency));

    let mut row = ChirpRow::with_defaults(location, name, record.frequency, mode);

    let (duplex, offset) = resolve_duplex(record);
    row.duplex = duplex;
    row.offset = offset;

    let mut comment = record.description.clone().unwrap_or_else(|| match &context.scope {
        Some(scope) => format!("{} - {}", scope, row.name),
        None => String::new(),
    });

    match &record.tone {
        Some(ToneInfo::Ctcss(tone)) => {
            row.tone = ToneMode::Tone;
            row.r_tone_freq = tone.clone();
            row.c_tone_freq = tone.clone();
        }
        Some(ToneInfo::Dcs(code)) => {
            row.tone = ToneMode::Dtcs;
            row.dtcs_code = code.clone();
        }
        Some(ToneInfo::Other(text)) => {
            if comment.is_empty() {
                comment = format!("[{}]", text);
            } else {
                comment = format!("{} [{}]", comment, text);
            }
        }
        None => {}
    }
    row.comment = comment;
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mhz: &str, mode: Option<&str>, tag: Option<&str>) -> FrequencyRecord {
        let mut r = FrequencyRecord::new(Frequency::parse_mhz(mhz).unwrap());
        r.mode = mode.map(String::from);
        r.alpha_tag = tag.map(String::from);
        r
    }

    #[test]
    fn test_map_mode() {
        assert_eq!(map_mode(None), ChirpMode::FM);
        assert_eq!(map_mode(Some("FMN")), ChirpMode::NFM);
        assert_eq!(map_mode(Some("fm")), ChirpMode::FM);
        assert_eq!(map_mode(Some("P25 Phase II")), ChirpMode::P25);
        assert_eq!(map_mode(Some("APCO-25")), ChirpMode::P25);
        assert_eq!(map_mode(Some("DMR")), ChirpMode::DMR);
        assert_eq!(map_mode(Some("NXDN48")), ChirpMode::NXDN);
        assert_eq!(map_mode(Some("D-STAR")), ChirpMode::DV);
        assert_eq!(map_mode(Some("C4FM")), ChirpMode::DN);
        assert_eq!(map_mode(Some("TDMA")), ChirpMode::DIG);
        assert_eq!(map_mode(Some("AM")), ChirpMode::AM);
        assert_eq!(map_mode(Some("Telemetry")), ChirpMode::FM);
    }

    #[test]
    fn test_filter() {
        let fm = ModeFilter::new("fm").unwrap();
        assert!(fm.matches(ChirpMode::FM));
        assert!(fm.matches(ChirpMode::NFM));
        assert!(fm.matches(ChirpMode::AM));
        assert!(!fm.matches(ChirpMode::DMR));

        let digital = ModeFilter::new("Digital").unwrap();
        assert!(digital.matches(ChirpMode::P25));
        assert!(!digital.matches(ChirpMode::FM));

        let dmr = ModeFilter::new("DMR").unwrap();
        assert!(dmr.matches(ChirpMode::DMR));
        assert!(!dmr.matches(ChirpMode::P25));

        assert!(ModeFilter::new("  ").is_none());
    }

    #[test]
    fn test_filter_aliases() {
        let encrypted = ModeFilter::new("encrypted").unwrap();
        assert!(encrypted.matches(ChirpMode::P25));
        assert!(encrypted.matches(ChirpMode::DIG));
        assert!(!encrypted.matches(ChirpMode::FM));

        let p25 = ModeFilter::new("P25").unwrap();
        assert!(p25.matches(ChirpMode::P25));
        assert!(p25.matches(ChirpMode::DIG));
        assert!(!p25.matches(ChirpMode::DMR));

        let records = vec![record("460.1", Some("FM"), None), record("460.2", Some("P25"), None)];
        assert_eq!(normalize(records, Some(&encrypted), &AppendContext::default()).len(), 1);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let records = vec![
            record("155.745", Some("FM"), Some("A")),
            record("453.200", Some("DMR"), Some("B")),
            record("460.100", Some("FMN"), Some("C")),
        ];
        let filter = ModeFilter::new("FM").unwrap();
        let context = AppendContext::default();

        let once = normalize(records.clone(), Some(&filter), &context);
        let kept: Vec<FrequencyRecord> = records
            .into_iter()
            .filter(|r| filter.matches(map_mode(r.mode.as_deref())))
            .collect();
        let twice = normalize(kept, Some(&filter), &context);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_dedup_and_numbering() {
        let records = vec![
            record("155.745", Some("FM"), Some("Disp")),
            record("155.745", Some("FMN"), Some("Disp")),
            record("155.745", Some("FM"), Some("Disp")),
            record("155.745", Some("FM"), Some("Tac")),
        ];
        let rows = normalize(records, None, &AppendContext::default());
        assert_eq!(rows.len(), 3);
        let locations: Vec<u32> = rows.iter().map(|r| r.location).collect();
        assert_eq!(locations, vec![0, 1, 2]);

        let context = AppendContext {
            existing_max_location: Some(41),
            scope: None,
        };
        let rows = normalize(vec![record("155.745", None, None), record("155.760", None, None)], None, &context);
        let locations: Vec<u32> = rows.iter().map(|r| r.location).collect();
        assert_eq!(locations, vec![42, 43]);
    }

    #[test]
    fn test_duplex_resolution() {
        let mut explicit = record("146.940", Some("FM"), Some("Rptr"));
        explicit.duplex = Some(Duplex::Minus);
        explicit.offset = Frequency::parse_mhz("0.6");

        let mut from_input = record("449.525", Some("FM"), Some("UHF"));
        from_input.input = Frequency::parse_mhz("444.525");

        let mut repeater = record("147.300", Some("FM"), Some("Club"));
        repeater.usage = Some("RM".to_string());

        let simplex = record("155.745", Some("FM"), Some("Simplex"));

        let rows = normalize(vec![explicit, from_input, repeater, simplex], None, &AppendContext::default());
        assert_eq!((rows[0].duplex, rows[0].offset.to_mhz_string()), (Duplex::Minus, "0.60000".to_string()));
        assert_eq!((rows[1].duplex, rows[1].offset.to_mhz_string()), (Duplex::Minus, "5.00000".to_string()));
        assert_eq!((rows[2].duplex, rows[2].offset.to_mhz_string()), (Duplex::Plus, "0.60000".to_string()));
        assert_eq!((rows[3].duplex, rows[3].offset), (Duplex::Simplex, Frequency::ZERO));
    }

    #[test]
    fn test_tone_name_and_comment() {
        let mut ctcss = record("155.745", Some("FM"), None);
        ctcss.description = Some("Sheriff Dispatch".to_string());
        ctcss.tone = Some(ToneInfo::Ctcss("100.0".to_string()));

        let mut dcs = record("462.550", Some("FM"), Some("Ops"));
        dcs.tone = Some(ToneInfo::Dcs("023".to_string()));

        let mut nac = record("851.0125", Some("P25"), None);
        nac.tone = Some(ToneInfo::Other("NAC 293".to_string()));

        let rows = normalize(vec![ctcss, dcs, nac], None, &AppendContext::fresh("Los Angeles"));

        assert_eq!(rows[0].name, "Sheriff Dispatch");
        assert_eq!(rows[0].tone, ToneMode::Tone);
        assert_eq!(rows[0].r_tone_freq, "100.0");
        assert_eq!(rows[0].c_tone_freq, "100.0");
        assert_eq!(rows[0].comment, "Sheriff Dispatch");

        assert_eq!(rows[1].tone, ToneMode::Dtcs);
        assert_eq!(rows[1].dtcs_code, "023");
        assert_eq!(rows[1].r_tone_freq, ChirpRow::DEFAULT_TONE_FREQ);
        assert_eq!(rows[1].comment, "Los Angeles - Ops");

        assert_eq!(rows[2].name, "Frequency 851.01250");
        assert_eq!(rows[2].tone, ToneMode::None);
        assert_eq!(rows[2].comment, "Los Angeles - Frequency 851.01250 [NAC 293]");
    }
}
