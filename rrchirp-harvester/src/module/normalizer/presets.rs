///! Fixed channel plans that need no lookup
///!
///! Produced as [`FrequencyRecord`]s so they go through the same normalizer
///! and writer as scraped listings.

use rrchirp_common::{Duplex, Frequency, FrequencyRecord};

/// Channel spacing of both plans
const STEP_HZ: u64 = 25_000;

/// One block of consecutive GMRS/FRS channels
struct GmrsBlock {
    first_channel: u32,
    count: u32,
    start_hz: u64,
    mode: &'static str,
    power: &'static str,
}

const GMRS_BLOCKS: [GmrsBlock; 3] = [
    GmrsBlock { first_channel: 1, count: 7, start_hz: 462_562_500, mode: "FM", power: "2 W" },
    GmrsBlock { first_channel: 8, count: 7, start_hz: 467_562_500, mode: "FMN", power: "0.5 W" },
    GmrsBlock { first_channel: 15, count: 8, start_hz: 462_550_000, mode: "FM", power: "50 W" },
];

/// NOAA weather channels in WX1..WX7 order
const NOAA_CHANNELS_HZ: [u64; 7] = [
    162_550_000,
    162_400_000,
    162_475_000,
    162_425_000,
    162_450_000,
    162_500_000,
    162_525_000,
];

/// The 22 GMRS/FRS channels in channel order
pub fn gmrs_frs() -> Vec<FrequencyRecord> {
    GMRS_BLOCKS
        .iter()
        .flat_map(|block| {
            (0..block.count).map(move |i| {
                let channel = block.first_channel + i;
                let mut record = FrequencyRecord::new(Frequency::from_hz(block.start_hz + STEP_HZ * u64::from(i)));
                record.mode = Some(block.mode.to_string());
                record.alpha_tag = Some(format!("GMRS {}", channel));
                record.description = Some(format!("GMRS/FRS channel {}, {}", channel, block.power));
                record.duplex = Some(Duplex::Simplex);
                record
            })
        })
        .collect()
}

/// The 7 NOAA weather radio channels, receive only
pub fn noaa_weather() -> Vec<FrequencyRecord> {
    NOAA_CHANNELS_HZ
        .iter()
        .enumerate()
        .map(|(idx, hz)| {
            let mut record = FrequencyRecord::new(Frequency::from_hz(*hz));
            record.mode = Some("FM".to_string());
            record.alpha_tag = Some(format!("WX{}", idx + 1));
            record.description = Some(format!("NOAA Weather Radio WX{}", idx + 1));
            record.duplex = Some(Duplex::Off);
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::normalizer::{normalize, AppendContext};
    use rrchirp_common::ChirpMode;

    #[test]
    fn test_gmrs_channels() {
        let records = gmrs_frs();
        assert_eq!(records.len(), 22);
        assert_eq!(records[0].frequency.to_mhz_string(), "462.56250");
        assert_eq!(records[6].frequency.to_mhz_string(), "462.71250");
        assert_eq!(records[7].frequency.to_mhz_string(), "467.56250");
        assert_eq!(records[13].frequency.to_mhz_string(), "467.71250");
        assert_eq!(records[14].frequency.to_mhz_string(), "462.55000");
        assert_eq!(records[21].frequency.to_mhz_string(), "462.72500");

        let rows = normalize(records, None, &AppendContext::default());
        assert_eq!(rows.len(), 22);
        let min = rows.iter().map(|r| r.frequency).min().unwrap();
        let max = rows.iter().map(|r| r.frequency).max().unwrap();
        assert_eq!(min.to_mhz_string(), "462.55000");
        assert_eq!(max.to_mhz_string(), "467.71250");
        assert!(rows[7..14].iter().all(|r| r.mode == ChirpMode::NFM));
        assert!(rows[..7].iter().all(|r| r.mode == ChirpMode::FM));
        assert_eq!(rows[21].name, "GMRS 22");
        assert_eq!(rows[21].location, 21);
    }

    #[test]
    fn test_noaa_channels() {
        let rows = normalize(noaa_weather(), None, &AppendContext::default());
        assert_eq!(rows.len(), 7);

        let mut freqs: Vec<String> = rows.iter().map(|r| r.frequency.to_mhz_string()).collect();
        freqs.sort();
        assert_eq!(
            freqs,
            vec!["162.40000", "162.42500", "162.45000", "162.47500", "162.50000", "162.52500", "162.55000"]
        );
        assert!(rows.iter().all(|r| r.duplex == Duplex::Off));
        assert_eq!(rows[0].name, "WX1");
    }
}
