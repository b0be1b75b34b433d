///! Frequency table extraction
///!
///! Every table whose header row mentions a frequency column is read. Rows
///! are collected up front (the parsed document is not `Send`), then turned
///! into [`FrequencyRecord`]s lazily as the [`Extraction`] is iterated.
///! Rows without a parseable frequency are counted as skipped.

mod cells;

use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use rrchirp_common::FrequencyRecord;

use crate::error::{HarvestError, Result};

pub use cells::{parse_duplex_hint, parse_frequency, parse_offset_cell, parse_tone, ColumnMap};

/// One data row with the header of the table it came from
struct RawRow {
    headers: Arc<Vec<String>>,
    columns: Arc<ColumnMap>,
    cells: Vec<String>,
}

/// Lazy sequence of records from one page
pub struct Extraction {
    rows: std::vec::IntoIter<RawRow>,
    tables: usize,
    skipped: usize,
}

impl Extraction {
    /// Number of frequency tables found on the page
    pub fn tables(&self) -> usize {
        self.tables
    }

    /// Rows dropped so far for lacking a frequency
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Drain the extraction, returning the records and the skipped count
    pub fn into_parts(mut self) -> (Vec<FrequencyRecord>, usize) {
        let records: Vec<_> = self.by_ref().collect();
        (records, self.skipped)
    }
}

impl Iterator for Extraction {
    type Item = FrequencyRecord;

    fn next(&mut self) -> Option<FrequencyRecord> {
        for raw in self.rows.by_ref() {
            match parse_row(&raw) {
                Some(record) => return Some(record),
                None => self.skipped += 1,
            }
        }
        None
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::UnexpectedPage {
        url: String::new(),
        reason: format!("bad selector {:?}: {}", css, e),
    })
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find frequency tables in a rendered page
pub fn extract(html: &str) -> Result<Extraction> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    let mut rows = Vec::new();
    let mut tables = 0;
    for table in document.select(&table_sel) {
        let mut table_rows = table.select(&row_sel);
        let Some(header_row) = table_rows.next() else {
            continue;
        };
        let headers: Vec<String> = header_row.select(&cell_sel).map(cell_text).collect();
        if !ColumnMap::is_frequency_table(&headers) {
            continue;
        }

        tables += 1;
        let columns = Arc::new(ColumnMap::from_headers(&headers));
        let headers = Arc::new(headers);
        for row in table_rows {
            let cells: Vec<String> = row.select(&cell_sel).map(cell_text).collect();
            // Section captions and spacer rows
            if cells.len() < 2 {
                continue;
            }
            rows.push(RawRow {
                headers: Arc::clone(&headers),
                columns: Arc::clone(&columns),
                cells,
            });
        }
    }

    debug!("Found {} frequency tables with {} rows", tables, rows.len());
    Ok(Extraction {
        rows: rows.into_iter(),
        tables,
        skipped: 0,
    })
}

fn parse_row(raw: &RawRow) -> Option<FrequencyRecord> {
    let cols = &raw.columns;
    let cell = |idx: Option<usize>| -> Option<&str> {
        idx.and_then(|i| raw.cells.get(i))
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    };

    let freq_text = cell(cols.frequency).or_else(|| raw.cells.first().map(|s| s.as_str()))?;
    let frequency = parse_frequency(freq_text)?;

    let mut record = FrequencyRecord::new(frequency);
    record.duplex = parse_duplex_hint(freq_text);
    record.input = cell(cols.input).and_then(parse_frequency);
    record.mode = cell(cols.mode).map(str::to_string);
    record.tone = cell(cols.tone).and_then(parse_tone);
    record.alpha_tag = cell(cols.alpha_tag).map(str::to_string);
    record.description = cell(cols.description).map(str::to_string);
    record.license_class = cell(cols.license).map(str::to_string);
    record.usage = cell(cols.usage).map(str::to_string);

    for (idx, text) in raw.cells.iter().enumerate() {
        if Some(idx) != cols.frequency {
            if let Some((offset, duplex)) = parse_offset_cell(text) {
                record.offset = Some(offset);
                if record.duplex.is_none() {
                    record.duplex = duplex;
                }
                break;
            }
        }
    }

    record.raw_fields = raw
        .headers
        .iter()
        .zip(raw.cells.iter())
        .filter(|(header, _)| !header.is_empty())
        .map(|(header, text)| (header.clone(), text.clone()))
        .collect::<BTreeMap<_, _>>();

    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrchirp_common::{Duplex, Frequency, ToneInfo};

    const PAGE: &str = r#"
        <html><body>
        <table><tr><td>Site navigation</td><td>Links</td></tr></table>
        <table>
          <tr><th>Frequency</th><th>Input</th><th>License</th><th>Type</th><th>Tone</th>
              <th>Alpha Tag</th><th>Description</th><th>Mode</th><th>Tag</th></tr>
          <tr><td colspan="9">Sheriff</td></tr>
          <tr><td>155.7450</td><td></td><td>KMA123</td><td>BM</td><td>100.0 PL</td>
              <td>LASD Disp</td><td>Sheriff Dispatch</td><td>FMN</td><td>Law Dispatch</td></tr>
          <tr><td>146.940 -</td><td>146.340</td><td>W6ABC</td><td>RM</td><td>D023N</td>
              <td>W6ABC Rptr</td><td>Club repeater</td><td>FM</td><td>Ham</td></tr>
          <tr><td>TBD</td><td></td><td></td><td>BM</td><td></td>
              <td>Unknown</td><td>Pending</td><td>FM</td><td>Other</td></tr>
          <tr><td>453.2000</td><td></td><td></td><td>BM</td><td>CC1</td>
              <td>Transit</td><td>Bus Ops</td><td>DMR</td><td>Transportation</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_extract_rows() {
        let extraction = extract(PAGE).unwrap();
        assert_eq!(extraction.tables(), 1);
        let (records, skipped) = extraction.into_parts();
        assert_eq!(records.len(), 3);
        assert_eq!(skipped, 1);

        let sheriff = &records[0];
        assert_eq!(sheriff.frequency, Frequency::parse_mhz("155.745").unwrap());
        assert_eq!(sheriff.alpha_tag.as_deref(), Some("LASD Disp"));
        assert_eq!(sheriff.mode.as_deref(), Some("FMN"));
        assert_eq!(sheriff.tone, Some(ToneInfo::Ctcss("100.0".to_string())));
        assert_eq!(sheriff.usage.as_deref(), Some("BM"));
        assert_eq!(sheriff.license_class.as_deref(), Some("KMA123"));
        assert_eq!(sheriff.raw_fields.get("Tag").map(String::as_str), Some("Law Dispatch"));
        assert_eq!(sheriff.duplex, None);

        let repeater = &records[1];
        assert_eq!(repeater.duplex, Some(Duplex::Minus));
        assert_eq!(repeater.input, Frequency::parse_mhz("146.34"));
        assert_eq!(repeater.tone, Some(ToneInfo::Dcs("023".to_string())));

        assert_eq!(records[2].tone, Some(ToneInfo::Other("CC1".to_string())));
    }

    #[test]
    fn test_no_tables() {
        let (records, skipped) = extract("<html><body><p>Nothing here</p></body></html>")
            .unwrap()
            .into_parts();
        assert!(records.is_empty());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_skipped_count_grows_while_iterating() {
        let mut extraction = extract(PAGE).unwrap();
        assert_eq!(extraction.skipped(), 0);
        while extraction.next().is_some() {}
        assert_eq!(extraction.skipped(), 1);
    }
}
