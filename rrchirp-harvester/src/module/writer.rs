///! Output files: CHIRP CSV and a plain text report

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{info, warn};

use rrchirp_common::{ChirpRow, Duplex, ToneMode};

use crate::error::{HarvestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Txt,
}

impl OutputFormat {
    /// `.txt` files get the text report, everything else CSV
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("txt") => OutputFormat::Txt,
            _ => OutputFormat::Csv,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "txt" | "text" => Ok(OutputFormat::Txt),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// Write rows to `path`, appending when `append` is set.
///
/// CSV appends check the existing header first and leave the file
/// untouched on mismatch. Returns the number of rows written.
pub fn write(rows: &[ChirpRow], path: &Path, format: OutputFormat, append: bool) -> Result<usize> {
    let appending = append && path.exists() && file_len(path)? > 0;
    match format {
        OutputFormat::Csv => write_csv(rows, path, appending)?,
        OutputFormat::Txt => write_txt(rows, path, appending)?,
    }

    let action = if appending { "Appended" } else { "Exported" };
    info!("{} {} frequencies to {:?}", action, rows.len(), path);
    Ok(rows.len())
}

fn file_len(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| HarvestError::io(path, e))
}

/// Header of an existing CSV file, `None` if the file is missing or empty
pub fn read_header(path: &Path) -> Result<Option<Vec<String>>> {
    if !path.exists() || file_len(path)? == 0 {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let header = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    Ok(Some(header))
}

fn check_header(path: &Path) -> Result<()> {
    match read_header(path)? {
        Some(found) if found.iter().map(String::as_str).ne(ChirpRow::HEADER) => {
            Err(HarvestError::SchemaMismatch {
                path: path.to_path_buf(),
                found,
            })
        }
        _ => Ok(()),
    }
}

/// Highest Location in an existing CHIRP CSV, for continuing the numbering.
///
/// `None` for a missing or empty file or one without data rows. A file
/// with a different header is a `SchemaMismatch`.
pub fn existing_max_location(path: &Path) -> Result<Option<u32>> {
    if OutputFormat::from_path(path) != OutputFormat::Csv || read_header(path)?.is_none() {
        return Ok(None);
    }
    check_header(path)?;

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut max = None;
    for record in reader.records() {
        let record = record?;
        match record.get(0).and_then(|v| v.trim().parse::<u32>().ok()) {
            Some(location) => max = max.max(Some(location)),
            None => warn!("Ignoring row without a numeric Location in {:?}", path),
        }
    }
    Ok(max)
}

fn write_csv(rows: &[ChirpRow], path: &Path, appending: bool) -> Result<()> {
    if appending {
        check_header(path)?;
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| HarvestError::io(path, e))?;
        ensure_trailing_newline(&mut file).map_err(|e| HarvestError::io(path, e))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(|e| HarvestError::io(path, e))?;
        return Ok(());
    }

    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record(ChirpRow::HEADER)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| HarvestError::io(path, e))?;
    Ok(())
}

/// A hand edited file may lack the final newline; appended rows must not
/// run into its last line
fn ensure_trailing_newline(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn write_txt(rows: &[ChirpRow], path: &Path, appending: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(appending)
        .truncate(!appending)
        .open(path)
        .map_err(|e| HarvestError::io(path, e))?;
    let mut out = BufWriter::new(file);
    render_txt(&mut out, rows, appending).map_err(|e| HarvestError::io(path, e))?;
    out.flush().map_err(|e| HarvestError::io(path, e))
}

fn render_txt(out: &mut impl Write, rows: &[ChirpRow], appending: bool) -> std::io::Result<()> {
    let rule = "=".repeat(80);
    if appending {
        writeln!(out)?;
        writeln!(out, "{}", rule)?;
        writeln!(out, "Additional Frequencies")?;
        writeln!(out, "{}", rule)?;
        writeln!(out)?;
    }

    for row in rows {
        writeln!(out, "Frequency #{}", row.location + 1)?;
        writeln!(out, "{}", "-".repeat(40))?;
        writeln!(out, "Name:        {}", row.name)?;
        writeln!(out, "Frequency:   {} MHz", row.frequency)?;
        writeln!(out, "Mode:        {}", row.mode)?;
        if row.duplex != Duplex::Simplex {
            writeln!(out, "Duplex:      {}", row.duplex.as_str())?;
        }
        if !row.offset.is_zero() {
            writeln!(out, "Offset:      {} MHz", row.offset)?;
        }
        match row.tone {
            ToneMode::None => writeln!(out, "Tone:        No Tone")?,
            ToneMode::Dtcs => writeln!(out, "Tone:        DTCS ({})", row.dtcs_code)?,
            other => writeln!(out, "Tone:        {} ({} Hz)", other.as_str(), row.r_tone_freq)?,
        }
        if !row.comment.is_empty() {
            writeln!(out, "Description: {}", row.comment)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrchirp_common::{ChirpMode, Frequency};
    use tempfile::TempDir;

    fn row(location: u32, mhz: &str, mode: ChirpMode) -> ChirpRow {
        ChirpRow::with_defaults(location, format!("Ch {}", location), Frequency::parse_mhz(mhz).unwrap(), mode)
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(OutputFormat::from_path(Path::new("out.TXT")), OutputFormat::Txt);
        assert_eq!(OutputFormat::from_path(Path::new("out.csv")), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("out")), OutputFormat::Csv);
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Txt));
    }

    #[test]
    fn test_csv_write_and_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("radio.csv");

        write(&[row(0, "155.745", ChirpMode::FM), row(1, "453.2", ChirpMode::DMR)], &path, OutputFormat::Csv, false)
            .unwrap();
        assert_eq!(existing_max_location(&path).unwrap(), Some(1));

        write(&[row(2, "162.55", ChirpMode::FM)], &path, OutputFormat::Csv, true).unwrap();
        assert_eq!(existing_max_location(&path).unwrap(), Some(2));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], ChirpRow::HEADER.join(","));
        assert!(lines[1].starts_with("0,Ch 0,155.74500,,0.00000,,88.5,88.5,023,NN,FM,5.00,"));
        assert!(lines[3].starts_with("2,Ch 2,162.55000,"));
    }

    #[test]
    fn test_append_to_missing_file_writes_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.csv");
        assert_eq!(existing_max_location(&path).unwrap(), None);

        write(&[row(0, "146.52", ChirpMode::FM)], &path, OutputFormat::Csv, true).unwrap();
        assert_eq!(read_header(&path).unwrap().unwrap(), ChirpRow::HEADER.to_vec());
    }

    #[test]
    fn test_append_header_mismatch_leaves_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.csv");
        let original = "Channel,Freq\n1,146.520\n";
        std::fs::write(&path, original).unwrap();

        let err = write(&[row(0, "146.52", ChirpMode::FM)], &path, OutputFormat::Csv, true).unwrap_err();
        match err {
            HarvestError::SchemaMismatch { found, .. } => assert_eq!(found, vec!["Channel", "Freq"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
        assert!(existing_max_location(&path).is_err());
    }

    #[test]
    fn test_txt_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("radio.txt");

        let mut repeater = row(0, "146.94", ChirpMode::FM);
        repeater.duplex = Duplex::Minus;
        repeater.offset = Frequency::parse_mhz("0.6").unwrap();
        repeater.tone = ToneMode::Tone;
        repeater.r_tone_freq = "100.0".to_string();
        repeater.comment = "Club repeater".to_string();
        write(&[repeater], &path, OutputFormat::Txt, false).unwrap();
        write(&[row(1, "162.55", ChirpMode::FM)], &path, OutputFormat::Txt, true).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Frequency #1\n"));
        assert!(content.contains("Frequency:   146.94000 MHz\n"));
        assert!(content.contains("Duplex:      -\n"));
        assert!(content.contains("Offset:      0.60000 MHz\n"));
        assert!(content.contains("Tone:        Tone (100.0 Hz)\n"));
        assert!(content.contains("Description: Club repeater\n"));
        assert!(content.contains("Additional Frequencies\n"));
        assert!(content.contains("Frequency #2\n"));
        assert!(content.contains("Tone:        No Tone\n"));
    }
}
