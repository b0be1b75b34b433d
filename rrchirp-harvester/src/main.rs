use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

use rrchirp_common::{ChirpRow, FrequencyRecord, LocationQuery, ResolvedLocation, UsState};
use rrchirp_harvester::module::normalizer::presets;
use rrchirp_harvester::module::writer::existing_max_location;
use rrchirp_harvester::logging::init_logging;
use rrchirp_harvester::{
    normalize, write, AppendContext, CountyCache, HarvestConfig, Harvester, ModeFilter, OutputFormat,
};

#[derive(Debug, Parser)]
#[command(name = "rrchirp", version)]
#[command(about = "Harvest RadioReference frequency listings into CHIRP channel files")]
struct Cli {
    /// Config file (defaults to ./rrchirp.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Look up frequencies for a ZIP code, city or county
    Lookup(LookupArgs),
    /// Write the 22 GMRS/FRS channels
    Gmrs(OutputArgs),
    /// Write the 7 NOAA weather radio channels
    Noaa(OutputArgs),
    /// Inspect or rebuild the county id cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("location").required(true).args(["zipcode", "city", "county"])))]
struct LookupArgs {
    /// 5-digit ZIP code
    #[arg(long)]
    zipcode: Option<String>,

    #[arg(long, requires = "state")]
    city: Option<String>,

    #[arg(long, requires = "state")]
    county: Option<String>,

    /// State code or name (required with --city and --county)
    #[arg(long)]
    state: Option<String>,

    /// Keep only matching modes (FM, Digital, DMR, P25, ...)
    #[arg(short, long)]
    filter: Option<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Output file; a .txt extension selects the text report
    #[arg(short, long, default_value = "frequencies.csv")]
    output: PathBuf,

    /// Output format, detected from the file extension when omitted
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Append to the output file instead of overwriting it
    #[arg(short, long)]
    append: bool,
}

impl OutputArgs {
    fn format(&self) -> OutputFormat {
        match self.format {
            Some(FormatArg::Csv) => OutputFormat::Csv,
            Some(FormatArg::Txt) => OutputFormat::Txt,
            None => OutputFormat::from_path(&self.output),
        }
    }

    /// Numbering context for rows written to this output
    fn append_context(&self, scope: Option<String>) -> Result<AppendContext> {
        let existing_max_location = if self.append && self.format() == OutputFormat::Csv {
            existing_max_location(&self.output)
                .with_context(|| format!("Cannot append to {:?}", self.output))?
        } else {
            None
        };
        Ok(AppendContext {
            existing_max_location,
            scope,
        })
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Txt,
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Re-scrape county ids for one state, or all states
    Rebuild {
        #[arg(long)]
        state: Option<String>,
    },
    /// Print cached county ids
    Show {
        #[arg(long)]
        state: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HarvestConfig::load_or_default(cli.config.as_deref())?;

    let _logging_guard = init_logging(&config.log_dir, "rrchirp", &config.log_level)
        .context("Failed to initialize logging")?;

    let result = match cli.command {
        Commands::Lookup(args) => lookup(&config, args).await,
        Commands::Gmrs(output) => write_preset(presets::gmrs_frs(), &output),
        Commands::Noaa(output) => write_preset(presets::noaa_weather(), &output),
        Commands::Cache(CacheCommand::Rebuild { state }) => rebuild_cache(&config, state.as_deref()).await,
        Commands::Cache(CacheCommand::Show { state }) => show_cache(&config, state.as_deref()).await,
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

fn parse_state(state: Option<&str>) -> Result<Option<UsState>> {
    state
        .map(|s| UsState::parse(s).with_context(|| format!("Unknown state: {}", s)))
        .transpose()
}

fn build_query(args: &LookupArgs) -> Result<LocationQuery> {
    let state = args.state.as_deref().unwrap_or_default();
    let query = if let Some(zip) = &args.zipcode {
        LocationQuery::zip(zip)?
    } else if let Some(city) = &args.city {
        LocationQuery::city(city, state)?
    } else if let Some(county) = &args.county {
        LocationQuery::county(county, state)?
    } else {
        bail!("One of --zipcode, --city or --county is required");
    };
    Ok(query)
}

async fn lookup(config: &HarvestConfig, args: LookupArgs) -> Result<()> {
    let query = build_query(&args)?;
    let filter = args.filter.as_deref().and_then(ModeFilter::new);

    let mut cache = CountyCache::load(&config.cache_path).await;
    let mut harvester = Harvester::from_config(config)?;

    harvester
        .harvest(&query, &mut cache, |location, records| {
            write_lookup(location, records, filter.as_ref(), &args)
        })
        .await
        .with_context(|| format!("Lookup for {} failed", query))
}

fn write_lookup(
    location: ResolvedLocation,
    records: Vec<FrequencyRecord>,
    filter: Option<&ModeFilter>,
    args: &LookupArgs,
) -> Result<()> {
    let total = records.len();
    let context = args.output.append_context(Some(location.scope_label()))?;
    let rows = normalize(records, filter, &context);
    if let Some(mode) = &args.filter {
        tracing::info!("Filtered to {} frequencies (from {}) using mode {}", rows.len(), total, mode);
    }
    if rows.is_empty() {
        bail!("No frequencies left for {} after filtering", location.display_name);
    }

    write_rows(&rows, &args.output)
}

fn write_preset(records: Vec<FrequencyRecord>, output: &OutputArgs) -> Result<()> {
    let context = output.append_context(None)?;
    let rows = normalize(records, None, &context);
    write_rows(&rows, output)
}

fn write_rows(rows: &[ChirpRow], output: &OutputArgs) -> Result<()> {
    write(rows, &output.output, output.format(), output.append)
        .with_context(|| format!("Failed to write {}", output.output.display()))?;
    Ok(())
}

async fn rebuild_cache(config: &HarvestConfig, state: Option<&str>) -> Result<()> {
    let state = parse_state(state)?;
    let mut cache = CountyCache::load(&config.cache_path).await;
    let harvester = Harvester::from_config(config)?;

    let written = harvester
        .rebuild_cache(&mut cache, state)
        .await
        .context("County cache rebuild failed")?;
    match state {
        Some(state) => tracing::info!("Cached {} counties for {}", written, state.name()),
        None => tracing::info!("Cached {} counties across all states", written),
    }
    if !cache.is_persistent() {
        bail!("County cache could not be saved to {:?}", config.cache_path);
    }
    Ok(())
}

async fn show_cache(config: &HarvestConfig, state: Option<&str>) -> Result<()> {
    let state = parse_state(state)?;
    let cache = CountyCache::load(&config.cache_path).await;

    for entry in cache.entries(state) {
        let flag = if entry.conflicted {
            "conflicted"
        } else if entry.verified {
            "verified"
        } else {
            ""
        };
        println!("{}\t{}\t{}\t{}", entry.state, entry.county, entry.id, flag);
    }
    match state {
        Some(state) => println!("{} counties cached for {}", cache.count_for(state), state.name()),
        None => println!("{} counties cached", cache.len()),
    }
    Ok(())
}
