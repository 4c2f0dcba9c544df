//! bibfilter: beam-induced background filtering for event files.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use bibfilter_algorithms::{
    run_events, run_events_parallel, ArrivalWindow, CalibrationSource, FilterRegistry,
    FilterSettings, RunResources, TimeWindow,
};
use bibfilter_io::{load_calibration, write_hits_csv, EventFileReader, EventFileWriter};
use clap::{ArgAction, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    BibfilterIo(#[from] bibfilter_io::Error),

    #[error("{0}")]
    Core(#[from] bibfilter_core::Error),
}

/// Beam-induced background rejection for detector hit collections.
#[derive(Parser)]
#[command(name = "bibfilter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one filter over an event file
    Filter(FilterArgs),

    /// Show per-collection counts of an event file
    Info {
        /// Input event file (JSON Lines)
        input: PathBuf,
    },

    /// List the available filters
    List,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Input event file (JSON Lines)
    input: PathBuf,

    /// Output event file
    #[arg(short, long)]
    output: PathBuf,

    /// Filter to run (see `bibfilter list`)
    #[arg(short, long)]
    mode: String,

    /// JSON settings file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input hit collection
    #[arg(long)]
    input_collection: Option<String>,

    /// Output hit collection
    #[arg(long)]
    output_collection: Option<String>,

    /// Input relation collection; enables relation output
    #[arg(long)]
    input_relations: Option<String>,

    /// Sigma multiplier for dynamic thresholds
    #[arg(long)]
    n_sigma: Option<f64>,

    /// Number of calorimeter layers
    #[arg(long)]
    layers: Option<usize>,

    /// Flat energy threshold overriding the computed one (0 disables)
    #[arg(long)]
    flat_threshold: Option<f64>,

    /// Lower edge of the time window (ns)
    #[arg(long, requires = "time_max", allow_hyphen_values = true)]
    time_min: Option<f64>,

    /// Upper edge of the time window (ns, exclusive)
    #[arg(long, requires = "time_min", allow_hyphen_values = true)]
    time_max: Option<f64>,

    /// Compare baseline-subtracted energy against the threshold
    #[arg(long)]
    subtract_baseline: bool,

    /// Calibration map file (JSON)
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Process events in parallel
    #[arg(long)]
    parallel: bool,

    /// Also dump the output collection as CSV
    #[arg(long, requires = "output_collection")]
    csv: Option<PathBuf>,
}

impl FilterArgs {
    /// Loads the settings file, then applies command-line overrides.
    fn settings(&self) -> Result<FilterSettings> {
        let mut settings = match &self.config {
            Some(path) => FilterSettings::from_file(path)?,
            None => FilterSettings::default(),
        };

        if let Some(name) = &self.input_collection {
            settings.input_collection = Some(name.clone());
        }
        if let Some(name) = &self.output_collection {
            settings.output_collection = Some(name.clone());
        }
        if let Some(name) = &self.input_relations {
            settings.input_relations = Some(name.clone());
        }

        let mut threshold = settings.threshold.clone();
        if let Some(n_sigma) = self.n_sigma {
            threshold = threshold.with_n_sigma(n_sigma);
        }
        if let Some(layers) = self.layers {
            threshold = threshold.with_n_layers(layers);
        }
        if let Some(flat) = self.flat_threshold {
            threshold = threshold.with_flat_threshold(flat);
        }
        settings.threshold = threshold;

        if let (Some(min), Some(max)) = (self.time_min, self.time_max) {
            settings.time_window = ArrivalWindow {
                min,
                max,
                ..settings.time_window
            };
            settings.classifier = settings
                .classifier
                .with_time_window(TimeWindow::new(min, max));
        }
        if self.subtract_baseline {
            settings.classifier = settings.classifier.with_subtract_baseline(true);
        }

        if let Some(path) = &self.calibration {
            match &mut settings.calibration {
                Some(source) => source.path.clone_from(path),
                None => settings.calibration = Some(CalibrationSource::new(path)),
            }
        }

        Ok(settings)
    }
}

fn init_logging(verbose: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
        }
    }
    builder.init();
}

fn run_filter(args: &FilterArgs) -> Result<()> {
    let settings = args.settings()?;
    let registry = FilterRegistry::with_defaults();
    if !registry.contains(&args.mode) {
        return Err(bibfilter_core::Error::UnknownFilter(args.mode.clone()).into());
    }

    let mut resources = RunResources::new(&settings);
    if let Some(source) = &settings.calibration {
        let map = load_calibration(source)?;
        resources = resources.with_calibration(&map, &settings);
    }

    let reader = EventFileReader::open(&args.input)?;
    let mut events = reader.read_all()?;
    log::info!(
        "read {} events from {}",
        events.len(),
        args.input.display()
    );

    let start = Instant::now();
    let stats = if args.parallel {
        run_events_parallel(&mut events, || {
            registry.create(&args.mode, &settings, &resources)
        })?
    } else {
        let mut filter = registry.create(&args.mode, &settings, &resources)?;
        run_events(filter.as_mut(), events.iter_mut())?
    };
    let elapsed = start.elapsed();

    let mut writer = EventFileWriter::create(&args.output)?;
    writer.write_events(&events)?;
    writer.flush()?;

    if let (Some(csv), Some(name)) = (&args.csv, &settings.output_collection) {
        let collections = events
            .iter()
            .filter_map(|e| e.hit_collection(name).ok().map(|c| (e.number, c)));
        write_hits_csv(csv, collections)?;
        log::info!("wrote {} hits to {}", name, csv.display());
    }

    println!(
        "Filtered {} events with '{}' in {:.2}s",
        stats.events_processed,
        args.mode,
        elapsed.as_secs_f64()
    );
    if stats.events_skipped > 0 {
        println!("Skipped events: {}", stats.events_skipped);
    }
    println!(
        "Hits: {} -> {} ({:.2}% kept)",
        stats.hits_in,
        stats.hits_out,
        stats.acceptance() * 100.0
    );
    println!("Output: {}", args.output.display());
    Ok(())
}

#[derive(Default)]
struct CollectionCounts {
    events: usize,
    entries: usize,
}

fn tally<'a, I>(counts: &mut BTreeMap<String, CollectionCounts>, items: I)
where
    I: IntoIterator<Item = (&'a String, usize)>,
{
    for (name, len) in items {
        let entry = counts.entry(name.clone()).or_default();
        entry.events += 1;
        entry.entries += len;
    }
}

fn info(input: &Path) -> Result<()> {
    let reader = EventFileReader::open(input)?;
    println!("File: {}", input.display());
    println!(
        "Size: {} bytes ({:.2} MB)",
        reader.file_size(),
        reader.file_size() as f64 / 1_000_000.0
    );
    println!("Events: {}", reader.event_count());

    let mut hits = BTreeMap::new();
    let mut relations = BTreeMap::new();
    let mut tracks = BTreeMap::new();
    let mut particles = BTreeMap::new();
    for event in reader.events() {
        let event = event?;
        tally(&mut hits, event.hits.iter().map(|(k, c)| (k, c.len())));
        tally(&mut relations, event.relations.iter().map(|(k, r)| (k, r.len())));
        tally(&mut tracks, event.tracks.iter().map(|(k, t)| (k, t.len())));
        tally(&mut particles, event.particles.iter().map(|(k, p)| (k, p.len())));
    }

    for (kind, counts) in [
        ("hits", &hits),
        ("relations", &relations),
        ("tracks", &tracks),
        ("particles", &particles),
    ] {
        for (name, c) in counts {
            println!(
                "  {:<10} {:<32} {:>8} events {:>10} entries",
                kind, name, c.events, c.entries
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Filter(args) => run_filter(&args)?,
        Commands::Info { input } => info(&input)?,
        Commands::List => {
            for name in FilterRegistry::with_defaults().names() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
