//! foiltrack CLI - Debug tool for recorded runs
//!
//! Usage:
//!   foiltrack-cli summary <file> [--json]
//!   foiltrack-cli list <dir> [--db <path>]
//!   foiltrack-cli replay <file> [--realtime]
//!   foiltrack-cli import <dir> --db <path>
//!
//! Reads run files in the CSV run format and prints aggregates, speed bands
//! and playback ticks, or imports a directory of runs into SQLite.

use clap::{Parser, Subcommand};
use foiltrack::geo_utils::track_length;
use foiltrack::{
    colored_path, migrate_runs, route_bounds, CsvRunStore, Replay, ReplayConfig, RunStore,
    RunSummary, SpeedBand, SqliteRunStore,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "foiltrack-cli")]
#[command(about = "Debug tool for recorded foiling runs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the aggregates of one run file
    Summary {
        /// CSV run file
        file: PathBuf,

        /// Print the full run as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the runs in a directory or database, newest first
    List {
        /// Directory of gps_data_<runId>.csv files
        dir: PathBuf,

        /// List from this SQLite database instead
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Play a run back with time compression
    Replay {
        /// CSV run file
        file: PathBuf,

        /// Sleep between ticks like the app does
        #[arg(long)]
        realtime: bool,

        /// Animation length in seconds
        #[arg(long, default_value = "30")]
        duration: u64,
    },

    /// Import every CSV run of a directory into a SQLite database
    Import {
        /// Directory of gps_data_<runId>.csv files
        dir: PathBuf,

        /// Target SQLite database
        #[arg(long)]
        db: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let result = match cli.command {
        Commands::Summary { file, json } => run_summary(&file, json),
        Commands::List { dir, db } => run_list(&dir, db.as_deref()),
        Commands::Replay {
            file,
            realtime,
            duration,
        } => run_replay(&file, realtime, duration, cli.verbose),
        Commands::Import { dir, db } => run_import(&dir, &db),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn load_run(file: &Path) -> Result<RunSummary, String> {
    CsvRunStore::load_path(file).ok_or_else(|| format!("could not load run from {}", file.display()))
}

fn print_header(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{}", title);
    println!("{}", "=".repeat(60));
}

fn run_summary(file: &Path, json: bool) -> Result<(), String> {
    let run = load_run(file)?;
    if json {
        println!("{}", run.to_json());
        return Ok(());
    }

    print_header(&format!("Run {}", run.id));
    println!("  Start:     {}", run.start_time);
    match run.end_time {
        Some(end) => println!("  End:       {}", end),
        None => println!("  End:       (no points)"),
    }
    if let Some(duration) = run.duration() {
        println!("  Duration:  {} s", duration.num_seconds());
    }
    println!("  Points:    {}", run.point_count);
    let positions: Vec<_> = run.points.iter().map(|p| p.position()).collect();
    println!("  Track:     {:.0} m", track_length(&positions));
    println!("  Distance:  {:.3} mi", run.distance_miles);
    println!("  Avg speed: {:.2} mph", run.avg_speed_mph);
    println!("  Max speed: {:.2} mph", run.max_speed_mph);
    if let Some(bounds) = route_bounds(&run.points) {
        let center = bounds.center();
        println!(
            "  Center:    {:.5}, {:.5}",
            center.latitude, center.longitude
        );
    }
    Ok(())
}

fn run_list(dir: &Path, db: Option<&Path>) -> Result<(), String> {
    let store: Box<dyn RunStore> = match db {
        Some(db) => Box::new(SqliteRunStore::new(&db.to_string_lossy()).map_err(|e| e.to_string())?),
        None => Box::new(CsvRunStore::new(dir).map_err(|e| e.to_string())?),
    };
    let listings = store.list_runs().map_err(|e| e.to_string())?;

    print_header(&format!("{} runs", listings.len()));
    for listing in listings {
        let start = listing
            .start_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".to_string());
        match listing.totals {
            Some(totals) => println!(
                "  {}  {}  {:>6.2} mi  avg {:>5.2} mph  max {:>5.2} mph  ({} points)",
                listing.id,
                start,
                totals.distance_miles,
                totals.avg_speed_mph,
                totals.max_speed_mph,
                totals.point_count
            ),
            None => println!("  {}  {}", listing.id, start),
        }
    }
    Ok(())
}

fn run_replay(file: &Path, realtime: bool, duration: u64, verbose: bool) -> Result<(), String> {
    let run = load_run(file)?;
    let config = ReplayConfig {
        animation_duration: Duration::from_secs(duration),
        ..ReplayConfig::default()
    };

    let path = colored_path(&run.points, &config.thresholds);
    let mut bands: HashMap<SpeedBand, usize> = HashMap::new();
    for segment in &path {
        *bands.entry(segment.band).or_default() += 1;
    }

    print_header(&format!("Replay of run {} ({} segments)", run.id, path.len()));
    for band in [SpeedBand::Slow, SpeedBand::Moderate, SpeedBand::Fast] {
        println!(
            "  {:<9} #{:06X}  {} segments",
            format!("{:?}", band),
            band.color(),
            bands.get(&band).copied().unwrap_or(0)
        );
    }

    let mut replay = Replay::new(&run.points, config);
    let mut elapsed = Duration::ZERO;
    let mut ticks = 0usize;
    loop {
        let tick = replay.advance(elapsed);
        ticks += 1;
        if verbose && !tick.new_segments.is_empty() {
            println!(
                "  t={:>6} ms  +{} segments  point {}  next in {} ms",
                elapsed.as_millis(),
                tick.new_segments.len(),
                replay.position(),
                tick.next_delay.as_millis()
            );
        }
        if tick.finished {
            break;
        }
        if realtime {
            std::thread::sleep(tick.next_delay);
        }
        // Zero delays would never advance the clock
        elapsed += tick.next_delay.max(Duration::from_millis(1));
    }

    println!(
        "  Finished after {} ticks, {:.1} s of animation time",
        ticks,
        elapsed.as_secs_f64()
    );
    Ok(())
}

fn run_import(dir: &Path, db: &Path) -> Result<(), String> {
    let source = CsvRunStore::new(dir).map_err(|e| e.to_string())?;
    let mut target = SqliteRunStore::new(&db.to_string_lossy()).map_err(|e| e.to_string())?;
    let report = migrate_runs(&source, &mut target).map_err(|e| e.to_string())?;

    print_header("Import");
    println!("  Imported: {}", report.imported.len());
    println!("  Skipped:  {} (already present)", report.skipped.len());
    println!("  Failed:   {}", report.failed.len());
    for id in &report.failed {
        println!("    {}", id);
    }
    Ok(())
}
