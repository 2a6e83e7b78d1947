use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;

use crate::map::{DensityStyle, BASE_ALPHA, BASE_RADIUS};
use crate::model::Coordinate;
use crate::prelude::*;
use crate::raster::Rgba;
use crate::store::{MemoryStore, SampleStore, SqliteStore};
use crate::tracking::{ReplaySource, SimulatedSource, Source};

/// San Francisco, where the view opens when nothing has been recorded
pub const DEFAULT_CENTER: Coordinate = Coordinate::new(37.7749, -122.4194);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Random walk around --start-lat/--start-lon
    Simulated,
    /// Play back a JSON-lines track given with --track
    Replay,
}

/// Record positions and watch them pile up into a heat map
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// SQLite database holding recorded samples
    #[arg(long, default_value = "samples.db3")]
    pub db: PathBuf,

    /// Keep samples in memory only, nothing is written to disk
    #[arg(long)]
    pub memory: bool,

    /// Seconds between position requests
    #[arg(long, default_value = "10", value_parser = parse_interval)]
    pub interval: Duration,

    /// Where fixes come from
    #[arg(long, value_enum, default_value_t = SourceKind::Simulated)]
    pub source: SourceKind,

    /// Track file for the replay source
    #[arg(long, required_if_eq("source", "replay"))]
    pub track: Option<PathBuf>,

    /// Start the track over when it runs out
    #[arg(long)]
    pub loop_track: bool,

    /// Latitude the simulated walk starts from
    #[arg(long, default_value_t = DEFAULT_CENTER.lat, allow_negative_numbers = true)]
    pub start_lat: f64,

    /// Longitude the simulated walk starts from
    #[arg(long, default_value_t = DEFAULT_CENTER.lon, allow_negative_numbers = true)]
    pub start_lon: f64,

    /// Average distance the simulated walk covers per fix, meters
    #[arg(long, default_value_t = 25.0)]
    pub step_m: f64,

    /// Share of simulated requests that fail
    #[arg(long, default_value_t = 0.1, value_parser = parse_unit)]
    pub failure_ratio: f64,

    /// Seed for the simulated walk
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Radius of the outermost heat circle, pixels
    #[arg(long, default_value_t = BASE_RADIUS)]
    pub radius: f64,

    /// Opacity of the outermost heat circle
    #[arg(long, default_value_t = BASE_ALPHA as f64, value_parser = parse_unit)]
    pub alpha: f64,

    /// Begin sampling as soon as the map opens
    #[arg(long)]
    pub autostart: bool,

    /// Write logs to this file (the terminal belongs to the map)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// More logging, repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

fn parse_interval(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if !(secs.is_finite() && secs > 0.0) {
        return Err("interval must be a positive number of seconds".into());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn parse_unit(raw: &str) -> Result<f64, String> {
    let v: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if !(0.0..=1.0).contains(&v) {
        return Err("must be between 0 and 1".into());
    }
    Ok(v)
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn style(&self) -> DensityStyle {
        DensityStyle {
            color: Rgba::RED,
            base_radius: self.radius.max(0.0),
            base_alpha: self.alpha as f32,
        }
    }

    pub fn open_store(&self) -> Result<Arc<dyn SampleStore>> {
        if self.memory {
            return Ok(Arc::new(MemoryStore::new()));
        }
        Ok(Arc::new(SqliteStore::open(&self.db)?))
    }

    pub fn build_source(&self) -> Result<Source> {
        match self.source {
            SourceKind::Simulated => Ok(Source::Simulated(SimulatedSource::new(
                Coordinate::new(self.start_lat, self.start_lon),
                self.step_m,
                self.failure_ratio,
                self.seed,
            ))),
            SourceKind::Replay => {
                let path = self.track.as_deref().context("--track is required for the replay source")?;
                Ok(Source::Replay(ReplaySource::load(path, self.loop_track)?))
            }
        }
    }
}
