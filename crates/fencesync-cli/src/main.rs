//! FenceSync command-line entry point.

use clap::{Parser, Subcommand};
use fencesync_cli::{Station, StationError, describe};
use fencesync_core::storage::{FileStorage, Storage};
use fencesync_core::{FenceConfig, FenceDocument, GeoCoordinate};
use std::path::PathBuf;

/// Plan geofences and synchronize them with a vehicle
#[derive(Parser, Debug)]
#[command(name = "fencesync", version)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Vehicle link URL, overriding the configuration
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the vehicle's fence
    Pull {
        /// Store the downloaded fence as a plan
        #[arg(long, value_name = "ID")]
        save: Option<String>,
    },
    /// Upload a stored plan to the vehicle
    Push { id: String },
    /// Remove the fence from the vehicle
    Clear,
    /// Print a stored plan
    Show {
        id: String,
        /// Print the stored JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// List stored plans
    List,
    /// Print vehicle fence support
    Info,
    /// Create a plan with one inclusion shape inside a box
    New {
        id: String,
        /// Top left corner of the box as LAT,LON
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        top_left: GeoCoordinate,
        /// Bottom right corner of the box as LAT,LON
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        bottom_right: GeoCoordinate,
        /// Use a circle instead of a rectangle
        #[arg(long)]
        circle: bool,
        /// Breach return point as LAT,LON
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        breach_return: Option<GeoCoordinate>,
        /// Breach return altitude in meters
        #[arg(long)]
        breach_altitude: Option<f64>,
    },
}

fn parse_coordinate(text: &str) -> Result<GeoCoordinate, String> {
    let (lat, lon) = text
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{}'", text))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("latitude: {}", e))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("longitude: {}", e))?;
    let coordinate = GeoCoordinate::new(lat, lon);
    if !coordinate.is_valid() {
        return Err(format!("{} is not a valid coordinate", text));
    }
    Ok(coordinate)
}

fn load_config(args: &Args) -> Result<FenceConfig, StationError> {
    let mut config = match &args.config {
        Some(path) => FenceConfig::load(path)?,
        None => FenceConfig::load_default()?,
    };
    if let Some(url) = &args.url {
        config.vehicle_url = url.clone();
    }
    Ok(config)
}

fn open_storage(config: &FenceConfig) -> Result<FileStorage, StationError> {
    match config.storage_dir() {
        Some(dir) => Ok(FileStorage::new(dir)?),
        None => Ok(FileStorage::default_location()?),
    }
}

fn load_plan(storage: &FileStorage, config: &FenceConfig, id: &str) -> Result<FenceDocument, StationError> {
    let json = pollster::block_on(storage.load(id))?;
    let mut document = FenceDocument::new(config.altitude);
    document.load(&json)?;
    Ok(document)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = load_config(&args)?;
    let storage = open_storage(&config)?;
    log::debug!("Plans stored in {}", storage.base_path().display());

    match args.command {
        Command::Pull { save } => {
            let mut station = Station::connect(&config, FenceDocument::new(config.altitude))?;
            station.pull()?;
            print!("{}", describe(station.document()));
            if let Some(id) = save {
                pollster::block_on(storage.save(&id, &station.document().save()))?;
                log::info!("Saved plan {}", id);
            }
        }
        Command::Push { id } => {
            let plan = pollster::block_on(storage.load(&id))?;
            let mut station = Station::connect(&config, FenceDocument::new(config.altitude))?;
            station.install_plan(&plan)?;
            station.push()?;
            log::info!("Plan {} stored on vehicle", id);
        }
        Command::Clear => {
            let mut station = Station::connect(&config, FenceDocument::new(config.altitude))?;
            station.clear()?;
            log::info!("Vehicle fence removed");
        }
        Command::Show { id, json } => {
            if json {
                let plan = pollster::block_on(storage.load(&id))?;
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print!("{}", describe(&load_plan(&storage, &config, &id)?));
            }
        }
        Command::List => {
            for id in pollster::block_on(storage.list())? {
                println!("{}", id);
            }
        }
        Command::Info => {
            let mut station = Station::connect(&config, FenceDocument::new(config.altitude))?;
            station.wait_for_initial_load()?;
            let sync = station.sync();
            println!("Fence shapes supported: {}", sync.supported());
            if let Some(peer) = sync.capability().peer() {
                println!("Capability bits: {:#x}", peer.capability_bits);
                println!("Protocol version: {}", peer.max_protocol_version);
            }
            println!("Legacy fence radius: {} m", sync.legacy_fence_radius());
            print!("{}", describe(station.document()));
        }
        Command::New {
            id,
            top_left,
            bottom_right,
            circle,
            breach_return,
            breach_altitude,
        } => {
            let mut document = FenceDocument::new(config.altitude);
            if circle {
                document.add_inclusion_circle(top_left, bottom_right);
            } else {
                document.add_inclusion_polygon(top_left, bottom_right);
            }
            document.set_breach_return(breach_return);
            if let Some(altitude) = breach_altitude {
                document.set_breach_altitude(altitude)?;
            }
            pollster::block_on(storage.save(&id, &document.save()))?;
            print!("{}", describe(&document));
        }
    }

    Ok(())
}
