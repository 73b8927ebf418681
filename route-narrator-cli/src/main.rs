mod host;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use route_narrator::store::{new_saved_route, MemorySlot, SlotStore};
use route_narrator::{
    Capabilities, Clock, Geolocation, NavConfig, NavigationEngine, Position, RouteResolver,
    RouteStore, SavedRoute, Speech, UserPrompt, Waypoint,
};

use crate::host::{CliPrompt, ConsoleSpeech, FileSlot, SimulatedGeolocation, SystemClock};

#[derive(Parser)]
struct Args {
    /// Path to a JSON file overriding the default settings
    #[arg(long)]
    config: Option<String>,

    /// Where saved routes are kept
    #[arg(long, default_value = "routes.json")]
    store: PathBuf,

    /// Log every step
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve waypoints once and read out the steps
    Resolve {
        /// A waypoint as `lat,lng`. Repeat at least twice.
        #[arg(long = "waypoint", required = true, value_parser = parse_waypoint)]
        waypoints: Vec<Waypoint>,

        /// Also write the route and waypoints as GeoJSON here
        #[arg(long)]
        geojson: Option<String>,
    },
    /// Save a route
    Save {
        #[arg(long)]
        name: String,

        /// A waypoint as `lat,lng`. Repeat for each one.
        #[arg(long = "waypoint", required = true, value_parser = parse_waypoint)]
        waypoints: Vec<Waypoint>,
    },
    /// List saved routes
    List,
    /// Delete a saved route
    Delete {
        #[arg(long)]
        id: i64,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Simulate a journey along a saved route, narrating the instructions
    Journey {
        #[arg(long)]
        id: i64,

        /// Seconds between simulated position fixes
        #[arg(long, default_value_t = 5)]
        fix_interval_secs: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    simple_logger::init_with_level(if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    })?;

    let config = match &args.config {
        Some(path) => NavConfig::from_json(
            &std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?,
        )
        .with_context(|| format!("parsing {path}"))?,
        None => NavConfig::default(),
    };
    let resolver = RouteResolver::new(&config.route_api);

    match args.command {
        Command::Resolve { waypoints, geojson } => {
            if waypoints.len() < 2 {
                bail!("Resolving needs at least 2 waypoints");
            }
            // Preview an unsaved route by selecting it from a throwaway store
            let mut scratch = SlotStore::new(MemorySlot::new());
            scratch.append(SavedRoute {
                id: 0,
                name: "Ad hoc".to_string(),
                waypoints,
            })?;
            let mut engine = build_engine(
                config,
                Box::new(scratch),
                Box::new(CliPrompt::new(true)),
                None,
            );
            engine.load_route(0)?;
            drive(&mut engine, &resolver).await?;

            if let Some(path) = geojson {
                std::fs::write(&path, engine.render_geojson())
                    .with_context(|| format!("writing {path}"))?;
                info!("Wrote {path}");
            }
        }
        Command::Save { name, waypoints } => {
            let route = save(args.store, &name, waypoints)?;
            println!("Saved {:?} as {}", route.name, route.id);
        }
        Command::List => {
            let store = SlotStore::new(FileSlot::new(args.store));
            for route in store.get_all()? {
                println!(
                    "{}\t{}\t{} waypoints",
                    route.id,
                    route.name,
                    route.waypoints.len()
                );
            }
        }
        Command::Delete { id, yes } => {
            let mut engine = build_engine(
                config,
                Box::new(SlotStore::new(FileSlot::new(args.store))),
                Box::new(CliPrompt::new(yes)),
                None,
            );
            if !engine.saved_routes().iter().any(|r| r.id == id) {
                bail!("No saved route {id}");
            }
            if !engine.delete_route(id)? {
                println!("Kept route {id}");
            }
        }
        Command::Journey {
            id,
            fix_interval_secs,
        } => {
            let geolocation = SimulatedGeolocation::default();
            let mut engine = build_engine(
                config,
                Box::new(SlotStore::new(FileSlot::new(args.store))),
                Box::new(CliPrompt::new(true)),
                Some(geolocation.clone()),
            );
            engine.load_route(id)?;
            drive(&mut engine, &resolver).await?;
            journey(
                &mut engine,
                &resolver,
                &geolocation,
                Duration::from_secs(fix_interval_secs.max(1)),
            )
            .await?;
        }
    }
    Ok(())
}

/// Appends a route to the file store. Blank names are refused before anything is written.
fn save(path: PathBuf, name: &str, waypoints: Vec<Waypoint>) -> Result<SavedRoute> {
    let mut store = SlotStore::new(FileSlot::new(path));
    let route = new_saved_route(&store.get_all()?, SystemClock.now_ms(), name, waypoints)?;
    store.append(route.clone())?;
    Ok(route)
}

fn build_engine(
    config: NavConfig,
    store: Box<dyn RouteStore>,
    prompt: Box<dyn UserPrompt>,
    geolocation: Option<SimulatedGeolocation>,
) -> NavigationEngine {
    NavigationEngine::new(
        config,
        Capabilities {
            clock: Box::new(SystemClock),
            speech: Some(Box::new(ConsoleSpeech::default()) as Box<dyn Speech>),
            geolocation: geolocation.map(|g| Box::new(g) as Box<dyn Geolocation>),
            prompt,
            store,
        },
    )
}

/// Runs queued resolutions one at a time, so none of them go stale.
async fn drive(engine: &mut NavigationEngine, resolver: &RouteResolver) -> Result<()> {
    loop {
        let requests = engine.take_resolve_requests();
        if requests.is_empty() {
            return Ok(());
        }
        for req in requests {
            let result = resolver.resolve(&req.waypoints).await;
            engine.complete_resolution(req.seq, result)?;
        }
    }
}

/// Walks the route's waypoints, reporting one as the current position every `fix_interval`, and
/// polls narration until every instruction has been spoken.
async fn journey(
    engine: &mut NavigationEngine,
    resolver: &RouteResolver,
    geolocation: &SimulatedGeolocation,
    fix_interval: Duration,
) -> Result<()> {
    engine.start_journey()?;
    let Some(watch) = geolocation.active() else {
        bail!("Tracking didn't start");
    };
    let mut fixes = engine
        .state()
        .waypoints()
        .iter()
        .map(|w| to_position(*w))
        .collect::<Vec<_>>()
        .into_iter();
    let mut next_fix_ms = 0;

    loop {
        let now = SystemClock.now_ms();
        if now >= next_fix_ms {
            if let Some(position) = fixes.next() {
                engine.on_position(watch, position);
                if let Err(err) = drive(engine, resolver).await {
                    // The next fix tries again
                    warn!("{err}");
                }
                next_fix_ms = now + fix_interval.as_millis() as u64;
            } else if !engine.narrator().is_started() {
                warn!("Out of positions before any instructions arrived");
                break;
            } else {
                next_fix_ms = u64::MAX;
            }
        }

        engine.tick();
        if engine.narrator().is_started() && engine.narration_timer().is_none() {
            break;
        }

        let now = SystemClock.now_ms();
        let wake_at = match engine.narration_timer() {
            Some(timer) => timer.due_at_ms.min(next_fix_ms),
            None => next_fix_ms,
        };
        tokio::time::sleep(Duration::from_millis(wake_at.saturating_sub(now).max(10))).await;
    }

    engine.stop_journey()?;
    Ok(())
}

fn to_position(waypt: Waypoint) -> Position {
    Position {
        lat: waypt.lat,
        lng: waypt.lng,
        accuracy_meters: None,
        timestamp_ms: SystemClock.now_ms(),
    }
}

fn parse_waypoint(raw: &str) -> Result<Waypoint, String> {
    let Some((lat, lng)) = raw.split_once(',') else {
        return Err(format!("{raw:?} isn't lat,lng"));
    };
    let lat = lat.trim().parse::<f64>().map_err(|err| err.to_string())?;
    let lng = lng.trim().parse::<f64>().map_err(|err| err.to_string())?;
    Waypoint::new(lat, lng).ok_or_else(|| format!("{raw:?} isn't a finite coordinate"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_waypoint() {
        let waypt = parse_waypoint("21.8853, -102.2916").unwrap();
        assert_eq!(waypt.lat, 21.8853);
        assert_eq!(waypt.lng, -102.2916);

        assert!(parse_waypoint("21.8853").is_err());
        assert!(parse_waypoint("north,west").is_err());
        assert!(parse_waypoint("NaN,1").is_err());
    }

    #[test]
    fn test_save_refuses_blank_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        let waypoints = vec![parse_waypoint("1,2").unwrap()];

        for name in ["", "   "] {
            assert!(save(path.clone(), name, waypoints.clone()).is_err());
        }
        assert!(!path.exists());

        let first = save(path.clone(), " Commute ", waypoints.clone()).unwrap();
        assert_eq!(first.name, "Commute");
        let second = save(path.clone(), "Commute back", waypoints).unwrap();
        assert_ne!(first.id, second.id);

        let store = SlotStore::new(FileSlot::new(path));
        assert_eq!(store.get_all().unwrap().len(), 2);
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "route-narrator",
            "--store",
            "mine.json",
            "resolve",
            "--waypoint",
            "21.88,-102.29",
            "--waypoint",
            "21.89,-102.30",
        ])
        .unwrap();
        assert_eq!(args.store, PathBuf::from("mine.json"));
        match args.command {
            Command::Resolve { waypoints, geojson } => {
                assert_eq!(waypoints.len(), 2);
                assert!(geojson.is_none());
            }
            _ => panic!("wrong subcommand"),
        }

        assert!(Args::try_parse_from(["route-narrator", "save", "--name", "x"]).is_err());
    }
}
