//! CLI tool for inspecting store snapshots.
//!
//! # Usage
//!
//! ```bash
//! marga-inspect --store office.json maps
//! marga-inspect --store office.json routes --node 3
//! marga-inspect --store office.json --config marga.toml validate
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use marga::core::{NodeId, Waypoint, validate_sequence};
use marga::store::{StoreSnapshot, rows::WaypointRow};
use marga::{MargaConfig, MemoryStore, PathStore, Result, RouteMatcher};

/// Inspect maps, routes and waypoint integrity of a Marga store snapshot
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store snapshot (JSON)
    #[arg(short, long)]
    store: PathBuf,

    /// Configuration file (TOML); defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List maps with node and path counts
    Maps,

    /// List routes starting at a node, shortest first
    Routes {
        #[arg(long)]
        node: u64,
    },

    /// Check every path's waypoint sequence and embedding dimensions
    Validate,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marga=info")),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when validation found problems.
fn run(args: Args) -> Result<bool> {
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            MargaConfig::load(path)?
        }
        None => MargaConfig::default(),
    };

    match args.command {
        Command::Maps => {
            let store = MemoryStore::load_snapshot(&args.store)?;
            list_maps(&store)?;
            Ok(true)
        }
        Command::Routes { node } => {
            let store = Arc::new(MemoryStore::load_snapshot(&args.store)?);
            list_routes(store, NodeId(node), &config)?;
            Ok(true)
        }
        Command::Validate => validate(&args.store, &config),
    }
}

fn list_maps(store: &MemoryStore) -> Result<()> {
    let maps = store.maps()?;
    if maps.is_empty() {
        println!("No maps");
    }
    for map in maps {
        let nodes = store.nodes(map.id)?.len();
        let paths = store.paths_on_map(map.id)?.len();
        println!("{:>4}  {:<24} {:>3} nodes  {:>3} paths", map.id, map.name, nodes, paths);
    }
    Ok(())
}

fn list_routes(store: Arc<MemoryStore>, node: NodeId, config: &MargaConfig) -> Result<()> {
    let from = store.node(node)?;
    let matcher = RouteMatcher::new(store, config.navigation.walking_speed_mps);
    let routes = matcher.available_routes(node)?;

    println!("Routes from {} ({})", from.name, from.id);
    if routes.is_empty() {
        println!("  none");
    }
    for route in routes {
        println!(
            "  {:>4}  {:<28} -> {:<16} {:>8} {:>8}  {} waypoints",
            route.path.id,
            route.path.name,
            route.end_name,
            route.distance_text,
            route.duration_text,
            route.len()
        );
    }
    Ok(())
}

/// Row-level checks first, so one broken path does not hide the others.
fn validate(path: &Path, config: &MargaConfig) -> Result<bool> {
    let bytes = fs::read(path)?;
    let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
    let dim = config.localization.embedding_dim;

    let mut by_path: BTreeMap<i64, Vec<WaypointRow>> = BTreeMap::new();
    for row in &snapshot.path_waypoints {
        by_path.entry(row.path_id).or_default().push(row.clone());
    }

    let mut failures = 0usize;
    for path_row in &snapshot.navigation_paths {
        let rows = by_path.remove(&path_row.id).unwrap_or_default();
        match check_path(rows, dim) {
            Ok(count) => println!("ok    path {:>4} '{}' ({} waypoints)", path_row.id, path_row.name, count),
            Err(e) => {
                failures += 1;
                println!("FAIL  path {:>4} '{}': {}", path_row.id, path_row.name, e);
            }
        }
    }
    for (orphan, rows) in by_path {
        failures += 1;
        println!("FAIL  {} waypoints reference missing path {}", rows.len(), orphan);
    }

    if failures == 0
        && let Err(e) = MemoryStore::from_snapshot(snapshot)
    {
        failures += 1;
        println!("FAIL  store: {}", e);
    }

    if failures == 0 {
        println!("All paths valid");
    } else {
        println!("{} problem(s) found", failures);
    }
    Ok(failures == 0)
}

fn check_path(rows: Vec<WaypointRow>, dim: usize) -> Result<usize> {
    let mut waypoints = rows
        .into_iter()
        .map(Waypoint::try_from)
        .collect::<Result<Vec<_>>>()?;
    if waypoints.is_empty() {
        return Err(marga::MargaError::InvalidRecord("no waypoints".into()));
    }
    waypoints.sort_by_key(Waypoint::sequence_number);
    validate_sequence(waypoints.iter().map(Waypoint::sequence_number))?;

    if let Some(bad) = waypoints.iter().find(|w| w.embedding().len() != dim) {
        return Err(marga::MargaError::InvalidRecord(format!(
            "waypoint {} has {} dimensions, expected {}",
            bad.sequence_number(),
            bad.embedding().len(),
            dim
        )));
    }
    Ok(waypoints.len())
}
