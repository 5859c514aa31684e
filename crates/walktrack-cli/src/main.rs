//! walktrack - command-line driver for the walktrack progress engine.
//!
//! Runs a rehearsal against in-memory backends: seeds a test cohort, sends
//! it out onto the routes, replays a burst of concurrent check-ins and prints
//! the marshals' timeout report as JSON.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use walktrack_core::{
    CheckInIntent, EngineConfig, LogNotifier, MemoryCache, MemoryStore, PersonType, PointGroup,
    ProgressEngine, Route, TimeoutScanner,
};

const USAGE: &str = "\
Usage:
  walktrack demo [--teams N] [--route CODE] [--minutes M] [--type TYPE]
  walktrack points [--route CODE]
  walktrack config";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[derive(Debug, Default)]
struct Options {
    teams: Option<usize>,
    route: Option<Route>,
    minutes: Option<u32>,
    person_type: Option<PersonType>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = Self::default();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let value = iter
                .next()
                .with_context(|| format!("Missing value for {}", flag))?;
            match flag.as_str() {
                "--teams" => options.teams = Some(value.parse().context("Invalid --teams")?),
                "--minutes" => options.minutes = Some(value.parse().context("Invalid --minutes")?),
                "--route" => {
                    let code: u8 = value.parse().context("Invalid --route")?;
                    options.route = Some(
                        Route::from_code(code)
                            .with_context(|| format!("Unknown route code {}", code))?,
                    );
                }
                "--type" => {
                    options.person_type = Some(
                        value
                            .parse()
                            .map_err(|_| anyhow::anyhow!("Unknown person type {}", value))?,
                    )
                }
                other => bail!("Unknown option {}\n\n{}", other, USAGE),
            }
        }
        Ok(options)
    }

    fn routes(&self) -> Vec<Route> {
        match self.route {
            Some(route) => vec![route],
            None => Route::ALL.to_vec(),
        }
    }
}

#[derive(Serialize)]
struct RouteReport {
    route: Route,
    code: u8,
    name: &'static str,
    groups: Vec<PointGroup>,
}

#[derive(Serialize)]
struct RoutePoints {
    code: u8,
    name: &'static str,
    terminal: i8,
    points: &'static [&'static str],
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    let options = Options::parse(rest)?;

    match command.as_str() {
        "demo" => run_demo(options).await,
        "points" => print_points(&options),
        "config" => print_config(),
        other => bail!("Unknown command {}\n\n{}", other, USAGE),
    }
}

fn load_config() -> EngineConfig {
    match EngineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Falling back to default configuration");
            let mut config = EngineConfig::default();
            config.apply_env_overrides();
            config
        }
    }
}

fn print_config() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&load_config())?);
    Ok(())
}

fn print_points(options: &Options) -> Result<()> {
    let points: Vec<RoutePoints> = options
        .routes()
        .into_iter()
        .map(|route| RoutePoints {
            code: route.code(),
            name: route.display_name(),
            terminal: route.terminal_index(),
            points: route.checkpoints(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&points)?);
    Ok(())
}

async fn run_demo(options: Options) -> Result<()> {
    let config = load_config();
    let minutes = options.minutes.unwrap_or(config.overdue_minutes);
    let team_count = options.teams.unwrap_or(10);

    let store = Arc::new(MemoryStore::new());
    let engine = ProgressEngine::new(
        store.clone(),
        Arc::new(MemoryCache::new()),
        Arc::new(LogNotifier),
        config.clone(),
    );
    let scanner = TimeoutScanner::new(store.clone());

    let team_ids = engine.create_test_cohort(team_count).await?;
    let summary = engine.advance_test_cohort().await?;
    info!(teams = summary.teams, persons = summary.persons, "Cohort on the routes");

    // Every other team loses its last member; even-numbered teams check in
    // their captain.
    let last = config.test_team_size.saturating_sub(1);
    let scans = (0..team_ids.len()).map(|i| {
        let engine = engine.clone();
        let (person_id, intent) = if i % 2 == 0 {
            (format!("{}{}team0", config.test_person_prefix, i), CheckInIntent::Arrived)
        } else {
            (
                format!("{}{}team{}", config.test_person_prefix, i, last),
                CheckInIntent::GaveUp,
            )
        };
        async move { engine.record_check_in(&person_id, intent).await }
    });
    for outcome in join_all(scans).await {
        match outcome {
            Ok(outcome) => info!(
                person = %outcome.person_id,
                walk_status = %outcome.walk_status,
                team_status = %outcome.team_status,
                "Check-in replayed"
            ),
            Err(e) => warn!(error = %e, kind = %e.kind(), "Check-in rejected"),
        }
    }

    let mut reports = Vec::new();
    for route in options.routes() {
        let groups = scanner
            .timeout_report(route, minutes, options.person_type)
            .await?;
        reports.push(RouteReport {
            route,
            code: route.code(),
            name: route.display_name(),
            groups,
        });
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);

    let removed = engine.delete_test_cohort().await?;
    info!(teams = removed.teams, persons = removed.persons, "Cohort removed");
    Ok(())
}
