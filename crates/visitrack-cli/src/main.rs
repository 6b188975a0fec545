//! `visitrack` command-line driver

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use visitrack_core::{
    keys, FileStore, HttpRemote, IdentityStore, KeyValueStore, NavigationObserver,
    TrackingConfig, TrackingSession, TrackingSnapshot, VisitorRecord,
};

fn cli() -> Command {
    Command::new("visitrack")
        .version(visitrack_core::VERSION)
        .about("Anonymous visitor tracking client")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("api")
                .long("api")
                .global(true)
                .help("Base URL of the tracking API"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("JSON file used as persistent local storage"),
        )
        .arg(
            Arg::new("home")
                .long("home")
                .global(true)
                .help("Route counted as a home visit"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
        .subcommand(
            Command::new("visit")
                .about("Run a tracking session over a sequence of routes")
                .arg(
                    Arg::new("initial-path")
                        .long("initial-path")
                        .default_value("/")
                        .help("Route loaded when the session starts"),
                )
                .arg(
                    Arg::new("paths")
                        .num_args(0..)
                        .help("Routes navigated to after start, in order"),
                ),
        )
        .subcommand(Command::new("show").about("Print the locally cached visitor record"))
        .subcommand(Command::new("identity").about("Print (creating if needed) the visitor identity"))
}

/// File config (or environment only) with command-line overrides applied last
fn resolve_config(matches: &ArgMatches) -> Result<TrackingConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => TrackingConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => TrackingConfig::from_env()?,
    };
    if let Some(api) = matches.get_one::<String>("api") {
        config = config.with_api_base_url(api);
    }
    if let Some(store) = matches.get_one::<PathBuf>("store") {
        config = config.with_storage_path(store);
    }
    if let Some(home) = matches.get_one::<String>("home") {
        config = config.with_home_path(home);
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &TrackingConfig) -> Result<Arc<dyn KeyValueStore>> {
    let Some(path) = &config.storage_path else {
        bail!("no storage file configured; pass --store or set a storage path");
    };
    let store = FileStore::open(path)
        .with_context(|| format!("opening storage at {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn run_visit(config: &TrackingConfig, args: &ArgMatches, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let remote = Arc::new(HttpRemote::from_config(config)?);
    let session = TrackingSession::new(config, store, remote);
    let initial = args
        .get_one::<String>("initial-path")
        .map_or("/", String::as_str);
    let observer = NavigationObserver::new(initial);

    session.start(&observer).await;
    for path in args.get_many::<String>("paths").into_iter().flatten() {
        observer.push(path);
    }
    session.stop().await;
    session.refresh_total().await;

    print_snapshot(&session.snapshot(), json)
}

fn print_snapshot(snapshot: &TrackingSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }
    let identity = snapshot
        .identity
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);
    println!("Visitor:        {identity}");
    println!("State:          {:?}", snapshot.state);
    println!("Home visits:    {}", snapshot.home_visit_count);
    println!("Total visitors: {}", snapshot.total_visitor_count);
    println!("Visited paths:");
    for path in &snapshot.visited_paths {
        println!("  {path}");
    }
    Ok(())
}

fn run_show(config: &TrackingConfig, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let record: Option<VisitorRecord> = store
        .get(keys::VISITOR_RECORD)?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .context("cached visitor record is malformed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }
    match record {
        Some(record) => {
            println!("Visitor:     {}", record.id);
            println!("OS:          {}", record.operating_system);
            println!("Timezone:    {}", record.timezone);
            println!("First seen:  {}", record.first_seen_at.to_rfc3339());
            println!("Home visits: {}", record.home_visit_count);
            println!("Visited paths:");
            for path in &record.visited_paths {
                println!("  {path}");
            }
        }
        None => println!("No visitor recorded yet"),
    }
    Ok(())
}

fn run_identity(config: &TrackingConfig, json: bool) -> Result<()> {
    let identities = IdentityStore::new(open_store(config)?);
    let id = identities.get_or_create_identity();
    if json {
        println!("{}", serde_json::json!({ "id": id }));
    } else {
        println!("{id}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = resolve_config(&matches)?;
    let json = matches.get_flag("json");

    match matches.subcommand() {
        Some(("visit", args)) => run_visit(&config, args, json).await,
        Some(("show", _)) => run_show(&config, json),
        Some(("identity", _)) => run_identity(&config, json),
        _ => Ok(()),
    }
}
