//! gridcache - command-line driver for the cached football data layer.
//!
//! Fetches go through the same store, throttle and retry loop the dashboard
//! uses, so this binary doubles as a way to warm or inspect the cache.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gridcache_core::{
    BatchCoordinator, CachedClient, Config, EventKind, LiveEvent, LiveTarget, LiveTracker,
    NotificationHub, SportsApi, Store, Throttler,
};

const USAGE: &str = "\
Usage: gridcache <command> [args]

Commands:
  fetch <url>           Fetch one URL through the cache
  batch <url>...        Fetch several URLs in throttled chunks
  scoreboard            Current games
  roster <team-id>      Players on a team
  watch [game-id]       Follow live scores (or one game) until Ctrl-C
  watch-odds <game-id>  Follow betting lines for a game until Ctrl-C
  sweep                 Remove expired entries
  clear                 Remove every cached entry
  stats                 Show entry counts and ages per partition";

/// Initialize the tracing subscriber. Logs go to stderr; with
/// `GRIDCACHE_LOG_FILE=1` they are also written to a daily file in the
/// cache directory. The returned guard must live until exit.
fn init_tracing(cache_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = if std::env::var("GRIDCACHE_LOG_FILE").as_deref() == Ok("1") {
        let appender = tracing_appender::rolling::daily(cache_dir.join("logs"), "gridcache.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config() -> Result<Config> {
    let mut config = Config::load()?;
    if let Ok(dir) = std::env::var("GRIDCACHE_CACHE_DIR") {
        config.cache_dir = Some(dir.into());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = load_config()?;
    let cache_dir = config.cache_dir()?;
    let _log_guard = init_tracing(&cache_dir);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    info!(command = %command, cache_dir = %cache_dir.display(), "gridcache starting");

    let store = Arc::new(Store::with_dir(&cache_dir));
    store.init().await;
    let throttler = Arc::new(Throttler::new(config.throttle.clone()));
    let client = CachedClient::from_config(&config, Arc::clone(&store), throttler)
        .context("Failed to build HTTP client")?;
    let api = SportsApi::new(client.clone(), config.api.clone());

    match command.as_str() {
        "fetch" => {
            let url = args.get(1).context("fetch needs a URL")?;
            let data = client.fetch(url).await?;
            print_json(&data)?;
        }
        "batch" => {
            if args.len() < 2 {
                bail!("batch needs at least one URL");
            }
            let batch = BatchCoordinator::new(client, config.batch.clone());
            let results = batch.batch_fetch_chunked(&args[1..]).await;
            print_json(&results)?;
        }
        "scoreboard" => {
            let games = api.fetch_scoreboard().await?;
            print_json(&games)?;
        }
        "roster" => {
            let team_id = args.get(1).context("roster needs a team id")?;
            let players = api.fetch_team_roster(team_id).await?;
            print_json(&players)?;
        }
        "watch" => {
            let target = match args.get(1) {
                Some(event_id) => LiveTarget::Game(event_id.clone()),
                None => LiveTarget::Scoreboard,
            };
            watch(api, target, config.live.poll_interval()).await?;
        }
        "watch-odds" => {
            let event_id = args.get(1).context("watch-odds needs a game id")?;
            let target = LiveTarget::Odds(event_id.clone());
            watch(api, target, config.live.poll_interval()).await?;
        }
        "sweep" => {
            let removed = store.clear_expired().await;
            println!("Removed {} expired entries", removed);
        }
        "clear" => {
            store.clear_all().await;
            println!("Cache cleared");
        }
        "stats" => {
            let stats = store.stats().await;
            println!("Backend: {}", stats.backend);
            if stats.fallback_active {
                println!("Running on fallback storage");
            }
            for p in stats.partitions {
                match p.last_write {
                    Some(age) => println!("  {:<8} {:>5}  last write {}", p.partition, p.entries, age),
                    None => println!("  {:<8} {:>5}", p.partition, p.entries),
                }
            }
        }
        "help" | "--help" | "-h" => println!("{}", USAGE),
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }

    Ok(())
}

async fn watch(api: SportsApi, target: LiveTarget, interval: Duration) -> Result<()> {
    let hub = NotificationHub::new();

    let _scores = hub.subscribe_fn(EventKind::ScoresUpdated, |event| {
        if let LiveEvent::ScoresUpdated { games } = event {
            for game in games {
                let name = game
                    .get("shortName")
                    .or_else(|| game.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                let status = game
                    .pointer("/status/type/shortDetail")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                println!("{:<24} {}", name, status);
            }
            println!();
        }
    });
    let _game = hub.subscribe_fn(EventKind::GameUpdated, |event| {
        if let LiveEvent::GameUpdated { event_id, game } = event {
            let status = game
                .pointer("/competitions/0/status/type/shortDetail")
                .and_then(|v| v.as_str())
                .unwrap_or("no status");
            println!("{}: {}", event_id, status);
        }
    });
    let _odds = hub.subscribe_fn(EventKind::OddsUpdated, |event| {
        if let LiveEvent::OddsUpdated { event_id, odds } = event {
            for line in odds {
                let provider = line
                    .pointer("/provider/name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                let details = line.get("details").and_then(|v| v.as_str()).unwrap_or("");
                let over_under = line
                    .get("overUnder")
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                println!("{} {:<16} {:<12} o/u {}", event_id, provider, details, over_under);
            }
        }
    });
    let _failed = hub.subscribe_fn(EventKind::RefreshFailed, |event| {
        if let LiveEvent::RefreshFailed { source, message } = event {
            eprintln!("{} refresh failed: {}", source, message);
        }
    });

    let handle = LiveTracker::spawn(api, hub, target, interval);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.stop().await;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
