//! Visit Telemetry CLI
//!
//! Runs the collector, reads its stats, and drives a simulated page visit.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use visit_telemetry::{
    agent::{
        Agent, AgentEnv, Element, FileStorage, LocalBuffers, MemoryStorage, PageEnvironment,
        PageSignal, ScrollMetrics,
    },
    aggregate::summarize_local,
    client::{BlockingTelemetryClient, EndpointConfig},
    clock::SystemClock,
    config::Config,
    model::{AggregateStats, Viewport},
    server::{self, ServerConfig, StorageBackend},
    VERSION,
};

#[derive(Parser)]
#[command(name = "visit-telemetry")]
#[command(version = VERSION)]
#[command(about = "Page-visit telemetry collector and agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collector (ingestion + stats endpoints)
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        /// Shared bearer token required on /analytics routes
        #[arg(long, env = "VISIT_TELEMETRY_TOKEN")]
        token: Option<String>,

        /// Keep records in memory only
        #[arg(long)]
        memory: bool,
    },

    /// Show aggregate stats from the collector
    Stats {
        /// Collector base URL (defaults to the configured endpoint)
        #[arg(long)]
        endpoint: Option<String>,

        /// Bearer token for the collector
        #[arg(long, env = "VISIT_TELEMETRY_TOKEN")]
        token: Option<String>,

        /// Keep refreshing until Ctrl+C
        #[arg(long)]
        watch: bool,

        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },

    /// Replay a scripted page visit through a real agent
    Simulate {
        /// Collector base URL (defaults to the configured endpoint)
        #[arg(long)]
        endpoint: Option<String>,

        /// Bearer token for the collector
        #[arg(long, env = "VISIT_TELEMETRY_TOKEN")]
        token: Option<String>,

        /// Page path to report
        #[arg(long, default_value = "/")]
        path: String,

        /// Pause between simulated signals, in milliseconds
        #[arg(long, default_value = "250")]
        dwell_ms: u64,
    },

    /// Check that the collector is reachable
    Ping {
        /// Collector base URL (defaults to the configured endpoint)
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Show configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("visit_telemetry=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });

    match cli.command {
        Commands::Serve {
            port,
            host,
            token,
            memory,
        } => cmd_serve(&config, port, host, token, memory),
        Commands::Stats {
            endpoint,
            token,
            watch,
            json,
        } => cmd_stats(&config, endpoint, token, watch, json),
        Commands::Simulate {
            endpoint,
            token,
            path,
            dwell_ms,
        } => cmd_simulate(&config, endpoint, token, &path, dwell_ms),
        Commands::Ping { endpoint } => cmd_ping(&config, endpoint),
        Commands::Config => cmd_config(),
    }
}

fn cmd_serve(
    config: &Config,
    port: Option<u16>,
    host: IpAddr,
    token: Option<String>,
    memory: bool,
) -> anyhow::Result<()> {
    let storage = if memory {
        StorageBackend::Memory
    } else {
        config.ensure_directories()?;
        StorageBackend::File(config.store_path())
    };
    let server_config = ServerConfig::new(
        port.unwrap_or(config.port),
        token.or_else(|| config.auth_token.clone()),
        storage,
    )
    .with_host(host);

    println!("Visit Telemetry v{VERSION}");
    match &server_config.storage {
        StorageBackend::Memory => println!("  Storage: in-memory"),
        StorageBackend::File(path) => println!("  Storage: {}", path.display()),
    }
    println!(
        "  Auth: {}",
        if server_config.auth_token.is_some() {
            "bearer token"
        } else {
            "open"
        }
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        let (addr, shutdown_tx) = server::run(server_config).await?;
        println!("  Listening on http://{addr}");
        println!();
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        println!();
        println!("Stopping collector...");
        let _ = shutdown_tx.send(());
        Ok::<(), anyhow::Error>(())
    })
}

fn cmd_stats(
    config: &Config,
    endpoint: Option<String>,
    token: Option<String>,
    watch: bool,
    json: bool,
) -> anyhow::Result<()> {
    let client = BlockingTelemetryClient::new(endpoint_config(config, endpoint, token))?;

    if !watch {
        let stats = load_stats(config, &client);
        print_stats(&stats, json);
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    while running.load(Ordering::SeqCst) {
        let stats = load_stats(config, &client);
        print_stats(&stats, json);
        println!();

        let refreshed = Instant::now();
        while running.load(Ordering::SeqCst) && refreshed.elapsed() < config.stats_refresh {
            thread::sleep(Duration::from_millis(100));
        }
    }
    Ok(())
}

/// Fetch stats, falling back to the local buffers when the collector is
/// unreachable.
fn load_stats(config: &Config, client: &BlockingTelemetryClient) -> AggregateStats {
    match client.fetch_stats() {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("Warning: Failed to load stats from collector: {e}");
            eprintln!("Showing locally buffered data instead.");
            match FileStorage::open(config.local_storage_path()) {
                Ok(storage) => {
                    let buffers = LocalBuffers::new(Arc::new(storage));
                    summarize_local(&buffers.page_views.items(), &buffers.sessions.items())
                }
                Err(e) => {
                    eprintln!("Warning: Could not read local storage: {e}");
                    AggregateStats::default()
                }
            }
        }
    }
}

fn print_stats(stats: &AggregateStats, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(stats).unwrap_or_else(|_| "Error".to_string())
        );
        return;
    }

    println!("Visit Statistics");
    println!("================");
    println!("  Page views: {}", stats.total_page_views);
    println!("  Sessions: {}", stats.total_sessions);
    println!("  Events: {}", stats.total_events);
    println!("  Avg. session: {}s", stats.avg_session_duration);
    println!("  Avg. scroll depth: {}%", stats.avg_scroll_depth);
    println!("  Interactions: {}", stats.total_interactions);

    if !stats.recent_page_views.is_empty() {
        println!();
        println!("Recent page views:");
        for view in &stats.recent_page_views {
            println!(
                "  {} {}",
                field(view, "path"),
                field(view, "sessionId")
            );
        }
    }

    if !stats.recent_events.is_empty() {
        println!();
        println!("Recent events:");
        for event in &stats.recent_events {
            println!("  {}", field(event, "event"));
        }
    }

    if !stats.sessions.is_empty() {
        println!();
        println!("Recent sessions:");
        for session in &stats.sessions {
            let duration_ms = session.get("duration").and_then(Value::as_i64).unwrap_or(0);
            println!(
                "  {} {}s, {}% scrolled, {} interactions",
                field(session, "sessionId"),
                duration_ms / 1000,
                session.get("maxScrollDepth").and_then(Value::as_i64).unwrap_or(0),
                session.get("interactions").and_then(Value::as_i64).unwrap_or(0)
            );
        }
    }
}

fn field<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("-")
}

fn cmd_simulate(
    config: &Config,
    endpoint: Option<String>,
    token: Option<String>,
    path: &str,
    dwell_ms: u64,
) -> anyhow::Result<()> {
    config.ensure_directories()?;
    let client = BlockingTelemetryClient::new(endpoint_config(config, endpoint, token))?;
    println!("Simulating a visit to {} via {}", path, client.config().base_url);

    let env = AgentEnv {
        clock: Arc::new(SystemClock),
        session_storage: Arc::new(MemoryStorage::new()),
        local_storage: Arc::new(FileStorage::open(config.local_storage_path())?),
        transport: Arc::new(client),
    };
    let viewport = Viewport {
        width: 1280,
        height: 800,
    };
    let mut agent = Agent::mount(PageEnvironment::native(path, viewport), env);
    println!("  Session: {}", agent.session_id());

    let dwell = Duration::from_millis(dwell_ms);
    let document_height = 4000.0;
    let mut scroll_top = 0.0;
    while scroll_top + f64::from(viewport.height) <= document_height {
        agent.handle(PageSignal::Scroll(ScrollMetrics::new(
            scroll_top,
            f64::from(viewport.height),
            document_height,
        )));
        scroll_top += 200.0;
        thread::sleep(dwell);
    }

    let link = Element::new("a")
        .with_text("  View projects  ")
        .with_href("/projects");
    agent.handle(PageSignal::Click(link));
    thread::sleep(dwell);

    let icon = Element::new("span").inside(Element::new("button").with_text("Send message"));
    agent.handle(PageSignal::Click(icon));
    agent.handle(PageSignal::Click(Element::new("p").with_text("plain text")));

    agent.handle(PageSignal::VisibilityChange { hidden: true });
    agent.handle(PageSignal::VisibilityChange { hidden: false });

    let mut payload = Map::new();
    payload.insert("source".to_string(), Value::from("cli"));
    agent.track_event("simulation_complete", payload);

    agent.handle(PageSignal::BeforeUnload);
    let context = agent.context().clone();
    let report = agent.teardown();

    println!(
        "  Max scroll depth: {}%, interactions: {}",
        context.max_scroll_depth(),
        context.interactions()
    );
    println!(
        "  Delivered: {} sent, {} buffered locally, {} dropped",
        report.sent, report.buffered, report.dropped
    );
    Ok(())
}

fn cmd_ping(config: &Config, endpoint: Option<String>) -> anyhow::Result<()> {
    let client = BlockingTelemetryClient::new(endpoint_config(config, endpoint, None))?;
    match client.test_connection() {
        Ok(true) => println!("Collector at {} is up", client.config().base_url),
        Ok(false) => anyhow::bail!("Collector health check failed"),
        Err(e) => anyhow::bail!("Could not reach collector: {e}"),
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn endpoint_config(
    config: &Config,
    endpoint: Option<String>,
    token: Option<String>,
) -> EndpointConfig {
    EndpointConfig::new(
        endpoint.unwrap_or_else(|| config.endpoint.clone()),
        token.or_else(|| config.auth_token.clone()),
    )
    .with_timeout(config.request_timeout)
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
