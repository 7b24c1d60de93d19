use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use scroll_feed::server::{self, ServerConfig};
use scroll_feed::simulate::{self, SimulateConfig};
use scroll_feed::telemetry;
use scroll_window::{WindowConfig, metrics};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "scroll-feed",
    author,
    version,
    about = "Paginated records endpoint and infinite-scroll simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve `GET /records?offset=&count=` over an in-memory feed.
    Serve(ServeArgs),
    /// Scroll a simulated list down and back up, settling the window after each step.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "SCROLL_FEED_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    listen_addr: String,

    /// Number of records served (offsets start at zero).
    #[arg(long, env = "SCROLL_FEED_RECORDS", default_value_t = 100)]
    records: i64,

    /// Artificial delay added to every page.
    #[arg(long, env = "SCROLL_FEED_LATENCY_MS", default_value_t = 0)]
    latency_ms: u64,
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// Read pages from this records endpoint instead of a local feed.
    #[arg(long, env = "SCROLL_FEED_ENDPOINT")]
    endpoint: Option<String>,

    /// Window tuning file; SCROLL_WINDOW_* variables override it.
    #[arg(long, env = "SCROLL_FEED_WINDOW_CONFIG")]
    window_config: Option<PathBuf>,

    #[arg(long, env = "SCROLL_FEED_RECORDS", default_value_t = 100)]
    records: i64,

    #[arg(long, env = "SCROLL_FEED_LATENCY_MS", default_value_t = 0)]
    latency_ms: u64,

    /// Rendered height of one record.
    #[arg(long, env = "SCROLL_FEED_ROW_HEIGHT", default_value_t = 150.0)]
    row_height: f64,

    #[arg(long, env = "SCROLL_FEED_VIEWPORT_HEIGHT", default_value_t = 600.0)]
    viewport_height: f64,

    /// Pixels scrolled per step.
    #[arg(long, env = "SCROLL_FEED_STEP", default_value_t = 400.0)]
    step: f64,

    /// Steps taken in each direction.
    #[arg(long, env = "SCROLL_FEED_STEPS", default_value_t = 20)]
    steps: usize,

    /// Print the Prometheus exposition after the run.
    #[arg(long, default_value_t = false)]
    print_metrics: bool,
}

impl TryFrom<ServeArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = args
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", args.listen_addr))?;
        if args.records < 0 {
            bail!("records must not be negative");
        }
        Ok(ServerConfig {
            listen_addr,
            records: args.records,
            latency: Duration::from_millis(args.latency_ms),
        })
    }
}

impl TryFrom<&SimulateArgs> for SimulateConfig {
    type Error = anyhow::Error;

    fn try_from(args: &SimulateArgs) -> Result<Self, Self::Error> {
        let window = WindowConfig::load(args.window_config.as_deref())
            .context("failed to load window configuration")?;
        if !(args.row_height.is_finite() && args.row_height > 0.0) {
            bail!("row height must be positive");
        }
        if !(args.viewport_height.is_finite() && args.viewport_height > 0.0) {
            bail!("viewport height must be positive");
        }
        if args.records < 0 {
            bail!("records must not be negative");
        }
        Ok(SimulateConfig {
            window,
            endpoint: args.endpoint.clone(),
            records: args.records,
            latency: Duration::from_millis(args.latency_ms),
            row_height: args.row_height,
            viewport_height: args.viewport_height,
            step: args.step,
            steps: args.steps,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init()?;

    match Cli::parse().command {
        Command::Serve(args) => server::run(ServerConfig::try_from(args)?).await,
        Command::Simulate(args) => {
            let config = SimulateConfig::try_from(&args)?;
            info!(
                chunk_size = config.window.chunk_size,
                max_chunks = config.window.max_chunks,
                steps = config.steps,
                "starting simulation"
            );
            let outcome = simulate::run(&config).await;

            println!("deepest view:");
            for line in &outcome.deepest {
                println!("  {line}");
            }
            println!("final view:");
            for line in &outcome.visible {
                println!("  {line}");
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome.snapshot).context("failed to encode snapshot")?
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome.totals).context("failed to encode totals")?
            );
            if args.print_metrics {
                print!("{}", metrics::render());
            }
            Ok(())
        }
    }
}
