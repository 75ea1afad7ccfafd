use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use stopbot::config::Settings;
use stopbot::execution::{spawn_feed, PriceMonitor, PriceSimulator, TriggerEngine};
use stopbot::models::{Market, PriceSample, RegistrationRequest};
use stopbot::persistence::OrderStore;
use tracing_subscriber::EnvFilter;

type Engine = TriggerEngine<Box<dyn OrderStore>>;

#[derive(Parser)]
#[command(name = "stopbot", version, about = "Stop-loss registry and price trigger monitor")]
struct Cli {
    /// Settings file (defaults to ./stopbot.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a stop loss that fires when price falls to the threshold
    Register {
        #[arg(long)]
        market: String,
        #[arg(long)]
        threshold: f64,
        #[arg(long)]
        size: f64,
        #[arg(long, default_value = "")]
        wallet_address: String,
        #[arg(long, default_value = "")]
        transaction_hash: String,
    },
    /// Show all orders in collection order
    List,
    /// Feed a single price sample
    Evaluate {
        #[arg(long)]
        market: String,
        #[arg(long)]
        price: String,
    },
    /// Walk a synthetic price from start to target and watch for triggers
    Simulate {
        #[arg(long)]
        market: String,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        target: f64,
        #[arg(long)]
        steps: Option<usize>,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Remove every order
    Reset,
}

/// Exit status for rejected input, distinct from storage or config failures
const EXIT_INVALID_INPUT: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<stopbot::Error>() {
        Some(e) if e.is_validation() => EXIT_INVALID_INPUT,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    setup_logging(&settings.log_filter);

    let store = settings.open_store().context("Failed to open order store")?;
    let engine = Arc::new(TriggerEngine::new(store));

    match cli.command {
        Command::Register {
            market,
            threshold,
            size,
            wallet_address,
            transaction_hash,
        } => {
            let receipt = engine.register_request(RegistrationRequest {
                market,
                threshold,
                size,
                wallet_address,
                transaction_hash,
            })?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::List => print_orders(&engine)?,
        Command::Evaluate { market, price } => {
            let sample = PriceSample::parse(&market, &price)?;
            let fired = engine.process(&sample)?;
            println!("Fired: {:?}", fired);
        }
        Command::Simulate {
            market,
            start,
            target,
            steps,
            interval_ms,
            seed,
        } => {
            let market: Market = market.parse()?;
            let steps = steps.unwrap_or(settings.simulation.steps);
            let interval = interval_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or_else(|| settings.tick_interval());
            let seed = seed.or(settings.simulation.seed);

            run_simulation(engine.clone(), market, start, target, steps, interval, seed).await?;
            print_orders(&engine)?;
        }
        Command::Reset => {
            engine.reset()?;
            println!("All orders removed");
        }
    }

    Ok(())
}

fn setup_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_simulation(
    engine: Arc<Engine>,
    market: Market,
    start: f64,
    target: f64,
    steps: usize,
    interval: std::time::Duration,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    tracing::info!("🤖 Simulating {} from ${:.2} to ${:.2} over {} steps", market, start, target, steps);

    let simulator = PriceSimulator::new(market, start, target, steps, seed)?;
    let (samples, feed) = spawn_feed(simulator, interval, 16);
    let monitor = PriceMonitor::new(engine);

    tokio::select! {
        summary = monitor.run(samples) => {
            tracing::info!(
                "🏁 Simulation complete: {} samples, {} triggered, {} failed",
                summary.samples,
                summary.triggered.len(),
                summary.failures
            );
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, stopping simulation");
            feed.abort();
        }
    }

    Ok(())
}

fn print_orders(engine: &Engine) -> anyhow::Result<()> {
    let orders = engine.orders()?;
    if orders.is_empty() {
        println!("No orders");
        return Ok(());
    }

    println!("{:>4}  {:<6} {:>12} {:>10}  {}", "#", "MARKET", "THRESHOLD", "SIZE", "STATUS");
    for (index, order) in orders.iter().enumerate() {
        let status = match order.triggered_at() {
            Some(at) => format!("{:?} at {}", order.status(), at.format("%Y-%m-%d %H:%M:%S")),
            None => format!("{:?}", order.status()),
        };
        println!(
            "{:>4}  {:<6} {:>12.2} {:>10.4}  {}",
            index,
            order.market(),
            order.threshold(),
            order.size(),
            status
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status() {
        let invalid = anyhow::Error::new(stopbot::Error::InvalidMarket("XRP".to_string()));
        assert_eq!(exit_status(&invalid), EXIT_INVALID_INPUT);

        let storage: stopbot::Error =
            std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        let storage = anyhow::Error::new(storage).context("Failed to open order store");
        assert_eq!(exit_status(&storage), 1);

        let wrapped = anyhow::Error::new(stopbot::Error::InvalidPriceSample("NaN".to_string()))
            .context("evaluate");
        assert_eq!(exit_status(&wrapped), EXIT_INVALID_INPUT);
    }
}
