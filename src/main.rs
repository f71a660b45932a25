//! Weather Jester CLI - main entry point
//!
//! Runs the Telegram bot, or performs a single weather lookup / LLM call
//! from the terminal.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weather_jester::dispatcher::{lookup_weather, WeatherReport};
use weather_jester::humor::Humorist;
use weather_jester::{metrics, telegram, Config, NominatimClient, OpenRouterClient, OpenWeatherClient};

#[derive(Parser)]
#[command(name = "weather_jester")]
#[command(about = "Telegram weather bot with a sense of humor", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.yml (defaults to ./config.yml, then ../config.yml)
    #[arg(long, env = "WEATHER_JESTER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram bot (long polling)
    Run,

    /// Look up the weather for a location and print the bot's reply
    Weather {
        /// Free-text location, e.g. "London" or "San Francisco, CA"
        #[arg(required = true, num_args = 1..)]
        location: Vec<String>,
    },

    /// Ask the language model to add humor to some text
    Ask {
        /// Text to make funnier
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("weather_jester=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => telegram::run(&config)
            .await
            .context("Telegram bot stopped with an error")?,
        Commands::Weather { location } => print_weather(&config, &location.join(" ")).await?,
        Commands::Ask { text } => {
            let client = OpenRouterClient::from_config(&config)?;
            info!(model = client.model(), "Asking the language model");
            println!("{}", client.add_humor(&text.join(" ")).await);
        }
    }

    Ok(())
}

async fn print_weather(config: &Config, query: &str) -> anyhow::Result<()> {
    let geocoder = NominatimClient::from_config(config)?;
    let forecasts = OpenWeatherClient::from_config(config)?;

    let (coordinates, description) = lookup_weather(&geocoder, &forecasts, query)
        .await
        .with_context(|| format!("Weather lookup failed for {:?}", query))?;

    info!(
        query,
        latitude = coordinates.latitude,
        longitude = coordinates.longitude,
        "Resolved location"
    );

    let report = WeatherReport::new(coordinates, description, &mut rand::thread_rng());
    for message in report.messages() {
        println!("{}", message.text.trim_end());
    }

    Ok(())
}
