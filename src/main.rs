use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use tracing::info;

use kalorin::advisor::{Advisor, Profile};
use kalorin::calories::{self, ExerciseLevel};
use kalorin::constants;
use kalorin::gemini::GeminiClient;
use kalorin::{chat, web_server};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Profile flags shared by `chat` and `target`.
#[derive(clap::Args, Debug)]
struct ProfileArgs {
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(30..=150), help = "Current weight in kg.")]
    weight: u32,
    #[arg(long, default_value_t = 55, value_parser = clap::value_parser!(u32).range(30..=150), help = "Goal weight in kg.")]
    goal_weight: u32,
    #[arg(long, help = "Deadline as YYYY-MM-DD (default: eight weeks after tomorrow).")]
    deadline: Option<NaiveDate>,
    #[arg(long, default_value = "low", help = "Today's exercise: low, normal, high (or 少ない, 普通, 多い).")]
    exercise: ExerciseLevel,
    #[arg(long, default_value = "", help = "What you ate today, separated by full-width commas (，).")]
    food: String,
}

impl ProfileArgs {
    fn into_profile(self, today: NaiveDate) -> Profile {
        let defaults = Profile::default_for(today);
        Profile {
            weight_kg: self.weight,
            goal_weight_kg: self.goal_weight,
            deadline: self.deadline.unwrap_or(defaults.deadline),
            exercise: self.exercise,
            food_today: self.food,
        }
    }
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the Kalorin chat page.
    Serve {
        #[arg(long, default_value_t = Ipv4Addr::LOCALHOST, help = "Address to bind.")]
        host: Ipv4Addr,
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, env = "KALORIN_INCLUDE_HISTORY", help = "Send the running transcript with every prompt.")]
        include_history: bool,
    },
    /// Chat with Kalorin in the terminal.
    Chat {
        #[command(flatten)]
        profile: ProfileArgs,
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, help = "Gemini API key.")]
        api_key: Option<String>,
        #[arg(long, env = "KALORIN_INCLUDE_HISTORY", help = "Send the running transcript with every prompt.")]
        include_history: bool,
    },
    /// Print the daily calorie target for a profile.
    Target {
        #[command(flatten)]
        profile: ProfileArgs,
    },
}

fn build_advisor(include_history: bool) -> Result<Advisor> {
    let client = GeminiClient::from_env().context("Failed to build Gemini client")?;
    info!(model = client.model(), "Using hosted model");
    Ok(Advisor::new(Arc::new(client))
        .with_fallback_api_key(constants::GEMINI_API_KEY.clone())
        .with_history(include_history))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG, e.g. RUST_LOG=info,kalorin=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,kalorin=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Serve { host, port, include_history } => {
            info!("Starting Kalorin on port {}...", port);
            let state = web_server::AppState::new(build_advisor(include_history)?)?;
            web_server::start_web_server(host.octets(), port, state)
                .await
                .context("Web server failed")?;
        }
        Commands::Chat { profile, api_key, include_history } => {
            let advisor = build_advisor(include_history)?;
            chat::run_terminal_chat(&advisor, profile.into_profile(today), api_key)
                .await
                .context("Chat session failed")?;
        }
        Commands::Target { profile } => {
            let profile = profile.into_profile(today);
            match profile.target_kcal(today) {
                Ok(target) => {
                    println!("目標摂取カロリー: {target} kcal");
                    let intake = calories::estimate_food_calories(&profile.food_today);
                    if intake > 0 {
                        println!("推定摂取カロリー: {intake} kcal");
                    }
                }
                Err(e) => {
                    anyhow::bail!("{}", kalorin::AdviceError::from(e).user_message());
                }
            }
        }
    }

    Ok(())
}
