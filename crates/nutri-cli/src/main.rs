mod config;
mod generate_cmd;
mod history_cmd;
mod meal_cmds;
mod profile_cmds;
mod watch_cmd;

#[cfg(test)]
mod test_util;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use nutri_api::HttpApiClient;
use nutri_api::models::Language;

use config::NutriConfig;
use meal_cmds::MealSelector;

#[derive(Parser)]
#[command(name = "nutri", about = "Personalized nutrition plan client")]
struct Cli {
    /// HTTP API base URL (overrides NUTRI_API_BASE env var)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Event channel base URL (overrides NUTRI_WS_BASE env var)
    #[arg(long, global = true)]
    events_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a nutri config file
    Init {
        /// Status checks before a generation is abandoned
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Milliseconds between status checks
        #[arg(long)]
        poll_interval_ms: Option<u64>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Derive BMR and TDEE from a profile or intake JSON file
    Baseline {
        /// Path to the profile JSON
        file: PathBuf,
        /// Write the completed profile (with id, bmr, tdee) here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generate a weekly plan and clinical report for a profile
    Generate {
        /// Path to the profile JSON
        file: PathBuf,
        /// Write the generated plan JSON here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show the current state of a generation task
    Status {
        /// Task ID returned by the submission
        task_id: String,
    },
    /// List past plans and reports for a profile
    History {
        /// Profile ID
        profile_id: String,
    },
    /// Replace one meal of a saved plan and recompute its totals
    EditMeal {
        /// Path to the plan JSON
        plan: PathBuf,
        /// Free-text description of the replacement meal
        #[arg(long)]
        text: String,
        /// Day index (0-based)
        #[arg(long, requires = "meal")]
        day: Option<usize>,
        /// Meal index within the day (0-based)
        #[arg(long, requires = "day")]
        meal: Option<usize>,
        /// Stable meal ID (alternative to --day/--meal)
        #[arg(long, conflicts_with_all = ["day", "meal"])]
        meal_id: Option<String>,
        /// Analysis language: en, pt, es, zh
        #[arg(long, default_value = "en")]
        language: Language,
        /// Write the edited plan here instead of overwriting the input
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Estimate calories and macros for a meal description
    AnalyzeMeal {
        /// Meal description, e.g. "rice, beans and grilled chicken"
        text: String,
        /// Analysis language: en, pt, es, zh
        #[arg(long, default_value = "en")]
        language: Language,
        /// Also log the estimate to this profile's food diary
        #[arg(long)]
        log_for: Option<String>,
    },
    /// Print agent events from the push channel until Ctrl-C
    Watch {
        /// Only show events for this task or correlation ID
        #[arg(long)]
        task: Option<String>,
    },
}

/// Execute the `nutri init` command: write config file.
fn cmd_init(
    api_url: Option<&str>,
    events_url: Option<&str>,
    max_attempts: Option<u32>,
    poll_interval_ms: Option<u64>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        api: config::ApiSection {
            base_url: Some(
                api_url
                    .unwrap_or(nutri_api::ApiConfig::DEFAULT_API_BASE)
                    .to_owned(),
            ),
            events_url: events_url.map(str::to_owned),
        },
        generation: config::GenerationSection {
            max_attempts,
            poll_interval_ms,
        },
    };

    let path = config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    if let Some(base) = &cfg.api.base_url {
        println!("  api.base_url = {base}");
    }
    if let Some(events) = &cfg.api.events_url {
        println!("  api.events_url = {events}");
    }
    Ok(())
}

fn http_client(resolved: &NutriConfig) -> anyhow::Result<Arc<HttpApiClient>> {
    let client = HttpApiClient::new(resolved.api.clone()).context("failed to build HTTP client")?;
    tracing::debug!(
        api = %resolved.api.api_base,
        events = %resolved.api.events_url(),
        "client configured"
    );
    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let api_url = cli.api_url.as_deref();
    let events_url = cli.events_url.as_deref();

    match cli.command {
        Commands::Init {
            max_attempts,
            poll_interval_ms,
            force,
        } => {
            cmd_init(api_url, events_url, max_attempts, poll_interval_ms, force)?;
        }
        Commands::Baseline { file, output } => {
            profile_cmds::run_baseline(&file, output.as_deref())?;
        }
        Commands::Generate { file, output } => {
            let resolved = NutriConfig::resolve(api_url, events_url)?;
            let client = http_client(&resolved)?;
            generate_cmd::run_generate(client, resolved.generation, &file, output.as_deref())
                .await?;
        }
        Commands::Status { task_id } => {
            let resolved = NutriConfig::resolve(api_url, events_url)?;
            let client = http_client(&resolved)?;
            generate_cmd::run_status(&*client, &task_id).await?;
        }
        Commands::History { profile_id } => {
            let resolved = NutriConfig::resolve(api_url, events_url)?;
            let client = http_client(&resolved)?;
            history_cmd::run_history(client, &profile_id).await?;
        }
        Commands::EditMeal {
            plan,
            text,
            day,
            meal,
            meal_id,
            language,
            output,
        } => {
            let selector = MealSelector::from_args(day, meal, meal_id)?;
            let resolved = NutriConfig::resolve(api_url, events_url)?;
            let client = http_client(&resolved)?;
            meal_cmds::run_edit_meal(
                &*client,
                &plan,
                selector,
                &text,
                language,
                output.as_deref(),
            )
            .await?;
        }
        Commands::AnalyzeMeal {
            text,
            language,
            log_for,
        } => {
            let resolved = NutriConfig::resolve(api_url, events_url)?;
            let client = http_client(&resolved)?;
            meal_cmds::run_analyze_meal(&*client, &text, language, log_for.as_deref())
                .await?;
        }
        Commands::Watch { task } => {
            let resolved = NutriConfig::resolve(api_url, events_url)?;
            let client = http_client(&resolved)?;
            watch_cmd::run_watch(&*client, task.as_deref()).await?;
        }
    }

    Ok(())
}
