use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;
use travel_agent::{
    init_tracing, travel_agent_from_config, Agent, AppConfig, Result, WEATHER_TOOL_NAME,
};

/// Travel-planning agent
#[derive(Parser, Debug)]
#[command(name = "travel-agent")]
#[command(about = "Inspect the travel-planning agent and its weather tool")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the agent's name, instructions, model and tools
    Describe {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up the current weather through the agent's weather tool
    Weather {
        /// City name
        location: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("travel-agent: {err}");
            return ExitCode::FAILURE;
        }
    };
    match cli.verbose {
        0 => {}
        1 => config.logging.filter = "debug".into(),
        _ => config.logging.filter = "trace".into(),
    }
    if let Err(err) = init_tracing(&config.logging) {
        eprintln!("travel-agent: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    match &cli.config {
        Some(path) => AppConfig::from_env_or_file(path),
        None => Ok(AppConfig::from_env()),
    }
}

async fn run(command: Commands, config: &AppConfig) -> Result<()> {
    let agent = travel_agent_from_config(config)?;
    match command {
        Commands::Describe { json } => describe(&agent, json),
        Commands::Weather { location } => {
            let report = agent
                .tools()
                .call(WEATHER_TOOL_NAME, json!({ "location": location }))
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn describe(agent: &Agent, as_json: bool) -> Result<()> {
    let summary = agent.summary();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("name:     {}", summary.name);
    println!("model:    {}/{}", summary.provider, summary.model);
    println!("tools:");
    for tool in &summary.tools {
        println!("  - {}: {}", tool.name, tool.description);
    }
    println!("instructions:");
    for line in summary.instructions.lines() {
        println!("  {line}");
    }
    Ok(())
}
