use anyhow::Context;
use clap::Parser;
use repcoach_agent::config::Config;
use repcoach_agent::runtime;
use tracing::info;

/// Voice coach for the workout logger, from the command line.
#[derive(Parser)]
#[command(name = "agent", version, about)]
struct Cli {
    /// Use the line-oriented chat transport instead of the voice session.
    #[arg(long)]
    text: bool,
    /// Override the model for the selected transport.
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    if let Some(model) = cli.model {
        if cli.text {
            config.chat_model = model;
        } else {
            config.realtime_model = model;
        }
    }

    if cli.text {
        info!(model = %config.chat_model, "starting text chat");
        runtime::run_text(config).await
    } else {
        info!(model = %config.realtime_model, "starting voice session");
        runtime::run_voice(config).await
    }
}
