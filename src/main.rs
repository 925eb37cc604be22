use clap::{Parser, Subcommand};
use log::warn;
use chronogrid_lib::cli;
use chronogrid_lib::cli::BrowseArgs;
use chronogrid_lib::config::{AppConfig, FlatConfig};
use chronogrid_lib::logging;

#[derive(Parser, Debug)]
#[command(name = "chronogrid", version, about = "Browse a date-ordered media timeline")]
struct Cli {
    #[command(flatten)]
    config: FlatConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the per-month totals of the collection
    Summary,
    /// Load the timeline at a date and print one rendered frame
    Browse {
        #[arg(long, help = "Day to open, YYYY-MM-DD")]
        date: Option<String>,
        #[arg(long, help = "Search text, may end with a key:value token")]
        query: Option<String>,
        #[arg(long, help = "Scroll this many pixels past the opened date")]
        scroll: Option<f64>,
    },
    /// Print a config value
    GetConfig { key: String },
    /// Store a config value in config.json
    SetConfig { key: String, value: String },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config: AppConfig = args.config.into();
    logging::setup_logger(logging::parse_level(&config.log_level))?;
    if let Some(e) = &config.file_error {
        warn!("{}", e);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        match args.command {
            Command::Summary => cli::print_summary(config).await,
            Command::Browse { date, query, scroll } => cli::browse(config, BrowseArgs { date, query, scroll }).await,
            Command::GetConfig { key } => cli::get_config_value(config, &key),
            Command::SetConfig { key, value } => cli::set_config_value(config, &key, &value),
        }
    });
    Ok(())
}
