use clap::Parser;
use tracing_subscriber::EnvFilter;

use ac_cli::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.log_json);

    let (config, config_path) = cli::load_config(cli.config)?;

    match cli.command {
        Command::Config(ConfigCommand::Validate) => {
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => cli::config::show(&config),
        Command::Negotiate => cli::negotiate::run(&config).await,
        Command::Sessions(cmd) => cli::sessions::run(&config, cmd).await,
        Command::Extract { file, required } => {
            cli::extract::run(&config.extraction, file.as_deref(), &required)
        }
    }
}

/// Install a stderr subscriber so diagnostics never mix with stdout output.
///
/// Defaults to `warn`; `RUST_LOG` overrides.
fn init_cli_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
