use clap::Parser;
use riskcore::cli::{Cli, Commands};
use riskcore::config::Config;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) if std::path::Path::new(&cli.config).exists() => return Err(e),
        Err(_) => {
            eprintln!("No config at {}, using defaults", cli.config);
            Config::default()
        }
    };

    // Initialize telemetry
    riskcore::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Size(args) => args.execute(&config)?,
        Commands::Atr(args) => args.execute(&config)?,
        Commands::Replay(args) => {
            tracing::info!(trades = %args.trades.display(), "Starting replay");
            args.execute(&config)?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
