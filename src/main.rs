use chainweb_reporter::cli::{self, Cli, Commands};
use chainweb_reporter::config::ReporterConfig;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `config init` must not create the file it is about to write
    let (config, source) = match cli.command {
        Commands::Config { .. } if !cli.config.exists() => (ReporterConfig::default(), None),
        _ => {
            let (config, source) = ReporterConfig::load(&cli.config);
            (config, Some(source))
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.main.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if let Some(source) = &source {
        source.log(&cli.config);
        if source.fell_back() {
            eprintln!("Warning: {} could not be used, running with defaults", cli.config.display());
        }
    }

    if let Err(e) = cli::run(cli, config).await {
        error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
