use clap::Parser;
use port_reroute::adapters::downloader::Downloader;
use port_reroute::core::ConfigProvider;
use port_reroute::utils::{logger, validation::Validate};
use port_reroute::{RerouteError, TomlConfig};

#[derive(Parser)]
#[command(name = "fetch-trade-flows")]
#[command(about = "Download and extract the configured trade-flow archives")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "port-reroute.toml")]
    config: String,

    /// Override the extraction directory from the config
    #[arg(long)]
    data_dir: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    tracing::info!("📁 Loading configuration from: {}", args.config);

    if let Err(e) = fetch(&args).await {
        tracing::error!("❌ Acquisition failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
        let exit_code = e.exit_code();
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn fetch(args: &Args) -> Result<(), RerouteError> {
    let mut config = TomlConfig::from_file(&args.config)?;
    if let Some(data_dir) = &args.data_dir {
        config.paths.data_dir = data_dir.clone();
    }
    config.validate()?;

    let settings = config
        .download
        .clone()
        .ok_or_else(|| RerouteError::MissingConfigError {
            field: "download".to_string(),
        })?;
    if settings.sources.is_empty() {
        return Err(RerouteError::MissingConfigError {
            field: "download.sources".to_string(),
        });
    }

    let report = Downloader::new(settings)?
        .acquire(config.data_dir())
        .await?;

    println!("📋 Acquisition Summary:");
    println!("  Downloaded: {}", report.download.downloaded.len());
    println!("  Already present: {}", report.download.skipped_existing.len());
    println!("  Failed: {}", report.download.failed.len());
    println!("  Archives extracted: {}", report.extract.archives_extracted);
    println!("  Archives not ready: {}", report.extract.archives_skipped);
    for path in &report.extract.files_written {
        println!("  -> {}", path.display());
    }

    match report.download.failed.first() {
        Some(first) => Err(RerouteError::UpstreamFetch {
            url: format!("{} source(s)", report.download.failed.len()),
            attempts: config.download.as_ref().map(|d| d.retry_attempts).unwrap_or(0),
            message: first.clone(),
        }),
        None => Ok(()),
    }
}
