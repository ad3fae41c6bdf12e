use clap::Parser;
use port_reroute::adapters::geocoder::NominatimGeocoder;
use port_reroute::core::ConfigProvider;
use port_reroute::domain::model::RerouteRequest;
use port_reroute::utils::{logger, validation::Validate};
use port_reroute::{
    CliConfig, LocalStorage, RerouteEngine, ReroutePipeline, RerouteError, TomlConfig,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();
    let file_config = cli.config.as_deref().map(TomlConfig::from_file).transpose();

    let json_logs = cli.json_logs || matches!(&file_config, Ok(Some(config)) if config.json_logs());
    if json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting port-reroute");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let request = cli.request();
    let result = match file_config {
        Ok(Some(config)) => {
            let config = config.with_cli_overrides(&cli);
            let monitor = config.monitoring_enabled();
            run(config, request, monitor).await
        }
        Ok(None) => {
            let monitor = cli.monitor;
            run(cli, request, monitor).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(output_path) => {
            tracing::info!("✅ Reroute completed");
            println!("✅ Reroute completed");
            println!("📁 Report saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Reroute failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            let exit_code = e.exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}

async fn run<C>(config: C, request: RerouteRequest, monitor: bool) -> Result<String, RerouteError>
where
    C: ConfigProvider + Validate + 'static,
{
    config.validate()?;
    if monitor {
        tracing::info!("🔍 Resource monitoring enabled");
    }

    let geocoder = config
        .geocoder()
        .map(|settings| NominatimGeocoder::new(settings.clone()))
        .transpose()?;

    let storage = LocalStorage::new(config.output_path());
    let mut pipeline = ReroutePipeline::new(storage, config, request);
    if let Some(geocoder) = geocoder {
        pipeline = pipeline.with_geocoder(Box::new(geocoder));
    }

    RerouteEngine::new_with_monitoring(pipeline, monitor)
        .run()
        .await
}
