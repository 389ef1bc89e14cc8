use cik_cusip::adapters::{self, archive::ArchiveFetcher, edgar::EdgarFetcher};
use cik_cusip::config::toml_config::{MapperConfig, SourceType};
use cik_cusip::core::DocumentFetcher;
use cik_cusip::domain::model::FilingReference;
use cik_cusip::utils::error::{ErrorSeverity, MappingError};
use cik_cusip::utils::logger::{self, LogFormat};
use cik_cusip::utils::validation::Validate;
use cik_cusip::{CliConfig, EtlEngine, LocalStorage, MappingPipeline};
use clap::Parser;
use std::collections::BTreeMap;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    logger::init_logger(
        LogFormat::from_json_flag(config.monitoring.json_logs),
        cli.verbose,
    );

    tracing::info!("Starting cik-cusip");
    if cli.verbose {
        tracing::debug!("Effective config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let edgar = match config.source.r#type {
        SourceType::Edgar => match EdgarFetcher::new(&config.source) {
            Ok(fetcher) => Some(fetcher),
            Err(e) => fail(e),
        },
        SourceType::Archive => None,
    };

    let references = match adapters::list_filings(&config.source, edgar.as_ref()).await {
        Ok(references) => references,
        Err(e) => fail(e),
    };

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        print_dry_run(&config, &references);
        return Ok(());
    }

    let monitor_enabled = config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let result = match edgar {
        Some(fetcher) => {
            tracing::info!("📡 Fetching filings from {}", config.source.base_url);
            if let Some(cache) = fetcher.cache_root() {
                tracing::info!("💾 Caching filings under {}", cache.display());
            }
            run(fetcher, references, &config, monitor_enabled).await
        }
        None => {
            let fetcher = ArchiveFetcher::new(&config.source.archive_path);
            tracing::info!("📂 Reading filings from {}", fetcher.root().display());
            run(fetcher, references, &config, monitor_enabled).await
        }
    };

    match result {
        Ok(output_path) => {
            tracing::info!("✅ Mapping completed successfully!");
            println!("✅ Mapping completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => fail(e),
    }

    Ok(())
}

async fn run<F: DocumentFetcher + 'static>(
    fetcher: F,
    references: Vec<FilingReference>,
    config: &MapperConfig,
    monitor_enabled: bool,
) -> cik_cusip::Result<String> {
    let storage = LocalStorage::new(config.output_path());
    let pipeline = MappingPipeline::new(storage, fetcher, references, config)?;
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);
    engine.run().await
}

fn fail(e: MappingError) -> ! {
    tracing::error!(
        "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}

fn print_dry_run(config: &MapperConfig, references: &[FilingReference]) {
    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for reference in references {
        *by_type.entry(reference.filing_type.as_str()).or_default() += 1;
    }

    println!("📋 {} filings would be processed", references.len());
    for (filing_type, count) in &by_type {
        println!("   {:<6} {}", filing_type, count);
    }
    if let (Some(first), Some(last)) = (
        references.iter().map(|r| r.filing_date).min(),
        references.iter().map(|r| r.filing_date).max(),
    ) {
        println!("📅 Filed between {} and {}", first, last);
    }
    println!(
        "💾 Output: {}/{}",
        config.load.output_path, config.load.archive_name
    );
}
