use clap::Parser;
use parcel_etl::core::catalog;
use parcel_etl::core::export::{self, ExportFormat};
use parcel_etl::core::filter::{summarize_owners, ParcelFilter, ScopeStats};
use parcel_etl::core::ConfigProvider;
use parcel_etl::domain::model::{FetchProgress, ProgressFn};
use parcel_etl::utils::error::ErrorSeverity;
use parcel_etl::utils::monitor::ResourceMonitor;
use parcel_etl::utils::{logger, validation::Validate};
use parcel_etl::{
    CachePolicy, CacheEntry, CliConfig, DataOrigin, EtlEngine, FetcherSettings, LocalStorage,
    ParcelFetcher, ParcelPipeline, TomlConfig,
};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting parcel-etl CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證配置
    if let Err(e) = cli.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let result = match &cli.config {
        Some(path) => {
            tracing::info!("📄 Loading configuration from {}", path);
            match TomlConfig::from_file(path).and_then(|c| c.validate().map(|_| c)) {
                Ok(toml) => {
                    let monitor = cli.monitor || toml.monitoring_enabled();
                    execute(&cli, &toml, monitor).await
                }
                Err(e) => Err(e),
            }
        }
        None => execute(&cli, &cli, cli.monitor).await,
    };

    if let Err(e) = result {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Parcel ETL failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn execute<C: ConfigProvider>(
    cli: &CliConfig,
    config: &C,
    monitor: bool,
) -> parcel_etl::Result<()> {
    let scope = cli.scope()?;
    let fetcher = ParcelFetcher::new(FetcherSettings::from_config(config))?;

    if cli.list {
        return list_scopes(&fetcher).await;
    }

    if cli.count {
        let count = fetcher.record_count(&scope).await?;
        println!("🔢 {}: {} parcel(s)", scope, count);
        return Ok(());
    }

    let storage = LocalStorage::new(config.data_dir().to_string());
    let pipeline = ParcelPipeline::new(fetcher, storage);

    if cli.cache_info {
        let entries = pipeline.store().entries().await?;
        if entries.is_empty() {
            println!("📭 No cached data in {}", config.data_dir());
        }
        for entry in entries {
            let fetched = entry
                .fetched_at
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let limit = entry
                .limit
                .map(|l| format!(" (limited to {})", l))
                .unwrap_or_default();
            println!(
                "📦 {:<28} {:>7} record(s)  fetched {}{}",
                entry.scope.cache_key(),
                entry.record_count,
                fetched,
                limit
            );
        }
        return Ok(());
    }

    if cli.invalidate {
        if pipeline.store().invalidate(&scope).await? {
            println!("🗑️ Removed cached data for {}", scope);
        } else {
            println!("📭 Nothing cached for {}", scope);
        }
        return Ok(());
    }

    if monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let query = pipeline
        .fetcher()
        .query(scope)
        .with_max_records(cli.max_records);
    let policy = CachePolicy {
        use_cache: !cli.refresh,
        max_age: config.cache_max_age(),
    };

    let engine = EtlEngine::new_with_monitoring(pipeline, ResourceMonitor::new(monitor));
    let progress: &ProgressFn = &|p: &FetchProgress| match p.expected_total {
        Some(total) => eprintln!("   page {}: {}/{} parcel(s)", p.page, p.fetched, total),
        None => eprintln!("   page {}: {} parcel(s)", p.page, p.fetched),
    };

    let (entry, origin) = engine.load_or_fetch(&query, policy, Some(progress)).await?;
    let source = match origin {
        DataOrigin::Cache => "cache",
        DataOrigin::Service => "feature service",
    };
    println!("✅ {} parcel(s) for {} (from {})", entry.record_count(), entry.scope, source);

    let stats = ScopeStats::from_records(&entry.records);
    println!(
        "📊 Total assessed value ${:.0}, average ${:.0}, {:.1} acres",
        stats.total_value, stats.avg_value, stats.total_acreage
    );

    if let Some(n) = cli.top_owners {
        println!("🏆 Top {} owners by acreage:", n);
        for (rank, owner) in summarize_owners(&entry.records).iter().take(n).enumerate() {
            println!(
                "{:>3}. {:<40} {:>4} parcel(s) {:>10.1} acres  ${:.0}",
                rank + 1,
                owner.owner,
                owner.parcel_count,
                owner.total_acreage,
                owner.total_value
            );
        }
    }

    if let Some(format) = cli.export {
        export_records(cli, config, &entry, format)?;
    }

    Ok(())
}

async fn list_scopes(fetcher: &ParcelFetcher) -> parcel_etl::Result<()> {
    let municipalities = match fetcher.list_municipalities().await {
        Ok(names) if !names.is_empty() => names,
        Ok(_) => catalog::MUNICIPALITIES.iter().map(|s| s.to_string()).collect(),
        Err(e) => {
            tracing::warn!("⚠️ Could not list municipalities from the service: {}", e);
            catalog::MUNICIPALITIES.iter().map(|s| s.to_string()).collect()
        }
    };

    println!("🏘️ Municipalities:");
    for name in &municipalities {
        println!("   {}", name);
    }

    println!("📮 Predefined areas (--zip):");
    for area in catalog::AREAS {
        println!("   {}  {} ({})", area.zip, area.name, area.town);
    }
    Ok(())
}

fn export_records<C: ConfigProvider>(
    cli: &CliConfig,
    config: &C,
    entry: &CacheEntry,
    format: ExportFormat,
) -> parcel_etl::Result<()> {
    let filter = match &cli.search {
        Some(text) => ParcelFilter::new().with_search(text.as_str()),
        None => ParcelFilter::new(),
    };
    let records = filter.apply(&entry.records);
    let data = export::export(&records, format)?;

    let path = match &cli.export_path {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(config.data_dir()).join(format!(
            "{}_export.{}",
            entry.scope.cache_key(),
            format.extension()
        )),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &data)?;

    println!("📁 Exported {} record(s) to {}", records.len(), path.display());
    Ok(())
}
