use clap::Parser;
use lead_etl::utils::error::{EtlError, ErrorSeverity};
use lead_etl::utils::{logger, validation::Validate};
use lead_etl::{CliConfig, EtlEngine, ImportPipeline, LocalStorage, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting lead-etl CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    // 輸入檔以目前目錄為基準，輸出寫到 output_path
    config.input_file = std::path::absolute(&config.input_file)?
        .to_string_lossy()
        .into_owned();

    let storage = LocalStorage::new(config.output_path.clone());
    let result = match config.dataset_name.clone() {
        Some(name) => {
            tracing::info!("💾 Rows will also be saved as dataset '{}'", name);
            let store = MemoryStore::open(&config.store_path).await;
            match store {
                Ok(store) => {
                    let user_id = config.user_id.clone();
                    let pipeline =
                        ImportPipeline::new(storage, config)?.with_dataset_store(store, user_id);
                    EtlEngine::new(pipeline).run().await
                }
                Err(e) => Err(e),
            }
        }
        None => {
            let pipeline = ImportPipeline::new(storage, config)?;
            EtlEngine::new(pipeline).run().await
        }
    };

    match result {
        Ok(output_path) => {
            tracing::info!("✅ Import completed successfully!");
            println!("✅ Import completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => exit_with(e),
    }

    Ok(())
}

fn exit_with(e: EtlError) {
    tracing::error!(
        "❌ Import failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

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
