use clap::Parser;
use lead_etl::adapters::memory::MemoryStore;
use lead_etl::core::campaign::{draft_pitches, recipient_email, PitchGenerator, PitchSender};
use lead_etl::core::dispatcher::{BatchDispatcher, Progress};
use lead_etl::core::export;
use lead_etl::core::template::TemplateEngine;
use lead_etl::core::{ConfigProvider, Pipeline, Storage};
use lead_etl::domain::model::{GeneratedPitch, PitchTemplate, TransformResult};
use lead_etl::utils::error::ErrorSeverity;
use lead_etl::utils::logger;
use lead_etl::utils::validation::{is_plausible_email, Validate};
use lead_etl::{CampaignConfig, EtlError, ImportPipeline, LocalStorage, OpenAiClient, SendGridClient};

const PITCHES_WORKBOOK: &str = "pitches.xlsx";

#[derive(Parser)]
#[command(name = "send-pitches")]
#[command(about = "Generate and send personalized pitches from a lead spreadsheet")]
struct Args {
    /// Path to TOML campaign file
    #[arg(short, long, default_value = "campaign.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines instead of the compact format
    #[arg(long)]
    json_logs: bool,

    /// Dry run - build draft pitches without calling any provider
    #[arg(long)]
    dry_run: bool,

    /// Check the delivery API key and send one test email to this address, then exit
    #[arg(long, value_name = "ADDRESS")]
    test_email: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting pitch campaign");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match CampaignConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    // 來源檔以目前目錄為基準
    config.source.file = std::path::absolute(&config.source.file)?
        .to_string_lossy()
        .into_owned();

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    let outcome = match &args.test_email {
        Some(to) => send_test_email(&config, to).await,
        None => run(config, args.dry_run).await,
    };

    if let Err(e) = outcome {
        tracing::error!(
            "❌ Campaign failed: {} (Category: {:?}, Severity: {:?})",
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

    Ok(())
}

async fn run(config: CampaignConfig, dry_run: bool) -> lead_etl::Result<()> {
    let template = config.pitch_template()?;
    let user_id = config.quota.user_id.clone();
    let storage = LocalStorage::new(config.output_path().to_string());

    let result = import_leads(&config, dry_run).await?;

    // 模板必須只引用選取的欄位
    let engine = TemplateEngine::new()?;
    let placeholders = engine
        .validate_template(&template, &result.columns)
        .into_result()?;
    tracing::info!("🧩 Template uses {} placeholders", placeholders.len());

    let with_email = result
        .records
        .iter()
        .filter(|row| recipient_email(row, &config.template.email_column).is_some())
        .count();
    println!(
        "📇 {} leads, {} with a valid '{}' address",
        result.records.len(),
        with_email,
        config.template.email_column
    );

    let pitches = if dry_run || !config.generation.enabled {
        draft_pitches(&engine, &user_id, &template, &result.records)
    } else {
        generate_pitches(&config, &user_id, &template, result.records.clone()).await?
    };

    let workbook = export::pitches_workbook(&result.columns, &pitches)?;
    storage.write_file(PITCHES_WORKBOOK, &workbook).await?;
    println!(
        "📁 Pitches saved to: {}/{}",
        config.output_path(),
        PITCHES_WORKBOOK
    );

    if dry_run {
        println!("🔍 DRY RUN - {} pitches drafted, nothing was sent", pitches.len());
        return Ok(());
    }

    send_pitches(&config, &user_id, pitches).await
}

/// 解析並清理來源檔；非 dry run 時一併寫出匯出檔與資料集
async fn import_leads(config: &CampaignConfig, dry_run: bool) -> lead_etl::Result<TransformResult> {
    let storage = LocalStorage::new(config.output_path().to_string());

    if dry_run {
        let pipeline = ImportPipeline::new(storage, config.clone())?;
        let table = pipeline.extract().await?;
        return pipeline.transform(table).await;
    }

    let store = MemoryStore::open(&config.quota.store_path).await?;
    let pipeline = ImportPipeline::new(storage, config.clone())?
        .with_dataset_store(store, config.quota.user_id.clone());
    let table = pipeline.extract().await?;
    let result = pipeline.transform(table).await?;
    let output_path = pipeline.load(result.clone()).await?;
    tracing::info!("💾 Cleaned leads saved to {}", output_path);
    Ok(result)
}

async fn generate_pitches(
    config: &CampaignConfig,
    user_id: &str,
    template: &PitchTemplate,
    rows: Vec<lead_etl::core::Record>,
) -> lead_etl::Result<Vec<GeneratedPitch>> {
    let client = OpenAiClient::new(
        &config.generation.endpoint,
        &config.generation.api_key,
        &config.generation.model,
    )?;
    let generator = PitchGenerator::new(client, config.generation_delay())?;

    let outcomes = generator
        .generate(user_id, template, rows.clone(), |p: Progress| {
            println!("🤖 Generated {}/{}", p.completed, p.total)
        })
        .await;

    // 生成失敗的列存成 failed，留下錯誤原因
    let store = MemoryStore::open(&config.quota.store_path).await?;
    let failed = generator
        .record_failures(&store, user_id, template, &rows, &outcomes)
        .await?;
    if !failed.is_empty() {
        println!("⚠️ {} rows failed generation and were recorded as failed", failed.len());
    }

    let mut pitches = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome.result {
            Ok(pitch) => pitches.push(pitch),
            Err(e) => tracing::warn!("⚠️ Row {} was not generated: {}", outcome.index + 1, e),
        }
    }

    if pitches.is_empty() {
        return Err(EtlError::ProviderError {
            provider: "openai".to_string(),
            message: "No pitches were generated".to_string(),
        });
    }
    Ok(pitches)
}

async fn send_pitches(
    config: &CampaignConfig,
    user_id: &str,
    pitches: Vec<GeneratedPitch>,
) -> lead_etl::Result<()> {
    let store = MemoryStore::open(&config.quota.store_path).await?;
    let quota = store.set_daily_limit(user_id, config.quota.daily_limit).await?;
    println!(
        "📊 Quota: {} of {} sent today, {} remaining",
        quota.sent_today,
        quota.daily_limit,
        quota.remaining()
    );

    let client = SendGridClient::new(&config.delivery.endpoint, &config.delivery.api_key)?;
    let dispatcher = BatchDispatcher::new(config.batch_size(), config.batch_delay());
    let mut sender = PitchSender::new(
        client,
        store.clone(),
        store,
        config.sender_identity(),
        config.template.email_column.clone(),
        dispatcher,
    );
    if let Some(name_column) = &config.template.name_column {
        sender = sender.with_name_column(name_column.clone());
    }

    let report = sender
        .send_all(user_id, pitches, |p: Progress| {
            println!("📧 Sent {}/{}", p.completed, p.total)
        })
        .await?;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(delivery) => {
                if let Some(e) = &delivery.persistence_error {
                    tracing::warn!(
                        "⚠️ Email {} was sent but its status was not saved: {}",
                        outcome.index + 1,
                        e
                    );
                }
            }
            Err(e) => tracing::warn!("⚠️ Email {} failed: {}", outcome.index + 1, e),
        }
    }

    println!(
        "✅ Campaign finished: {} sent, {} failed, {} skipped",
        report.sent, report.failed, report.skipped
    );
    Ok(())
}

/// 驗證寄信金鑰後寄出一封測試信
async fn send_test_email(config: &CampaignConfig, to: &str) -> lead_etl::Result<()> {
    if !is_plausible_email(to) {
        return Err(EtlError::ValidationError {
            message: format!("'{}' is not a valid email address", to),
        });
    }

    let client = SendGridClient::new(&config.delivery.endpoint, &config.delivery.api_key)?;
    if !client.validate_api_key().await? {
        return Err(EtlError::ProviderError {
            provider: "sendgrid".to_string(),
            message: "The API key was rejected".to_string(),
        });
    }
    println!("🔑 API key accepted");

    let receipt = client.send_test_email(&config.sender_identity(), to).await?;
    println!(
        "✅ Test email sent to {}{}",
        to,
        receipt
            .message_id
            .map(|id| format!(" (message id {})", id))
            .unwrap_or_default()
    );
    Ok(())
}

fn display_config_summary(config: &CampaignConfig, args: &Args) {
    println!("📋 Campaign Summary:");
    println!("  Campaign: {}", config.campaign.name);
    println!("  Source: {}", config.source.file);
    println!("  Output: {}", config.output_path());
    if config.source.columns.is_empty() {
        println!("  Columns: all");
    } else {
        println!("  Columns: {}", config.source.columns.join(", "));
    }
    println!("  Template: {}", config.template.name);
    println!("  Email column: {}", config.template.email_column);
    if config.generation.enabled {
        println!("  Generation: {} ({})", config.generation.model, config.generation.endpoint);
    } else {
        println!("  Generation: disabled (template drafts)");
    }
    println!(
        "  Delivery: batches of {} every {:?}",
        config.batch_size(),
        config.batch_delay()
    );
    println!(
        "  Quota: {} per day for {}",
        config.quota.daily_limit, config.quota.user_id
    );

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    if let Some(to) = &args.test_email {
        println!("  🧪 TEST EMAIL to {}", to);
    }

    println!();
}
