use crate::adapters::{openai, sendgrid};
use crate::config::SPREADSHEET_EXTENSIONS;
use crate::core::dispatcher::{DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_SEQUENTIAL_DELAY};
use crate::core::ConfigProvider;
use crate::domain::model::{CleaningOptions, HeaderPolicy, PitchTemplate, SenderIdentity};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// `send_pitches` 的活動設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub campaign: CampaignSection,
    pub source: SourceConfig,
    #[serde(default)]
    pub cleaning: CleaningOptions,
    pub template: TemplateConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub delivery: DeliveryConfig,
    pub quota: QuotaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSection {
    pub name: String,
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub header_policy: HeaderPolicy,
    pub dataset_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_template_name")]
    pub name: String,
    pub subject: String,
    pub body: Option<String>,
    pub body_file: Option<String>,
    pub email_column: String,
    pub name_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub delay_ms: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_generation_endpoint(),
            api_key: String::new(),
            model: default_model(),
            delay_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_delivery_endpoint")]
    pub endpoint: String,
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
    pub reply_to: Option<String>,
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub user_id: String,
    pub daily_limit: u32,
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

fn default_output_path() -> String {
    "./output".to_string()
}

fn default_template_name() -> String {
    "default".to_string()
}

fn default_generation_endpoint() -> String {
    openai::DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    openai::DEFAULT_MODEL.to_string()
}

fn default_delivery_endpoint() -> String {
    sendgrid::DEFAULT_ENDPOINT.to_string()
}

fn default_store_path() -> String {
    "./output/store.json".to_string()
}

impl CampaignConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SENDGRID_API_KEY})；未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("campaign.name", &self.campaign.name)?;
        validation::validate_path("campaign.output_path", &self.campaign.output_path)?;

        // 來源檔案
        validation::validate_path("source.file", &self.source.file)?;
        validation::validate_file_extension("source.file", &self.source.file, SPREADSHEET_EXTENSIONS)?;

        // 模板
        validation::validate_non_empty_string("template.subject", &self.template.subject)?;
        validation::validate_non_empty_string("template.email_column", &self.template.email_column)?;
        match (&self.template.body, &self.template.body_file) {
            (Some(body), None) => validation::validate_non_empty_string("template.body", body)?,
            (None, Some(file)) => validation::validate_path("template.body_file", file)?,
            (Some(_), Some(_)) => {
                return Err(EtlError::ConfigValidationError {
                    field: "template".to_string(),
                    message: "Set either body or body_file, not both".to_string(),
                })
            }
            (None, None) => {
                return Err(EtlError::MissingConfigError {
                    field: "template.body".to_string(),
                })
            }
        }

        // 文字生成
        if self.generation.enabled {
            validation::validate_url("generation.endpoint", &self.generation.endpoint)?;
            validate_secret("generation.api_key", &self.generation.api_key)?;
            validation::validate_non_empty_string("generation.model", &self.generation.model)?;
        }

        // 寄送
        validation::validate_url("delivery.endpoint", &self.delivery.endpoint)?;
        validate_secret("delivery.api_key", &self.delivery.api_key)?;
        validation::validate_email("delivery.from_email", &self.delivery.from_email)?;
        if let Some(reply_to) = &self.delivery.reply_to {
            validation::validate_email("delivery.reply_to", reply_to)?;
        }
        if let Some(batch_size) = self.delivery.batch_size {
            validation::validate_positive_number("delivery.batch_size", batch_size, 1)?;
        }

        // 額度
        validation::validate_non_empty_string("quota.user_id", &self.quota.user_id)?;
        validation::validate_path("quota.store_path", &self.quota.store_path)?;

        Ok(())
    }

    /// 讀入模板；body_file 相對於目前工作目錄
    pub fn pitch_template(&self) -> Result<PitchTemplate> {
        let raw_text = match (&self.template.body, &self.template.body_file) {
            (Some(body), _) => body.clone(),
            (None, Some(file)) => std::fs::read_to_string(file)?,
            (None, None) => {
                return Err(EtlError::MissingConfigError {
                    field: "template.body".to_string(),
                })
            }
        };

        Ok(PitchTemplate {
            name: self.template.name.clone(),
            subject: self.template.subject.clone(),
            raw_text,
        })
    }

    pub fn sender_identity(&self) -> SenderIdentity {
        SenderIdentity {
            from_email: self.delivery.from_email.clone(),
            from_name: self.delivery.from_name.clone(),
            reply_to: self.delivery.reply_to.clone(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.delivery.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn batch_delay(&self) -> Duration {
        self.delivery
            .batch_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BATCH_DELAY)
    }

    pub fn generation_delay(&self) -> Duration {
        self.generation
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SEQUENTIAL_DELAY)
    }
}

/// 金鑰必須存在，且環境變數已展開
fn validate_secret(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EtlError::MissingConfigError {
            field: field_name.to_string(),
        });
    }
    if value.contains("${") {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Environment variable is not set".to_string(),
        });
    }
    Ok(())
}

impl ConfigProvider for CampaignConfig {
    fn input_file(&self) -> &str {
        &self.source.file
    }

    fn output_path(&self) -> &str {
        &self.campaign.output_path
    }

    fn selected_columns(&self) -> &[String] {
        &self.source.columns
    }

    fn cleaning_options(&self) -> CleaningOptions {
        self.cleaning
    }

    fn header_policy(&self) -> HeaderPolicy {
        self.source.header_policy
    }

    fn dataset_name(&self) -> Option<&str> {
        self.source.dataset_name.as_deref()
    }
}

impl Validate for CampaignConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
