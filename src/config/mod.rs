pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::ConfigProvider;
#[cfg(feature = "cli")]
use crate::domain::model::{CleaningOptions, HeaderPolicy, TextCase};
#[cfg(feature = "cli")]
use crate::utils::error::{EtlError, Result};
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::{ArgAction, Parser};
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

pub const SPREADSHEET_EXTENSIONS: &[&str] =
    &["csv", "tsv", "txt", "xlsx", "xlsm", "xlsb", "xls", "ods"];

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "lead-etl")]
#[command(about = "Import, profile and clean real-estate lead spreadsheets")]
pub struct CliConfig {
    #[arg(long, short = 'i', help = "Spreadsheet or delimited text file to import")]
    pub input_file: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, value_delimiter = ',', help = "Columns to keep (default: all)")]
    pub columns: Vec<String>,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub remove_empty_rows: bool,

    #[arg(long)]
    pub remove_duplicates: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub trim_whitespace: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub convert_dates: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub parse_numbers: bool,

    #[arg(long, value_enum, default_value_t = TextCase::Original)]
    pub text_case: TextCase,

    #[arg(long, value_enum, default_value_t = HeaderPolicy::Suffix)]
    pub header_policy: HeaderPolicy,

    #[arg(long, help = "Also save the cleaned rows as a named dataset")]
    pub dataset_name: Option<String>,

    #[arg(long, default_value = "local")]
    pub user_id: String,

    #[arg(long, default_value = "./output/store.json")]
    pub store_path: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn input_file(&self) -> &str {
        &self.input_file
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn selected_columns(&self) -> &[String] {
        &self.columns
    }

    fn cleaning_options(&self) -> CleaningOptions {
        CleaningOptions {
            remove_empty_rows: self.remove_empty_rows,
            remove_duplicates: self.remove_duplicates,
            trim_whitespace: self.trim_whitespace,
            convert_dates: self.convert_dates,
            parse_numbers: self.parse_numbers,
            text_case: self.text_case,
        }
    }

    fn header_policy(&self) -> HeaderPolicy {
        self.header_policy
    }

    fn dataset_name(&self) -> Option<&str> {
        self.dataset_name.as_deref()
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("input_file", &self.input_file)?;
        validation::validate_file_extension("input_file", &self.input_file, SPREADSHEET_EXTENSIONS)?;
        validation::validate_path("output_path", &self.output_path)?;

        if self.columns.iter().any(|column| column.trim().is_empty()) {
            return Err(EtlError::InvalidConfigValueError {
                field: "columns".to_string(),
                value: self.columns.join(","),
                reason: "Column names cannot be empty".to_string(),
            });
        }

        if let Some(name) = &self.dataset_name {
            validation::validate_non_empty_string("dataset_name", name)?;
            validation::validate_non_empty_string("user_id", &self.user_id)?;
            validation::validate_path("store_path", &self.store_path)?;
        }

        Ok(())
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_cleaning_defaults() {
        let config = CliConfig::parse_from(["lead-etl", "--input-file", "leads.xlsx"]);
        assert_eq!(config.cleaning_options(), CleaningOptions::default());
        assert_eq!(config.header_policy(), HeaderPolicy::Suffix);
        assert!(config.selected_columns().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_flags_override_cleaning() {
        let config = CliConfig::parse_from([
            "lead-etl",
            "-i",
            "leads.csv",
            "--columns",
            "Name,Email",
            "--remove-duplicates",
            "--trim-whitespace",
            "false",
            "--text-case",
            "title",
            "--header-policy",
            "preserve",
        ]);

        let options = config.cleaning_options();
        assert!(options.remove_duplicates);
        assert!(!options.trim_whitespace);
        assert_eq!(options.text_case, TextCase::Title);
        assert_eq!(config.header_policy(), HeaderPolicy::Preserve);
        assert_eq!(config.selected_columns(), ["Name", "Email"]);
    }

    #[test]
    fn test_cli_rejects_unsupported_extension() {
        let config = CliConfig::parse_from(["lead-etl", "-i", "leads.pdf"]);
        assert!(config.validate().is_err());
    }
}
