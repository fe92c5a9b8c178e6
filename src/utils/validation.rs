use crate::utils::error::{EtlError, Result};
use std::collections::HashSet;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    let url = Url::parse(url_str).map_err(|e| EtlError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: url_str.to_string(),
        reason: format!("Invalid URL format: {}", e),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Unsupported URL scheme: {}", scheme),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

/// 檢查副檔名（不分大小寫）
pub fn validate_file_extension(field_name: &str, file: &str, allowed_extensions: &[&str]) -> Result<()> {
    let allowed: HashSet<String> = allowed_extensions
        .iter()
        .map(|ext| ext.to_ascii_lowercase())
        .collect();

    let extension = std::path::Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: file.to_string(),
            reason: "File has no extension or invalid filename".to_string(),
        })?;

    if !allowed.contains(&extension) {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: file.to_string(),
            reason: format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed_extensions.join(", ")
            ),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// 寬鬆的 email 格式檢查：local@domain.tld
pub fn is_plausible_email(value: &str) -> bool {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !value.chars().any(char::is_whitespace)
                && domain
                    .split_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        }
        None => false,
    }
}

pub fn validate_email(field_name: &str, value: &str) -> Result<()> {
    if !is_plausible_email(value) {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Not a valid email address".to_string(),
        });
    }
    Ok(())
}

/// 欄位選擇必須非空，且每個欄位都存在於標題列
pub fn validate_column_selection(selected: &[String], headers: &[String]) -> Result<()> {
    if selected.is_empty() {
        return Err(EtlError::ValidationError {
            message: "Select at least one column".to_string(),
        });
    }

    let known: HashSet<&str> = headers.iter().map(String::as_str).collect();
    let missing: Vec<&str> = selected
        .iter()
        .map(String::as_str)
        .filter(|column| !known.contains(column))
        .collect();

    if !missing.is_empty() {
        return Err(EtlError::ValidationError {
            message: format!("Unknown columns selected: {}", missing.join(", ")),
        });
    }

    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}
