use crate::core::{Cell, Record};
use crate::domain::model::PitchTemplate;
use crate::utils::error::{EtlError, Result};
use regex::{Captures, Regex};
use std::collections::HashSet;

/// 佔位符檢查結果，兩個列表都保留模板中的出現順序
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }

    /// 有無效佔位符時轉為錯誤
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.invalid.is_empty() {
            Ok(self.valid)
        } else {
            Err(EtlError::InvalidPlaceholders {
                placeholders: self.invalid,
            })
        }
    }
}

/// `{{欄位}}` 佔位符的擷取、檢查與代換
pub struct TemplateEngine {
    token: Regex,
    fill_token: Regex,
}

impl TemplateEngine {
    pub fn new() -> Result<Self> {
        Ok(Self {
            token: Regex::new(r"\{\{(.*?)\}\}")?,
            fill_token: Regex::new(r"\{\{\s*(.*?)\s*\}\}")?,
        })
    }

    pub fn extract_placeholders(&self, template: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.token
            .captures_iter(template)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .collect()
    }

    /// 不分大小寫比對可用欄位
    pub fn validate(&self, template: &str, available_columns: &[String]) -> ValidationReport {
        let known: HashSet<String> = available_columns
            .iter()
            .map(|column| column.to_lowercase())
            .collect();

        let (valid, invalid) = self
            .extract_placeholders(template)
            .into_iter()
            .partition(|name| known.contains(&name.to_lowercase()));

        ValidationReport { valid, invalid }
    }

    /// 單次掃描代換；找不到的欄位保留原樣，null 代換為空字串
    pub fn fill(&self, template: &str, row: &Record) -> String {
        self.fill_token
            .replace_all(template, |caps: &Captures| {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                match row.get_ignore_case(name) {
                    Some(Cell::Null) => String::new(),
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// 主旨與內文使用同一列資料
    pub fn fill_template(&self, template: &PitchTemplate, row: &Record) -> (String, String) {
        (
            self.fill(&template.subject, row),
            self.fill(&template.raw_text, row),
        )
    }

    /// 主旨與內文一起檢查，無效者依出現順序合併
    pub fn validate_template(
        &self,
        template: &PitchTemplate,
        available_columns: &[String],
    ) -> ValidationReport {
        let combined = format!("{}\n{}", template.subject, template.raw_text);
        self.validate(&combined, available_columns)
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// 純文字轉成寄信用的 HTML：空行分段、單一換行轉 `<br>`
pub fn text_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let paragraphs: Vec<String> = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .map(|paragraph| {
            let lines: Vec<String> = paragraph.lines().map(escape_html).collect();
            format!("<p>{}</p>", lines.join("<br>"))
        })
        .collect();

    format!(
        "<!DOCTYPE html>\n<html>\n<body style=\"font-family: Arial, sans-serif; line-height: 1.6; color: #333;\">\n{}\n</body>\n</html>",
        paragraphs.join("\n")
    )
}
