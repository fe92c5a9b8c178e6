use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// 試算表中的單一儲存格。
///
/// JSON 形式帶型別標籤，例如 `{"type":"number","value":3.5}`，
/// 看起來像日期的字串重新載入後仍是字串。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Cell {
    Null,
    Boolean(bool),
    Number(#[serde(with = "number_repr")] f64),
    Date(NaiveDateTime),
    String(String),
}

/// JSON 沒有 NaN 與無限大，非有限值以字串保存
mod number_repr {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&value.to_string())
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

impl Cell {
    /// null 或空字串都視為空值
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::String(s) => s.is_empty(),
            Cell::Boolean(_) | Cell::Number(_) | Cell::Date(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(s) => Some(s),
            _ => None,
        }
    }

    /// 去重與唯一值計算用的鍵，帶型別前綴避免 "1" 與 1 相撞
    pub fn identity_key(&self) -> String {
        match self {
            Cell::Null => "null".to_string(),
            Cell::Boolean(b) => format!("b:{}", b),
            Cell::Number(n) => format!("n:{}", n),
            Cell::Date(d) => format!("d:{}", d),
            Cell::String(s) => format!("s:{}", s),
        }
    }

    pub fn from_date(date: chrono::NaiveDate) -> Self {
        Cell::Date(date.and_time(NaiveTime::MIN))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Boolean(b) => write!(f, "{}", b),
            Cell::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Date(d) if d.time() == NaiveTime::MIN => write!(f, "{}", d.format("%Y-%m-%d")),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Cell::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Boolean(value)
    }
}

/// 以欄位名稱為鍵的一列資料
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, Cell>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Cell>) -> Self {
        self.data.insert(column.to_string(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.data.get(column)
    }

    /// 不分大小寫查找；完全相符優先，其次取字典序最小的鍵
    pub fn get_ignore_case(&self, column: &str) -> Option<&Cell> {
        if let Some(cell) = self.data.get(column) {
            return Some(cell);
        }
        let wanted = column.to_lowercase();
        self.data
            .iter()
            .filter(|(key, _)| key.to_lowercase() == wanted)
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, cell)| cell)
    }

    /// 只保留指定欄位
    pub fn project(&self, columns: &[String]) -> Record {
        let data = columns
            .iter()
            .map(|column| {
                (
                    column.clone(),
                    self.data.get(column).cloned().unwrap_or(Cell::Null),
                )
            })
            .collect();
        Record { data }
    }
}

static NULL_CELL: Cell = Cell::Null;

/// 解析後的表格，每列長度必定等於標題數
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ParsedTable {
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).unwrap_or(&NULL_CELL))
    }

    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| Record {
                data: self
                    .headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Date,
    Boolean,
    Mixed,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
            ColumnType::Mixed => "mixed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: ColumnType,
    pub sample_values: Vec<Cell>,
    pub null_count: usize,
    pub unique_count: usize,
}

/// 資料集記錄中每個欄位的型別對應
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(rename = "originalName")]
    pub original_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum TextCase {
    #[default]
    Original,
    Lower,
    Upper,
    Title,
}

/// 重複標題的處理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum HeaderPolicy {
    /// 第 k 次出現的重複標題改名為 `Name_k`
    #[default]
    Suffix,
    /// 保留原名，依欄位名稱查找時會互相覆蓋
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningOptions {
    pub remove_empty_rows: bool,
    pub remove_duplicates: bool,
    pub trim_whitespace: bool,
    pub convert_dates: bool,
    pub parse_numbers: bool,
    pub text_case: TextCase,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            remove_empty_rows: true,
            remove_duplicates: false,
            trim_whitespace: true,
            convert_dates: true,
            parse_numbers: true,
            text_case: TextCase::Original,
        }
    }
}

impl CleaningOptions {
    /// 全部關閉，方便測試逐項開啟
    pub fn none() -> Self {
        Self {
            remove_empty_rows: false,
            remove_duplicates: false,
            trim_whitespace: false,
            convert_dates: false,
            parse_numbers: false,
            text_case: TextCase::Original,
        }
    }
}

/// 模板本文；佔位符每次都從 raw_text 重新掃描
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchTemplate {
    pub name: String,
    pub subject: String,
    pub raw_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchStatus {
    Draft,
    Generated,
    Scheduled,
    Sent,
    Failed,
}

impl PitchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PitchStatus::Sent | PitchStatus::Failed)
    }

    fn can_transition_to(self, next: PitchStatus) -> bool {
        use PitchStatus::*;
        matches!(
            (self, next),
            (Draft, Generated)
                | (Draft | Generated, Scheduled)
                | (Draft | Generated | Scheduled, Sent | Failed)
        )
    }
}

impl fmt::Display for PitchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PitchStatus::Draft => "draft",
            PitchStatus::Generated => "generated",
            PitchStatus::Scheduled => "scheduled",
            PitchStatus::Sent => "sent",
            PitchStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPitch {
    pub id: Option<String>,
    pub user_id: String,
    pub recipient_data: Record,
    pub subject: String,
    pub content: String,
    pub status: PitchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub error_message: Option<String>,
}

impl GeneratedPitch {
    pub fn new(
        user_id: &str,
        recipient_data: Record,
        subject: String,
        content: String,
        status: PitchStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            user_id: user_id.to_string(),
            recipient_data,
            subject,
            content,
            status,
            created_at: now,
            updated_at: now,
            email_sent_at: None,
            message_id: None,
            error_message: None,
        }
    }

    pub fn transition_to(&mut self, next: PitchStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(EtlError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_sent(&mut self, message_id: Option<String>) -> Result<()> {
        self.transition_to(PitchStatus::Sent)?;
        self.email_sent_at = Some(self.updated_at);
        self.message_id = message_id;
        Ok(())
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) -> Result<()> {
        self.transition_to(PitchStatus::Failed)?;
        self.error_message = Some(error_message.into());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendQuota {
    pub daily_limit: u32,
    pub sent_today: u32,
}

impl SendQuota {
    pub fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.sent_today)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataset {
    pub user_id: String,
    pub name: String,
    pub original_filename: String,
    pub total_rows: usize,
    pub column_mappings: BTreeMap<String, ColumnMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub original_filename: String,
    pub total_rows: usize,
    pub column_mappings: BTreeMap<String, ColumnMapping>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub dataset_id: String,
    pub row_index: usize,
    pub row_data: Record,
}

/// 清理階段的輸出
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub columns: Vec<String>,
    pub profiles: Vec<ColumnProfile>,
    pub records: Vec<Record>,
    pub csv_output: String,
    pub tsv_output: String,
}

/// 寄件者設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub from_email: String,
    pub from_name: String,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
}
