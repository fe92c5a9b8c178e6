use crate::core::{Cell, ColumnProfile, ColumnType, ParsedTable};
use crate::domain::model::ColumnMapping;
use crate::utils::error::Result;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};

const SAMPLE_SIZE: usize = 5;

/// 依儲存格內容推斷欄位型別
pub struct TypeInferencer {
    date_prefix: Regex,
    numeric: Regex,
}

impl TypeInferencer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            date_prefix: Regex::new(r"^(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4})")?,
            numeric: Regex::new(r"^-?\d+(\.\d+)?$")?,
        })
    }

    /// 單一值的型別；空值回傳 None
    pub fn classify(&self, value: &Cell) -> Option<ColumnType> {
        match value {
            Cell::Null => None,
            Cell::Boolean(_) => Some(ColumnType::Boolean),
            Cell::Number(n) if n.is_nan() => Some(ColumnType::String),
            Cell::Number(_) => Some(ColumnType::Number),
            Cell::Date(_) => Some(ColumnType::Date),
            Cell::String(raw) => {
                if raw.is_empty() {
                    return None;
                }
                // 順序：日期 > 數字 > 布林 > 字串
                let s = raw.trim();
                if self.date_prefix.is_match(s) {
                    Some(ColumnType::Date)
                } else if self.numeric.is_match(s) {
                    Some(ColumnType::Number)
                } else if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
                    Some(ColumnType::Boolean)
                } else {
                    Some(ColumnType::String)
                }
            }
        }
    }

    pub fn infer_type<'a, I>(&self, values: I) -> ColumnType
    where
        I: IntoIterator<Item = &'a Cell>,
    {
        let seen: BTreeSet<ColumnType> = values
            .into_iter()
            .filter_map(|value| self.classify(value))
            .collect();

        match seen.len() {
            0 => ColumnType::String,
            1 => seen.into_iter().next().unwrap_or(ColumnType::String),
            _ => ColumnType::Mixed,
        }
    }

    pub fn profile_columns(&self, table: &ParsedTable) -> Vec<ColumnProfile> {
        table
            .headers
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let non_blank: Vec<&Cell> = table
                    .column_values(index)
                    .filter(|value| !value.is_blank())
                    .collect();
                let unique: HashSet<String> =
                    non_blank.iter().map(|value| value.identity_key()).collect();

                ColumnProfile {
                    name: name.clone(),
                    inferred_type: self.infer_type(non_blank.iter().copied()),
                    sample_values: non_blank.iter().take(SAMPLE_SIZE).map(|v| (*v).clone()).collect(),
                    null_count: table.rows.len() - non_blank.len(),
                    unique_count: unique.len(),
                }
            })
            .collect()
    }
}

/// 資料集記錄用的欄位對應；未知欄位略過
pub fn column_mappings(
    selected: &[String],
    profiles: &[ColumnProfile],
) -> BTreeMap<String, ColumnMapping> {
    selected
        .iter()
        .filter_map(|column| {
            profiles.iter().find(|p| &p.name == column).map(|profile| {
                (
                    column.clone(),
                    ColumnMapping {
                        column_type: profile.inferred_type,
                        original_name: column.clone(),
                    },
                )
            })
        })
        .collect()
}
