use crate::core::{Cell, Record};
use crate::domain::model::{CleaningOptions, TextCase};
use crate::utils::error::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::HashSet;

/// 依序嘗試的日期格式；前者為純日期，後者含時間
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%b %d, %Y",
    "%d %b %Y",
];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S"];
/// 找不到明確格式時的寬鬆格式
const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];
const FALLBACK_DATE_FORMATS: &[&str] = &["%B %d, %Y", "%d %B %Y", "%a %b %d %Y", "%Y.%m.%d"];

/// 資料清理流程。輸入不會被修改，每列輸出都是複本。
///
/// 固定順序：
/// 1. 移除空白列（所選欄位全部為空才移除）
/// 2. 去除重複列（以所選欄位的原始值為鍵，保留第一筆）
/// 3. 逐欄：修剪空白 → 大小寫 → 數字 → 日期
pub struct Cleaner {
    options: CleaningOptions,
    numeric: Regex,
    title_word: Regex,
}

impl Cleaner {
    pub fn new(options: CleaningOptions) -> Result<Self> {
        Ok(Self {
            options,
            numeric: Regex::new(r"^-?\d+(\.\d+)?$")?,
            title_word: Regex::new(r"[A-Za-z0-9_]\S*")?,
        })
    }

    pub fn options(&self) -> &CleaningOptions {
        &self.options
    }

    pub fn clean(&self, rows: &[Record], selected_columns: &[String]) -> Vec<Record> {
        let original_count = rows.len();
        let mut kept: Vec<&Record> = rows.iter().collect();

        if self.options.remove_empty_rows {
            kept.retain(|row| {
                selected_columns
                    .iter()
                    .any(|column| row.get(column).is_some_and(|value| !value.is_blank()))
            });
            tracing::debug!("Removed {} empty rows", original_count - kept.len());
        }

        if self.options.remove_duplicates {
            let before = kept.len();
            let mut seen = HashSet::new();
            kept.retain(|row| {
                let key: Vec<String> = selected_columns
                    .iter()
                    .map(|column| {
                        row.get(column)
                            .map(Cell::identity_key)
                            .unwrap_or_else(|| Cell::Null.identity_key())
                    })
                    .collect();
                seen.insert(key)
            });
            tracing::debug!("Removed {} duplicate rows", before - kept.len());
        }

        let cleaned: Vec<Record> = kept
            .into_iter()
            .map(|row| {
                let mut cleaned = row.clone();
                for column in selected_columns {
                    if let Some(value) = cleaned.data.get_mut(column) {
                        let current = std::mem::replace(value, Cell::Null);
                        *value = self.clean_value(current);
                    }
                }
                cleaned
            })
            .collect();

        tracing::info!(
            "🧹 Cleaned {} -> {} rows across {} columns",
            original_count,
            cleaned.len(),
            selected_columns.len()
        );
        cleaned
    }

    /// 單一儲存格；每個階段只看當下的值與型別
    pub fn clean_value(&self, value: Cell) -> Cell {
        let mut value = value;

        if self.options.trim_whitespace {
            if let Cell::String(s) = &value {
                value = Cell::String(s.trim().to_string());
            }
        }

        if let Cell::String(s) = &value {
            value = Cell::String(match self.options.text_case {
                TextCase::Original => s.clone(),
                TextCase::Lower => s.to_lowercase(),
                TextCase::Upper => s.to_uppercase(),
                TextCase::Title => self.title_case(s),
            });
        }

        if self.options.parse_numbers {
            if let Some(number) = value.as_str().and_then(|s| self.parse_number(s)) {
                value = Cell::Number(number);
            }
        }

        if self.options.convert_dates {
            if let Some(date) = value.as_str().and_then(parse_date) {
                value = Cell::Date(date);
            }
        }

        value
    }

    fn parse_number(&self, s: &str) -> Option<f64> {
        let trimmed = s.trim();
        if !self.numeric.is_match(trimmed) {
            return None;
        }
        trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
    }

    /// 每個字首字母大寫、其餘小寫
    pub fn title_case(&self, s: &str) -> String {
        self.title_word
            .replace_all(s, |caps: &regex::Captures| {
                let word = &caps[0];
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            })
            .into_owned()
    }
}

/// 依明確格式逐一嘗試，第一個成功者勝出；再退回寬鬆解析。無法解析回傳 None。
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .map(|date| date.and_time(chrono::NaiveTime::MIN))
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        })
        .or_else(|| parse_date_fallback(value))
}

fn parse_date_fallback(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.naive_utc());
    }

    FALLBACK_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            FALLBACK_DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_rows(values: &[&str]) -> Vec<Record> {
        values
            .iter()
            .map(|v| Record::new().with("Email", *v))
            .collect()
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(chrono::NaiveTime::MIN)
    }

    #[test]
    fn test_dedup_runs_before_trim() {
        // 去重使用修剪前的值，因此兩列都會保留
        let options = CleaningOptions {
            trim_whitespace: true,
            remove_duplicates: true,
            remove_empty_rows: true,
            ..CleaningOptions::none()
        };
        let cleaner = Cleaner::new(options).unwrap();
        let rows = email_rows(&[" A@x.com ", "a@x.com", ""]);

        let cleaned = cleaner.clean(&rows, &columns(&["Email"]));
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].get("Email"), Some(&Cell::from("A@x.com")));
        assert_eq!(cleaned[1].get("Email"), Some(&Cell::from("a@x.com")));

        let padded = email_rows(&[" a@x.com ", "a@x.com"]);
        let cleaned = cleaner.clean(&padded, &columns(&["Email"]));
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].get("Email"), cleaned[1].get("Email"));
    }

    #[test]
    fn test_remove_empty_rows_keeps_rows_with_any_selected_value() {
        let cleaner = Cleaner::new(CleaningOptions {
            remove_empty_rows: true,
            ..CleaningOptions::none()
        })
        .unwrap();
        let rows = vec![
            Record::new().with("Name", "").with("Email", Cell::Null).with("Note", "x"),
            Record::new().with("Name", "Ada").with("Email", Cell::Null),
            Record::new().with("Name", " ").with("Email", ""),
        ];

        let cleaned = cleaner.clean(&rows, &columns(&["Name", "Email"]));
        // 未選取的 Note 欄不影響判斷；只含空白字元不算空
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].get("Name"), Some(&Cell::from("Ada")));
    }

    #[test]
    fn test_remove_duplicates_keeps_first_seen() {
        let cleaner = Cleaner::new(CleaningOptions {
            remove_duplicates: true,
            ..CleaningOptions::none()
        })
        .unwrap();
        let rows = vec![
            Record::new().with("Name", "Ada").with("City", "Dallas").with("Id", 1.0),
            Record::new().with("Name", "Ada").with("City", "Dallas").with("Id", 2.0),
            Record::new().with("Name", "Ada").with("City", "Plano").with("Id", 3.0),
        ];

        let cleaned = cleaner.clean(&rows, &columns(&["Name", "City"]));
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].get("Id"), Some(&Cell::Number(1.0)));
        assert_eq!(cleaned[1].get("Id"), Some(&Cell::Number(3.0)));
    }

    #[test]
    fn test_clean_is_idempotent_for_row_filters() {
        let cleaner = Cleaner::new(CleaningOptions {
            remove_empty_rows: true,
            remove_duplicates: true,
            ..CleaningOptions::none()
        })
        .unwrap();
        let rows = email_rows(&["a@x.com", "", "b@x.com", "a@x.com", "c@x.com"]);
        let selected = columns(&["Email"]);

        let once = cleaner.clean(&rows, &selected);
        let twice = cleaner.clean(&once, &selected);
        assert_eq!(once.len(), 3);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_input_rows_are_not_mutated_and_unselected_columns_untouched() {
        let cleaner = Cleaner::new(CleaningOptions::default()).unwrap();
        let rows = vec![Record::new().with("Price", " 42 ").with("Note", " 7 ")];
        let cleaned = cleaner.clean(&rows, &columns(&["Price"]));

        assert_eq!(rows[0].get("Price"), Some(&Cell::from(" 42 ")));
        assert_eq!(cleaned[0].get("Price"), Some(&Cell::Number(42.0)));
        assert_eq!(cleaned[0].get("Note"), Some(&Cell::from(" 7 ")));
    }

    #[test]
    fn test_text_case_options() {
        let lower = Cleaner::new(CleaningOptions {
            text_case: TextCase::Lower,
            ..CleaningOptions::none()
        })
        .unwrap();
        assert_eq!(lower.clean_value(Cell::from("MAIN St")), Cell::from("main st"));

        let upper = Cleaner::new(CleaningOptions {
            text_case: TextCase::Upper,
            ..CleaningOptions::none()
        })
        .unwrap();
        assert_eq!(upper.clean_value(Cell::from("tx")), Cell::from("TX"));

        let title = Cleaner::new(CleaningOptions {
            text_case: TextCase::Title,
            ..CleaningOptions::none()
        })
        .unwrap();
        assert_eq!(
            title.clean_value(Cell::from("123 OAK lane, fort WORTH")),
            Cell::from("123 Oak Lane, Fort Worth")
        );
    }

    #[test]
    fn test_null_values_pass_through() {
        let cleaner = Cleaner::new(CleaningOptions {
            text_case: TextCase::Upper,
            ..CleaningOptions::default()
        })
        .unwrap();
        assert_eq!(cleaner.clean_value(Cell::Null), Cell::Null);
        assert_eq!(cleaner.clean_value(Cell::Boolean(false)), Cell::Boolean(false));
    }

    #[test]
    fn test_number_parsing_happens_before_dates() {
        let cleaner = Cleaner::new(CleaningOptions::default()).unwrap();
        assert_eq!(cleaner.clean_value(Cell::from("2024")), Cell::Number(2024.0));
        assert_eq!(cleaner.clean_value(Cell::from("-3.5")), Cell::Number(-3.5));
        assert_eq!(cleaner.clean_value(Cell::from("1,200")), Cell::from("1,200"));
        assert_eq!(cleaner.clean_value(Cell::from("12/25/2024")), Cell::Date(ymd(2024, 12, 25)));
    }

    #[test]
    fn test_number_parsing_ignores_surrounding_whitespace_without_trim() {
        let cleaner = Cleaner::new(CleaningOptions {
            parse_numbers: true,
            ..CleaningOptions::none()
        })
        .unwrap();
        assert_eq!(cleaner.clean_value(Cell::from(" 15 ")), Cell::Number(15.0));
    }

    #[test]
    fn test_parse_date_formats_in_order() {
        assert_eq!(parse_date("2024-03-01"), Some(ymd(2024, 3, 1)));
        // 月/日 先於 日/月
        assert_eq!(parse_date("03/04/2024"), Some(ymd(2024, 3, 4)));
        assert_eq!(parse_date("25/12/2024"), Some(ymd(2024, 12, 25)));
        assert_eq!(parse_date("2024/07/04"), Some(ymd(2024, 7, 4)));
        assert_eq!(parse_date("Jan 05, 2024"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_date("05 Jan 2024"), Some(ymd(2024, 1, 5)));
        assert_eq!(
            parse_date("2024-01-15 10:30:00"),
            Some(ymd(2024, 1, 15).date().and_hms_opt(10, 30, 0).unwrap())
        );
        assert_eq!(
            parse_date("2024-01-15T10:30:00Z"),
            Some(ymd(2024, 1, 15).date().and_hms_opt(10, 30, 0).unwrap())
        );
        assert_eq!(parse_date("March 9, 2023"), Some(ymd(2023, 3, 9)));
    }

    #[test]
    fn test_unparseable_dates_are_left_as_is() {
        let cleaner = Cleaner::new(CleaningOptions::default()).unwrap();
        assert_eq!(parse_date("next tuesday"), None);
        assert_eq!(cleaner.clean_value(Cell::from("Oak Ridge")), Cell::from("Oak Ridge"));
    }
}
