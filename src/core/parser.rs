use crate::core::{Cell, ParsedTable};
use crate::domain::model::HeaderPolicy;
use crate::utils::error::{EtlError, Result};
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::io::Cursor;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];
const DELIMITER_SAMPLE_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Workbook,
    Delimited,
}

impl SourceFormat {
    /// 依檔頭判斷：zip（xlsx/ods）或 OLE（xls）為活頁簿，其餘視為分隔文字
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
            SourceFormat::Workbook
        } else {
            SourceFormat::Delimited
        }
    }
}

/// 將上傳檔案轉為標題與資料列。只讀取第一個工作表，其餘工作表忽略。
#[derive(Debug, Clone, Default)]
pub struct SpreadsheetParser {
    header_policy: HeaderPolicy,
}

impl SpreadsheetParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header_policy(mut self, policy: HeaderPolicy) -> Self {
        self.header_policy = policy;
        self
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<ParsedTable> {
        if bytes.is_empty() {
            return Err(EtlError::EmptyFile);
        }

        let format = SourceFormat::sniff(bytes);
        tracing::debug!("Parsing {} bytes as {:?}", bytes.len(), format);

        let grid = match format {
            SourceFormat::Workbook => Self::read_workbook(bytes)?,
            SourceFormat::Delimited => Self::read_delimited(bytes)?,
        };

        let table = self.build_table(grid)?;
        tracing::info!(
            "📄 Parsed {} columns and {} rows",
            table.headers.len(),
            table.rows.len()
        );
        Ok(table)
    }

    fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

        let sheet_names = workbook.sheet_names();
        if sheet_names.len() > 1 {
            tracing::debug!(
                "Workbook has {} sheets; only '{}' is read",
                sheet_names.len(),
                sheet_names[0]
            );
        }

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| EtlError::ParseError {
                message: "No worksheet found in workbook".to_string(),
            })??;

        Ok(range
            .rows()
            .map(|row| row.iter().map(Self::convert_workbook_cell).collect())
            .collect())
    }

    fn convert_workbook_cell(cell: &Data) -> Cell {
        match cell {
            Data::Empty => Cell::Null,
            Data::String(s) if s.is_empty() => Cell::Null,
            Data::String(s) => Cell::String(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Boolean(*b),
            // 原生日期儲存格保留為日期
            Data::DateTime(_) | Data::DateTimeIso(_) => cell
                .as_datetime()
                .map(Cell::Date)
                .unwrap_or_else(|| Cell::String(cell.to_string())),
            Data::DurationIso(s) => Cell::String(s.clone()),
            Data::Error(e) => Cell::String(e.to_string()),
        }
    }

    fn read_delimited(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
        let content = String::from_utf8_lossy(bytes);
        let content = content.trim_start_matches('\u{feff}');
        let delimiter = detect_delimiter(content);
        tracing::debug!("Detected delimiter {:?}", delimiter as char);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(content.as_bytes());

        let mut grid = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| EtlError::ParseError {
                message: format!("Failed to parse line {}: {}", index + 1, e),
            })?;
            grid.push(
                record
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            Cell::Null
                        } else {
                            Cell::String(field.to_string())
                        }
                    })
                    .collect(),
            );
        }
        Ok(grid)
    }

    fn build_table(&self, grid: Vec<Vec<Cell>>) -> Result<ParsedTable> {
        let mut rows = grid
            .into_iter()
            .filter(|row| !row.iter().all(Cell::is_blank));

        let header_row = rows.next().ok_or(EtlError::EmptyFile)?;
        let data_rows: Vec<Vec<Cell>> = rows.collect();

        let width = data_rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header_row.len()))
            .max()
            .unwrap_or(0);

        let headers: Vec<String> = (0..width)
            .map(|index| match header_row.get(index) {
                Some(cell) if !cell.is_blank() => cell.to_string(),
                _ => format!("Column {}", index + 1),
            })
            .collect();
        let headers = match self.header_policy {
            HeaderPolicy::Suffix => suffix_duplicate_headers(headers),
            HeaderPolicy::Preserve => headers,
        };

        if data_rows.is_empty() {
            return Err(EtlError::EmptyFile);
        }

        let rows = data_rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Null);
                row
            })
            .collect();

        Ok(ParsedTable { headers, rows })
    }
}

/// `Name`, `Name` → `Name`, `Name_2`；改名後若仍撞名則繼續遞增
fn suffix_duplicate_headers(headers: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut taken: std::collections::HashSet<String> = headers.iter().cloned().collect();
    let mut result = Vec::with_capacity(headers.len());

    for header in headers {
        let count = counts.entry(header.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            result.push(header);
            continue;
        }

        let mut n = *count;
        let mut candidate = format!("{}_{}", header, n);
        while taken.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}", header, n);
        }
        *count = n;
        taken.insert(candidate.clone());
        result.push(candidate);
    }

    result
}

/// 以前幾行各候選字元出現次數的一致性打分，選出最可能的分隔字元
pub fn detect_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .collect();

    if sample.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0.0f32;

    for &delimiter in &DELIMITER_CANDIDATES {
        let counts: Vec<f32> = sample
            .iter()
            .map(|line| line.bytes().filter(|&b| b == delimiter).count() as f32)
            .collect();

        let avg = counts.iter().sum::<f32>() / counts.len() as f32;
        let variance =
            counts.iter().map(|c| (c - avg).powi(2)).sum::<f32>() / counts.len() as f32;
        let score = avg / (1.0 + variance.sqrt());

        if score > best_score {
            best_score = score;
            best = delimiter;
        }
    }

    best
}
