use crate::core::{Cell, Record};
use crate::domain::model::GeneratedPitch;
use crate::utils::error::{EtlError, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};

pub const DATA_SHEET: &str = "Data";
pub const PITCHES_SHEET: &str = "Data with Pitches";
pub const ORIGINAL_SHEET: &str = "Original Data";

/// 以指定分隔符號輸出，含標題列
pub fn to_delimited(columns: &[String], records: &[Record], delimiter: u8) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|column| {
            record
                .get(column)
                .map(|value| value.to_string())
                .unwrap_or_default()
        }))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| EtlError::ParseError {
        message: format!("Delimited output is not valid UTF-8: {}", e),
    })
}

pub fn to_csv(columns: &[String], records: &[Record]) -> Result<String> {
    to_delimited(columns, records, b',')
}

pub fn to_tsv(columns: &[String], records: &[Record]) -> Result<String> {
    to_delimited(columns, records, b'\t')
}

/// 單一工作表 "Data"
pub fn to_xlsx(columns: &[String], records: &[Record]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet().set_name(DATA_SHEET)?;
    write_sheet(sheet, columns, records.iter().map(|r| row_cells(r, columns)))?;
    Ok(workbook.save_to_buffer()?)
}

/// 兩個工作表：附上推銷信的資料，以及原始資料
pub fn pitches_workbook(columns: &[String], pitches: &[GeneratedPitch]) -> Result<Vec<u8>> {
    let mut enriched_columns = columns.to_vec();
    enriched_columns.extend(["Subject", "Pitch", "Status"].map(String::from));

    let mut workbook = Workbook::new();

    let enriched = workbook.add_worksheet().set_name(PITCHES_SHEET)?;
    write_sheet(
        enriched,
        &enriched_columns,
        pitches.iter().map(|pitch| {
            let mut cells = row_cells(&pitch.recipient_data, columns);
            cells.push(Cell::from(pitch.subject.as_str()));
            cells.push(Cell::from(pitch.content.as_str()));
            cells.push(Cell::String(pitch.status.to_string()));
            cells
        }),
    )?;

    let original = workbook.add_worksheet().set_name(ORIGINAL_SHEET)?;
    write_sheet(
        original,
        columns,
        pitches
            .iter()
            .map(|pitch| row_cells(&pitch.recipient_data, columns)),
    )?;

    tracing::info!("📊 Built pitch workbook with {} rows", pitches.len());
    Ok(workbook.save_to_buffer()?)
}

fn row_cells(record: &Record, columns: &[String]) -> Vec<Cell> {
    columns
        .iter()
        .map(|column| record.get(column).cloned().unwrap_or(Cell::Null))
        .collect()
}

fn position(row: usize, col: usize) -> Result<(u32, u16)> {
    let row = u32::try_from(row).map_err(|_| EtlError::ValidationError {
        message: format!("Too many rows for a worksheet: {}", row),
    })?;
    let col = u16::try_from(col).map_err(|_| EtlError::ValidationError {
        message: format!("Too many columns for a worksheet: {}", col),
    })?;
    Ok((row, col))
}

fn write_sheet<I>(sheet: &mut Worksheet, columns: &[String], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<Cell>>,
{
    let header = Format::new().set_bold();
    let date = Format::new().set_num_format("yyyy-mm-dd");
    let datetime = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    for (index, column) in columns.iter().enumerate() {
        let (_, col) = position(0, index)?;
        sheet.write_string_with_format(0, col, column, &header)?;
    }

    for (row_index, cells) in rows.into_iter().enumerate() {
        for (col_index, cell) in cells.iter().enumerate() {
            let (row, col) = position(row_index + 1, col_index)?;
            match cell {
                Cell::Null => {}
                Cell::Boolean(b) => {
                    sheet.write_boolean(row, col, *b)?;
                }
                Cell::Number(n) => {
                    sheet.write_number(row, col, *n)?;
                }
                Cell::Date(d) if d.time() == chrono::NaiveTime::MIN => {
                    sheet.write_datetime_with_format(row, col, d, &date)?;
                }
                Cell::Date(d) => {
                    sheet.write_datetime_with_format(row, col, d, &datetime)?;
                }
                Cell::String(s) => {
                    sheet.write_string(row, col, s)?;
                }
            }
        }
    }

    Ok(())
}
