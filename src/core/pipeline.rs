use crate::adapters::memory::MemoryStore;
use crate::core::cleaning::Cleaner;
use crate::core::export;
use crate::core::import::DatasetImport;
use crate::core::inference::TypeInferencer;
use crate::core::parser::SpreadsheetParser;
use crate::core::{ConfigProvider, ParsedTable, Pipeline, Storage, TransformResult};
use crate::domain::ports::DatasetStore;
use crate::utils::error::Result;
use crate::utils::validation::validate_column_selection;
use std::io::Write;
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};

pub const OUTPUT_ARCHIVE: &str = "lead_export.zip";

/// 讀檔 → 解析 → 推斷型別 → 清理 → 匯出 zip，可選擇同時寫入資料集
pub struct ImportPipeline<S: Storage, C: ConfigProvider, D: DatasetStore = MemoryStore> {
    storage: S,
    config: C,
    inferencer: TypeInferencer,
    datasets: Option<(D, String)>,
}

impl<S: Storage, C: ConfigProvider> ImportPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Result<Self> {
        Ok(Self {
            storage,
            config,
            inferencer: TypeInferencer::new()?,
            datasets: None,
        })
    }
}

impl<S: Storage, C: ConfigProvider, D: DatasetStore> ImportPipeline<S, C, D> {
    /// 設定資料集名稱時，載入階段也會把資料列寫入此儲存
    pub fn with_dataset_store<D2: DatasetStore>(
        self,
        store: D2,
        user_id: impl Into<String>,
    ) -> ImportPipeline<S, C, D2> {
        ImportPipeline {
            storage: self.storage,
            config: self.config,
            inferencer: self.inferencer,
            datasets: Some((store, user_id.into())),
        }
    }

    /// 空的欄位選擇代表全部欄位
    fn resolve_columns(&self, headers: &[String]) -> Result<Vec<String>> {
        let selected = self.config.selected_columns();
        if selected.is_empty() {
            return Ok(headers.to_vec());
        }
        validate_column_selection(selected, headers)?;
        Ok(selected.to_vec())
    }

    fn build_archive(&self, result: &TransformResult) -> Result<Vec<u8>> {
        let xlsx = export::to_xlsx(&result.columns, &result.records)?;
        let profile_json = serde_json::to_string_pretty(&result.profiles)?;

        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

        zip.start_file::<_, ()>("cleaned.csv", FileOptions::default())?;
        zip.write_all(result.csv_output.as_bytes())?;

        zip.start_file::<_, ()>("cleaned.tsv", FileOptions::default())?;
        zip.write_all(result.tsv_output.as_bytes())?;

        zip.start_file::<_, ()>("cleaned.xlsx", FileOptions::default())?;
        zip.write_all(&xlsx)?;

        zip.start_file::<_, ()>("profile.json", FileOptions::default())?;
        zip.write_all(profile_json.as_bytes())?;

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider, D: DatasetStore> Pipeline for ImportPipeline<S, C, D> {
    async fn extract(&self) -> Result<ParsedTable> {
        let input = self.config.input_file();
        tracing::debug!("Reading input file: {}", input);
        let bytes = self.storage.read_file(input).await?;

        let table = SpreadsheetParser::new()
            .with_header_policy(self.config.header_policy())
            .parse(&bytes)?;
        tracing::debug!("Parsed headers: {:?}", table.headers);
        Ok(table)
    }

    async fn transform(&self, table: ParsedTable) -> Result<TransformResult> {
        let columns = self.resolve_columns(&table.headers)?;
        let profiles = self.inferencer.profile_columns(&table);
        for profile in &profiles {
            tracing::debug!(
                "Column {}: {} ({} nulls, {} unique)",
                profile.name,
                profile.inferred_type,
                profile.null_count,
                profile.unique_count
            );
        }

        let cleaner = Cleaner::new(self.config.cleaning_options())?;
        let records = cleaner.clean(&table.records(), &columns);

        let csv_output = export::to_csv(&columns, &records)?;
        let tsv_output = export::to_tsv(&columns, &records)?;

        Ok(TransformResult {
            columns,
            profiles,
            records,
            csv_output,
            tsv_output,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let output_path = format!("{}/{}", self.config.output_path(), OUTPUT_ARCHIVE);

        let zip_data = self.build_archive(&result)?;
        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.storage.write_file(OUTPUT_ARCHIVE, &zip_data).await?;

        if let (Some((store, user_id)), Some(name)) = (&self.datasets, self.config.dataset_name()) {
            let input = self.config.input_file();
            let original_filename = Path::new(input)
                .file_name()
                .map(|file| file.to_string_lossy().into_owned())
                .unwrap_or_else(|| input.to_string());
            let dataset = DatasetImport::new(store)
                .import(
                    user_id,
                    name,
                    &original_filename,
                    &result.columns,
                    &result.profiles,
                    &result.records,
                )
                .await?;
            tracing::info!("💾 Dataset '{}' saved as {}", dataset.name, dataset.id);
        }

        Ok(output_path)
    }
}
