use crate::core::inference::column_mappings;
use crate::core::{ColumnProfile, Record};
use crate::domain::model::{Dataset, DatasetRow, NewDataset};
use crate::domain::ports::DatasetStore;
use crate::utils::error::{EtlError, Result};

pub const INSERT_BATCH_SIZE: usize = 100;

/// 把清理後的資料列寫入資料集儲存
pub struct DatasetImport<'a, S: DatasetStore> {
    store: &'a S,
    batch_size: usize,
}

impl<'a, S: DatasetStore> DatasetImport<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            batch_size: INSERT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 建立資料集後分批寫入；某批失敗即中止，先前寫入的批次不回滾
    pub async fn import(
        &self,
        user_id: &str,
        name: &str,
        original_filename: &str,
        selected_columns: &[String],
        profiles: &[ColumnProfile],
        records: &[Record],
    ) -> Result<Dataset> {
        if name.trim().is_empty() {
            return Err(EtlError::ValidationError {
                message: "Dataset name cannot be empty".to_string(),
            });
        }

        let dataset = self
            .store
            .create_dataset(NewDataset {
                user_id: user_id.to_string(),
                name: name.trim().to_string(),
                original_filename: original_filename.to_string(),
                total_rows: records.len(),
                column_mappings: column_mappings(selected_columns, profiles),
            })
            .await
            .map_err(|e| as_persistence("create_dataset", e))?;
        tracing::info!("💾 Created dataset {} ({})", dataset.name, dataset.id);

        let rows: Vec<DatasetRow> = records
            .iter()
            .enumerate()
            .map(|(row_index, record)| DatasetRow {
                dataset_id: dataset.id.clone(),
                row_index,
                row_data: record.project(selected_columns),
            })
            .collect();

        let mut inserted = 0;
        for chunk in rows.chunks(self.batch_size) {
            self.store
                .insert_rows(chunk.to_vec())
                .await
                .map_err(|e| {
                    tracing::error!(
                        "❌ Row insert failed after {} of {} rows",
                        inserted,
                        rows.len()
                    );
                    as_persistence("insert_rows", e)
                })?;
            inserted += chunk.len();
            tracing::debug!("Inserted {}/{} rows", inserted, rows.len());
        }

        tracing::info!("✅ Imported {} rows into {}", inserted, dataset.id);
        Ok(dataset)
    }
}

fn as_persistence(operation: &str, error: EtlError) -> EtlError {
    match error {
        EtlError::PersistenceError { .. } => error,
        other => EtlError::PersistenceError {
            operation: operation.to_string(),
            message: other.to_string(),
        },
    }
}
