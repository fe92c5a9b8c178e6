use crate::domain::model::{Dataset, DatasetRow, GeneratedPitch, NewDataset, SendQuota};
use crate::domain::ports::{DatasetStore, PitchStore, QuotaStore};
use crate::utils::error::{EtlError, Result};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_DAILY_LIMIT: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuotaEntry {
    quota: SendQuota,
    day: NaiveDate,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    datasets: BTreeMap<String, Dataset>,
    rows: Vec<DatasetRow>,
    pitches: BTreeMap<String, GeneratedPitch>,
    quotas: HashMap<String, QuotaEntry>,
}

impl Snapshot {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// 跨日時歸零 sent_today
    fn quota_entry(&mut self, user_id: &str, default_limit: u32) -> &mut QuotaEntry {
        let today = Utc::now().date_naive();
        let entry = self
            .quotas
            .entry(user_id.to_string())
            .or_insert_with(|| QuotaEntry {
                quota: SendQuota {
                    daily_limit: default_limit,
                    sent_today: 0,
                },
                day: today,
            });
        if entry.day != today {
            tracing::info!("🔄 New day for {}, resetting sent count", user_id);
            entry.quota.sent_today = 0;
            entry.day = today;
        }
        entry
    }
}

/// 記憶體內的資料集、推銷信與額度儲存，可選擇寫入 JSON 快照。
///
/// 所有操作都在同一把非同步鎖下完成，額度預留因此是原子的。
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<Snapshot>>,
    snapshot_path: Option<PathBuf>,
    default_daily_limit: u32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Snapshot::default())),
            snapshot_path: None,
            default_daily_limit: DEFAULT_DAILY_LIMIT,
        }
    }

    pub fn with_daily_limit(mut self, daily_limit: u32) -> Self {
        self.default_daily_limit = daily_limit;
        self
    }

    /// 從快照檔載入；檔案不存在時從空白狀態開始
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| EtlError::PersistenceError {
                operation: "load_snapshot".to_string(),
                message: format!("{}: {}", path.display(), e),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("📄 No snapshot at {}, starting empty", path.display());
                Snapshot::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            state: Arc::new(Mutex::new(snapshot)),
            snapshot_path: Some(path),
            default_daily_limit: DEFAULT_DAILY_LIMIT,
        })
    }

    /// 設定使用者的每日上限，保留今日已寄出數
    pub async fn set_daily_limit(&self, user_id: &str, daily_limit: u32) -> Result<SendQuota> {
        let mut state = self.state.lock().await;
        let entry = state.quota_entry(user_id, self.default_daily_limit);
        entry.quota.daily_limit = daily_limit;
        let quota = entry.quota;
        self.save(&state).await?;
        Ok(quota)
    }

    pub async fn dataset(&self, dataset_id: &str) -> Option<Dataset> {
        self.state.lock().await.datasets.get(dataset_id).cloned()
    }

    async fn save(&self, state: &Snapshot) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| EtlError::PersistenceError {
                operation: "save_snapshot".to_string(),
                message: format!("{}: {}", path.display(), e),
            })
    }
}

impl DatasetStore for MemoryStore {
    async fn create_dataset(&self, dataset: NewDataset) -> Result<Dataset> {
        let mut state = self.state.lock().await;
        let id = state.next_id("dataset");
        let record = Dataset {
            id: id.clone(),
            user_id: dataset.user_id,
            name: dataset.name,
            original_filename: dataset.original_filename,
            total_rows: dataset.total_rows,
            column_mappings: dataset.column_mappings,
            created_at: Utc::now(),
        };
        state.datasets.insert(id, record.clone());
        self.save(&state).await?;
        Ok(record)
    }

    async fn insert_rows(&self, rows: Vec<DatasetRow>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(orphan) = rows
            .iter()
            .find(|row| !state.datasets.contains_key(&row.dataset_id))
        {
            return Err(EtlError::PersistenceError {
                operation: "insert_rows".to_string(),
                message: format!("dataset {} does not exist", orphan.dataset_id),
            });
        }
        state.rows.extend(rows);
        self.save(&state).await
    }

    async fn rows_for_dataset(&self, dataset_id: &str) -> Result<Vec<DatasetRow>> {
        let state = self.state.lock().await;
        let mut rows: Vec<DatasetRow> = state
            .rows
            .iter()
            .filter(|row| row.dataset_id == dataset_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.row_index);
        Ok(rows)
    }

    async fn delete_dataset(&self, dataset_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.datasets.remove(dataset_id).is_none() {
            return Err(EtlError::PersistenceError {
                operation: "delete_dataset".to_string(),
                message: format!("dataset {} does not exist", dataset_id),
            });
        }
        state.rows.retain(|row| row.dataset_id != dataset_id);
        self.save(&state).await
    }
}

impl PitchStore for MemoryStore {
    async fn insert_pitch(&self, pitch: &GeneratedPitch) -> Result<String> {
        let mut state = self.state.lock().await;
        let id = state.next_id("pitch");
        let mut stored = pitch.clone();
        stored.id = Some(id.clone());
        state.pitches.insert(id.clone(), stored);
        self.save(&state).await?;
        Ok(id)
    }

    async fn update_pitch(&self, id: &str, pitch: &GeneratedPitch) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(existing) = state.pitches.get_mut(id) else {
            return Err(EtlError::PersistenceError {
                operation: "update_pitch".to_string(),
                message: format!("pitch {} does not exist", id),
            });
        };
        *existing = pitch.clone();
        existing.id = Some(id.to_string());
        self.save(&state).await
    }

    async fn pitches_for_user(&self, user_id: &str) -> Result<Vec<GeneratedPitch>> {
        let state = self.state.lock().await;
        let mut pitches: Vec<GeneratedPitch> = state
            .pitches
            .values()
            .filter(|pitch| pitch.user_id == user_id)
            .cloned()
            .collect();
        pitches.sort_by_key(|pitch| pitch.created_at);
        Ok(pitches)
    }
}

impl QuotaStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<SendQuota> {
        let mut state = self.state.lock().await;
        Ok(state.quota_entry(user_id, self.default_daily_limit).quota)
    }

    async fn reserve(&self, user_id: &str, count: usize) -> Result<SendQuota> {
        let mut state = self.state.lock().await;
        let entry = state.quota_entry(user_id, self.default_daily_limit);
        let remaining = entry.quota.remaining();
        if count > remaining as usize {
            return Err(EtlError::QuotaExceeded {
                remaining,
                requested: count,
            });
        }
        // count <= remaining <= u32::MAX
        entry.quota.sent_today += count as u32;
        let quota = entry.quota;
        self.save(&state).await?;
        Ok(quota)
    }

    async fn release(&self, user_id: &str, count: usize) -> Result<SendQuota> {
        let mut state = self.state.lock().await;
        let entry = state.quota_entry(user_id, self.default_daily_limit);
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        entry.quota.sent_today = entry.quota.sent_today.saturating_sub(count);
        let quota = entry.quota;
        self.save(&state).await?;
        Ok(quota)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Cell, PitchStatus, Record};
    use tempfile::TempDir;

    fn new_dataset(total_rows: usize) -> NewDataset {
        NewDataset {
            user_id: "user-1".to_string(),
            name: "Leads".to_string(),
            original_filename: "leads.csv".to_string(),
            total_rows,
            column_mappings: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_rows_are_returned_in_index_order() {
        let store = MemoryStore::new();
        let dataset = store.create_dataset(new_dataset(3)).await.unwrap();
        let row = |i: usize| DatasetRow {
            dataset_id: dataset.id.clone(),
            row_index: i,
            row_data: Record::new().with("Id", i as f64),
        };

        store.insert_rows(vec![row(2), row(0)]).await.unwrap();
        store.insert_rows(vec![row(1)]).await.unwrap();

        let rows = store.rows_for_dataset(&dataset.id).await.unwrap();
        let indexes: Vec<usize> = rows.iter().map(|r| r.row_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);

        store.delete_dataset(&dataset.id).await.unwrap();
        assert!(store.rows_for_dataset(&dataset.id).await.unwrap().is_empty());
        assert!(store.dataset(&dataset.id).await.is_none());
    }

    #[tokio::test]
    async fn test_insert_rows_for_unknown_dataset_fails() {
        let store = MemoryStore::new();
        let err = store
            .insert_rows(vec![DatasetRow {
                dataset_id: "missing".to_string(),
                row_index: 0,
                row_data: Record::new(),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::PersistenceError { .. }));
    }

    #[tokio::test]
    async fn test_pitch_insert_and_update() {
        let store = MemoryStore::new();
        let mut pitch = GeneratedPitch::new(
            "user-1",
            Record::new().with("Email", "a@x.com"),
            "Hi".to_string(),
            "Body".to_string(),
            PitchStatus::Generated,
        );
        let id = store.insert_pitch(&pitch).await.unwrap();
        pitch.mark_sent(Some("msg-1".to_string())).unwrap();
        store.update_pitch(&id, &pitch).await.unwrap();

        let stored = store.pitches_for_user("user-1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id.as_deref(), Some(id.as_str()));
        assert_eq!(stored[0].status, PitchStatus::Sent);
        assert!(store.update_pitch("pitch-404", &pitch).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_are_not_lost() {
        let store = MemoryStore::new().with_daily_limit(500);
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reserve("user-1", 1).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let quota = store.get("user-1").await.unwrap();
        assert_eq!(quota.sent_today, 50);
        assert_eq!(quota.remaining(), 450);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_limit() {
        let store = MemoryStore::new().with_daily_limit(5);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reserve("user-1", 2).await })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => granted += 1,
                Err(e) => assert!(matches!(e, EtlError::QuotaExceeded { requested: 2, .. })),
            }
        }

        assert_eq!(granted, 2);
        assert_eq!(store.get("user-1").await.unwrap().sent_today, 4);
    }

    #[tokio::test]
    async fn test_reserve_refuses_without_changing_quota() {
        let store = MemoryStore::new().with_daily_limit(3);
        store.reserve("user-1", 2).await.unwrap();

        let err = store.reserve("user-1", 2).await.unwrap_err();
        assert!(matches!(
            err,
            EtlError::QuotaExceeded {
                remaining: 1,
                requested: 2
            }
        ));
        assert_eq!(store.get("user-1").await.unwrap().sent_today, 2);

        let quota = store.release("user-1", 5).await.unwrap();
        assert_eq!(quota.sent_today, 0);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("store.json");

        let store = MemoryStore::open(&path).await.unwrap();
        store.set_daily_limit("user-1", 20).await.unwrap();
        store.reserve("user-1", 3).await.unwrap();
        store.release("user-1", 1).await.unwrap();

        let reopened = MemoryStore::open(&path).await.unwrap();
        let quota = reopened.get("user-1").await.unwrap();
        assert_eq!(quota.daily_limit, 20);
        assert_eq!(quota.sent_today, 2);
    }

    #[tokio::test]
    async fn test_reopened_rows_keep_cell_types() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");

        let store = MemoryStore::open(&path).await.unwrap();
        let dataset = store.create_dataset(new_dataset(1)).await.unwrap();
        store
            .insert_rows(vec![DatasetRow {
                dataset_id: dataset.id.clone(),
                row_index: 0,
                row_data: Record::new()
                    .with("Notes", "2024-01-15T10:30:00")
                    .with("Price", f64::NAN),
            }])
            .await
            .unwrap();

        let reopened = MemoryStore::open(&path).await.unwrap();
        let rows = reopened.rows_for_dataset(&dataset.id).await.unwrap();
        assert_eq!(
            rows[0].row_data.get("Notes"),
            Some(&Cell::from("2024-01-15T10:30:00"))
        );
        assert!(matches!(rows[0].row_data.get("Price"), Some(Cell::Number(n)) if n.is_nan()));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_a_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = MemoryStore::open(&path).await.unwrap_err();
        assert!(matches!(err, EtlError::PersistenceError { .. }));
    }
}
