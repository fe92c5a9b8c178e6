use crate::domain::model::{
    CleaningOptions, Dataset, DatasetRow, DeliveryReceipt, GeneratedPitch, HeaderPolicy,
    NewDataset, OutboundEmail, ParsedTable, SendQuota, SenderIdentity, TransformResult,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn input_file(&self) -> &str;
    fn output_path(&self) -> &str;
    /// 空陣列代表全部欄位
    fn selected_columns(&self) -> &[String];
    fn cleaning_options(&self) -> CleaningOptions;
    fn header_policy(&self) -> HeaderPolicy;
    fn dataset_name(&self) -> Option<&str>;
}

/// 資料集與資料列的 CRUD
pub trait DatasetStore: Send + Sync {
    fn create_dataset(
        &self,
        dataset: NewDataset,
    ) -> impl std::future::Future<Output = Result<Dataset>> + Send;
    fn insert_rows(
        &self,
        rows: Vec<DatasetRow>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// 依 row_index 排序
    fn rows_for_dataset(
        &self,
        dataset_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<DatasetRow>>> + Send;
    fn delete_dataset(&self, dataset_id: &str)
        -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait PitchStore: Send + Sync {
    /// 回傳儲存端指派的 id
    fn insert_pitch(
        &self,
        pitch: &GeneratedPitch,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
    fn update_pitch(
        &self,
        id: &str,
        pitch: &GeneratedPitch,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn pitches_for_user(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<GeneratedPitch>>> + Send;
}

/// 每日寄送額度；每日歸零由外部負責
pub trait QuotaStore: Send + Sync {
    fn get(&self, user_id: &str) -> impl std::future::Future<Output = Result<SendQuota>> + Send;
    /// 原子地預留 `count` 封額度；剩餘不足時回傳 `QuotaExceeded` 且不變動額度
    fn reserve(
        &self,
        user_id: &str,
        count: usize,
    ) -> impl std::future::Future<Output = Result<SendQuota>> + Send;
    /// 退回未使用的預留額度
    fn release(
        &self,
        user_id: &str,
        count: usize,
    ) -> impl std::future::Future<Output = Result<SendQuota>> + Send;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, sender: &SenderIdentity, email: &OutboundEmail) -> Result<DeliveryReceipt>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<ParsedTable>;
    async fn transform(&self, table: ParsedTable) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
