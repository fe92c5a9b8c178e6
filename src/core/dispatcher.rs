use crate::core::rate_limit::Throttle;
use crate::domain::ports::QuotaStore;
use crate::utils::error::{EtlError, Result};
use futures::future::join_all;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_SEQUENTIAL_DELAY: Duration = Duration::from_secs(1);

/// 單一項目的結果，index 對應輸入順序
#[derive(Debug)]
pub struct DispatchOutcome<T> {
    pub index: usize,
    pub result: Result<T>,
}

impl<T> DispatchOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// 分批派送：批次內並行、批次間固定延遲。
///
/// 每批全部結束（成功或失敗）後才開始下一批；單一項目失敗不影響其他項目。
///
/// 節流狀態屬於派送器本身而非單次 [`BatchDispatcher::dispatch`]：
/// 同一個派送器連續派送時，下一次的第一批仍會等滿批次間延遲。
#[derive(Debug)]
pub struct BatchDispatcher {
    batch_size: usize,
    throttle: Throttle,
}

impl Default for BatchDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_BATCH_DELAY)
    }
}

impl BatchDispatcher {
    pub fn new(batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            throttle: Throttle::new(batch_delay),
        }
    }

    /// 一次一個，呼叫之間固定延遲
    pub fn sequential(delay: Duration) -> Self {
        Self::new(1, delay)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_delay(&self) -> Duration {
        self.throttle.interval()
    }

    pub async fn dispatch<I, T, F, Fut, P>(
        &self,
        items: Vec<I>,
        action: F,
        mut progress: P,
    ) -> Vec<DispatchOutcome<T>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnMut(Progress),
    {
        let total = items.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut pending = items.into_iter().enumerate().peekable();
        let mut batch_number = 0;

        while pending.peek().is_some() {
            self.throttle.ready().await;
            batch_number += 1;

            let batch: Vec<(usize, I)> = pending.by_ref().take(self.batch_size).collect();
            tracing::debug!("📤 Dispatching batch {} ({} items)", batch_number, batch.len());

            let settled = join_all(batch.into_iter().map(|(index, item)| {
                let call = action(item);
                async move {
                    DispatchOutcome {
                        index,
                        result: call.await,
                    }
                }
            }))
            .await;

            for outcome in &settled {
                if let Err(e) = &outcome.result {
                    tracing::warn!("❌ Item {} failed: {}", outcome.index, e);
                }
            }
            outcomes.extend(settled);
            self.throttle.arm().await;

            progress(Progress {
                completed: outcomes.len(),
                total,
            });
        }

        outcomes.sort_by_key(|outcome| outcome.index);

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        tracing::info!(
            "✅ Dispatch finished: {} succeeded, {} failed, {} batches",
            succeeded,
            total - succeeded,
            batch_number
        );
        outcomes
    }

    /// 先整批預留額度，超過剩餘額度時在任何呼叫前拒絕；
    /// 派送結束後退回失敗項目的額度。
    pub async fn dispatch_with_quota<Q, I, T, F, Fut, P>(
        &self,
        quota: &Q,
        user_id: &str,
        items: Vec<I>,
        action: F,
        progress: P,
    ) -> Result<Vec<DispatchOutcome<T>>>
    where
        Q: QuotaStore,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnMut(Progress),
    {
        let requested = items.len();
        match quota.reserve(user_id, requested).await {
            Ok(reserved) => tracing::debug!(
                "🎟️ Reserved {} sends for {} ({} remaining)",
                requested,
                user_id,
                reserved.remaining()
            ),
            Err(e) => {
                if let EtlError::QuotaExceeded { remaining, .. } = &e {
                    tracing::warn!(
                        "🚫 Quota exceeded for {}: {} requested, {} remaining",
                        user_id,
                        requested,
                        remaining
                    );
                }
                return Err(e);
            }
        }

        let outcomes = self.dispatch(items, action, progress).await;

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        if failed > 0 {
            if let Err(e) = quota.release(user_id, failed).await {
                tracing::error!("💥 Failed to release {} unused sends for {}: {}", failed, user_id, e);
            }
        }

        Ok(outcomes)
    }
}
