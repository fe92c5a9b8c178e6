use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// 固定間隔節流器。
///
/// 每個工作單元完成後呼叫 [`Throttle::arm`]，下一次 [`Throttle::ready`]
/// 會等到間隔結束。從未 arm 過的節流器不會等待。
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_allowed: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn ready(&self) {
        let next = *self.next_allowed.lock().await;
        if let Some(deadline) = next {
            if deadline > Instant::now() {
                tracing::debug!("⏳ Throttling for {:?}", deadline - Instant::now());
                sleep_until(deadline).await;
            }
        }
    }

    pub async fn arm(&self) {
        if self.interval.is_zero() {
            return;
        }
        *self.next_allowed.lock().await = Some(Instant::now() + self.interval);
    }
}
