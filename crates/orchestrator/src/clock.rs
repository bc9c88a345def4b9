#![forbid(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Wall-clock time, used to stamp quarantined file names.
    fn now(&self) -> DateTime<Local>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
