//! Deferred continuation timers for sequential campaigns.
//!
//! Each sequential campaign has at most one armed timer. Arming a new timer
//! for a campaign silently replaces the previous one; the old sleep still
//! runs out but its continuation is suppressed by the swapped flag.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;

/// Type alias for deferred continuation futures.
pub type ContinuationTask = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct ContinuationTimers {
    pub(crate) armed: RwLock<HashMap<i32, Arc<AtomicBool>>>,
}

impl Default for ContinuationTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuationTimers {
    pub fn new() -> Self {
        Self {
            armed: RwLock::new(HashMap::new()),
        }
    }

    /// Arms (or re-arms) the timer for `campaign_id`: after `delay`, runs the
    /// continuation unless the timer was disarmed or replaced in the
    /// meantime.
    #[tracing::instrument(skip(self, f))]
    pub async fn arm<F>(&self, campaign_id: i32, delay: Duration, f: F)
    where
        F: FnOnce() -> ContinuationTask + Send + 'static,
    {
        let mut armed = self.armed.write().await;
        if let Some(flag) = armed.get(&campaign_id) {
            flag.store(false, Ordering::SeqCst); // cancel old
        }
        let flag = Arc::new(AtomicBool::new(true));
        armed.insert(campaign_id, flag.clone());
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if flag.load(Ordering::SeqCst) {
                f().await;
            }
        });
    }

    /// Whether a timer is currently armed for this campaign.
    #[tracing::instrument(skip(self))]
    pub async fn is_armed(&self, campaign_id: i32) -> bool {
        let armed = self.armed.read().await;
        armed.contains_key(&campaign_id)
    }

    /// Disarms the timer for the given campaign.
    #[tracing::instrument(skip(self))]
    pub async fn disarm(&self, campaign_id: i32) {
        let mut armed = self.armed.write().await;
        if let Some(flag) = armed.remove(&campaign_id) {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// Disarms every timer. Used on shutdown.
    #[tracing::instrument(skip(self))]
    pub async fn disarm_all(&self) {
        let mut armed = self.armed.write().await;
        for flag in armed.values() {
            flag.store(false, Ordering::SeqCst);
        }
        armed.clear();
    }
}
