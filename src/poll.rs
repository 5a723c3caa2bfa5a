use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Re-runs a fetch on a fixed period until stopped or dropped.
///
/// The first tick fires immediately. Ticks never overlap: a slow fetch delays
/// the next one instead of racing it.
#[derive(Debug)]
pub struct RefreshTimer {
    handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    pub fn start<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });
        tracing::debug!(period_secs = period.as_secs(), "refresh timer started");
        Self {
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("refresh timer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counting_timer(period: Duration) -> (RefreshTimer, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::clone(&count);
        let timer = RefreshTimer::start(period, move || {
            let ticks = Arc::clone(&ticks);
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });
        (timer, count)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_schedule() {
        let (timer, count) = counting_timer(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_delays_instead_of_bursting() {
        let count = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::clone(&count);
        let _timer = RefreshTimer::start(Duration::from_secs(30), move || {
            let seen = ticks.fetch_add(1, Ordering::SeqCst);
            async move {
                if seen == 0 {
                    tokio::time::sleep(Duration::from_secs(70)).await;
                }
            }
        });

        // The first fetch ends at 70s; the ticks missed at 30s and 60s
        // collapse into one, and the schedule restarts from there.
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_ticks() {
        let (mut timer, count) = counting_timer(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        timer.stop();
        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_pending_ticks() {
        let (timer, count) = counting_timer(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(timer);
        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
