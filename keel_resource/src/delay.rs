use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Callback armed on a [`DelayedAction`]; produces the future run at expiry
pub type DelayedCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Cancellable, pausable one-shot timer
///
/// At most one callback is pending at a time: arming again replaces the
/// previous callback and restarts the countdown. Pausing freezes the
/// remaining countdown without dropping the callback.
pub struct DelayedAction {
    inner: Arc<Mutex<DelayedInner>>,
}

#[derive(Default)]
struct DelayedInner {
    callback: Option<DelayedCallback>,
    deadline: Option<Instant>,
    /// Remaining countdown while paused
    remaining: Option<Duration>,
    /// Bumped on every re-arm/cancel so a sleeper that already woke up can
    /// tell it has been superseded
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl DelayedAction {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DelayedInner::default())),
        }
    }

    /// Arm the timer, replacing any previously armed callback and restarting
    /// the countdown
    pub fn arm<F, Fut>(&self, duration: Duration, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: DelayedCallback = Box::new(move || Box::pin(callback()));
        let mut inner = lock(&self.inner);
        inner.epoch += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.callback = Some(callback);
        inner.remaining = None;
        let deadline = Instant::now() + duration;
        inner.deadline = Some(deadline);
        inner.task = Some(Self::spawn_sleeper(self.inner.clone(), inner.epoch, deadline));
    }

    /// Clear the callback and timer without firing
    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        inner.epoch += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.callback = None;
        inner.deadline = None;
        inner.remaining = None;
    }

    /// Invoke the armed callback immediately, then clear the timer
    pub async fn fire_now(&self) {
        let callback = {
            let mut inner = lock(&self.inner);
            inner.epoch += 1;
            if let Some(task) = inner.task.take() {
                task.abort();
            }
            inner.deadline = None;
            inner.remaining = None;
            inner.callback.take()
        };
        if let Some(callback) = callback {
            callback().await;
        }
    }

    /// Freeze the countdown, keeping the elapsed portion
    pub fn pause(&self) {
        let mut inner = lock(&self.inner);
        let Some(deadline) = inner.deadline.take() else {
            return;
        };
        inner.epoch += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.remaining = Some(deadline.saturating_duration_since(Instant::now()));
    }

    /// Resume a paused countdown from where it left off
    pub fn resume(&self) {
        let mut inner = lock(&self.inner);
        let Some(remaining) = inner.remaining.take() else {
            return;
        };
        inner.epoch += 1;
        let deadline = Instant::now() + remaining;
        inner.deadline = Some(deadline);
        inner.task = Some(Self::spawn_sleeper(self.inner.clone(), inner.epoch, deadline));
    }

    /// Whether a callback is pending (armed or paused)
    pub fn is_armed(&self) -> bool {
        lock(&self.inner).callback.is_some()
    }

    fn spawn_sleeper(
        shared: Arc<Mutex<DelayedInner>>,
        epoch: u64,
        deadline: Instant,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let callback = {
                let mut inner = lock(&shared);
                if inner.epoch != epoch {
                    return;
                }
                inner.deadline = None;
                inner.task = None;
                inner.callback.take()
            };
            if let Some(callback) = callback {
                callback().await;
            }
        })
    }
}

fn lock(inner: &Mutex<DelayedInner>) -> MutexGuard<'_, DelayedInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for DelayedAction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DelayedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("DelayedAction")
            .field("armed", &inner.callback.is_some())
            .field("paused", &inner.remaining.is_some())
            .finish()
    }
}

impl Drop for DelayedAction {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn bump(count: &Arc<AtomicU32>) -> impl FnOnce() -> BoxFuture<'static, ()> + Send + 'static {
        let count = count.clone();
        move || {
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_duration() {
        let count = Arc::new(AtomicU32::new(0));
        let timer = DelayedAction::new();
        timer.arm(Duration::from_millis(100), bump(&count));
        assert!(timer.is_armed());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_restarts_countdown() {
        let count = Arc::new(AtomicU32::new(0));
        let timer = DelayedAction::new();
        timer.arm(Duration::from_millis(100), bump(&count));
        tokio::time::sleep(Duration::from_millis(60)).await;
        timer.arm(Duration::from_millis(100), bump(&count));
        // 80ms into the second countdown the original deadline has long
        // passed; nothing may have fired yet
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let count = Arc::new(AtomicU32::new(0));
        let timer = DelayedAction::new();
        timer.arm(Duration::from_millis(100), bump(&count));
        timer.cancel();
        assert!(!timer.is_armed());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fire_now_is_immediate_and_clears() {
        let count = Arc::new(AtomicU32::new(0));
        let timer = DelayedAction::new();
        timer.arm(Duration::from_secs(1000), bump(&count));
        timer.fire_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
        tokio::time::sleep(Duration::from_secs(2000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_preserves_remaining_time() {
        let count = Arc::new(AtomicU32::new(0));
        let timer = DelayedAction::new();
        timer.arm(Duration::from_millis(100), bump(&count));
        tokio::time::sleep(Duration::from_millis(40)).await;
        timer.pause();
        assert!(timer.is_armed());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        timer.resume();
        tokio::time::sleep(Duration::from_millis(59)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_is_last_write_wins() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let timer = DelayedAction::new();
        timer.arm(Duration::from_millis(50), bump(&first));
        timer.arm(Duration::from_millis(50), bump(&second));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
