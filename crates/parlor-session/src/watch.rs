//! Grace timers for disconnected players.
//!
//! Losing a user's last connection in a room does not remove them from
//! the game immediately; it arms a timer here. Resubscribing before the
//! deadline disarms it. Only an expired timer runs the departure action,
//! and it runs at most once per arming.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use parlor_protocol::{RoomCode, UserId};
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// A departure timer that has not fired yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDisconnect {
    pub room: RoomCode,
    pub user: UserId,
    pub deadline: Instant,
}

struct Timer {
    handle: JoinHandle<()>,
    deadline: Instant,
    generation: u64,
}

type TimerMap = HashMap<(RoomCode, UserId), Timer>;

pub struct DisconnectWatch {
    grace: Duration,
    generations: AtomicU64,
    pending: Arc<Mutex<TimerMap>>,
}

impl DisconnectWatch {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            generations: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    fn lock(map: &Mutex<TimerMap>) -> std::sync::MutexGuard<'_, TimerMap> {
        map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the departure timer for `(room, user)`. An existing timer for
    /// the same key is replaced, never doubled.
    ///
    /// `on_expire` runs on the timer task after the grace window, unless
    /// [`cancel`](Self::cancel) wins first. The generation stamp closes
    /// the race between an expiring timer and its replacement: a timer
    /// only fires while it is still the registered one.
    pub fn schedule<F, Fut>(&self, room: RoomCode, user: UserId, on_expire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = (room.clone(), user);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.grace;

        let grace = self.grace;
        let task_map = Arc::clone(&self.pending);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let armed = {
                let mut pending = Self::lock(&task_map);
                match pending.get(&task_key) {
                    Some(timer) if timer.generation == generation => {
                        pending.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };
            if armed {
                debug!(room = %task_key.0, user = %task_key.1, "disconnect grace expired");
                on_expire().await;
            }
        });

        let mut pending = Self::lock(&self.pending);
        if let Some(old) = pending.insert(key, Timer { handle, deadline, generation }) {
            old.handle.abort();
        }
    }

    /// Disarms a pending timer. Returns `false` when there was none,
    /// including when the timer already fired.
    pub fn cancel(&self, room: &RoomCode, user: UserId) -> bool {
        let removed = Self::lock(&self.pending).remove(&(room.clone(), user));
        match removed {
            Some(timer) => {
                timer.handle.abort();
                debug!(room = %room, user = %user, "disconnect grace cancelled");
                true
            }
            None => false,
        }
    }

    /// Snapshot of the timers currently armed.
    pub fn pending(&self) -> Vec<PendingDisconnect> {
        Self::lock(&self.pending)
            .iter()
            .map(|((room, user), timer)| PendingDisconnect {
                room: room.clone(),
                user: *user,
                deadline: timer.deadline,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        Self::lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DisconnectWatch {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl Drop for DisconnectWatch {
    fn drop(&mut self) {
        for (_, timer) in Self::lock(&self.pending).drain() {
            timer.handle.abort();
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn room(code: &str) -> RoomCode {
        RoomCode::new(code)
    }

    fn counter_action(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_expiry_fires_action_once() {
        let watch = DisconnectWatch::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicUsize::new(0));

        watch.schedule(room("AB12"), UserId(1), counter_action(&fired));
        assert_eq!(watch.len(), 1);

        tokio::time::sleep(Duration::from_millis(90)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(watch.is_empty(), "a fired timer leaves the map");
    }

    #[tokio::test]
    async fn test_cancel_before_deadline_prevents_firing() {
        let watch = DisconnectWatch::new(Duration::from_millis(60));
        let fired = Arc::new(AtomicUsize::new(0));

        watch.schedule(room("AB12"), UserId(1), counter_action(&fired));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(watch.cancel(&room("AB12"), UserId(1)));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_without_timer_reports_false() {
        let watch = DisconnectWatch::new(Duration::from_millis(10));
        assert!(!watch.cancel(&room("AB12"), UserId(1)));
    }

    #[tokio::test]
    async fn test_reschedule_replaces_previous_timer() {
        let watch = DisconnectWatch::new(Duration::from_millis(50));
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        watch.schedule(room("AB12"), UserId(1), counter_action(&first));
        tokio::time::sleep(Duration::from_millis(10)).await;
        watch.schedule(room("AB12"), UserId(1), counter_action(&second));
        assert_eq!(watch.len(), 1, "same key keeps a single timer");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0, "replaced timer must not fire");
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_user_in_two_rooms_keeps_two_timers() {
        let watch = DisconnectWatch::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicUsize::new(0));

        watch.schedule(room("AB12"), UserId(1), counter_action(&fired));
        watch.schedule(room("CD34"), UserId(1), counter_action(&fired));
        assert_eq!(watch.len(), 2);

        tokio::time::sleep(Duration::from_millis(90)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pending_reports_deadline_within_grace() {
        let watch = DisconnectWatch::new(Duration::from_secs(30));
        let before = Instant::now();
        watch.schedule(room("AB12"), UserId(7), || std::future::ready(()));

        let pending = watch.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].user, UserId(7));
        assert!(pending[0].deadline >= before);
        assert!(pending[0].deadline <= before + Duration::from_secs(31));

        watch.cancel(&room("AB12"), UserId(7));
    }
}
