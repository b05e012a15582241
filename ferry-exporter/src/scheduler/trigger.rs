//! Interval trigger loop
//!
//! Fires a callable every `period` plus a random jitter. A tick that is
//! later than the misfire grace window is dropped; ticks missed while the
//! loop was late are coalesced into one; a tick that arrives while the
//! previous firing is still running is skipped.

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Timing of one recurring registration
#[derive(Debug, Clone, Copy)]
pub struct IntervalSchedule {
    pub period: Duration,
    /// Upper bound of the random delay added to each tick
    pub jitter: Duration,
    pub misfire_grace: Duration,
}

impl IntervalSchedule {
    fn jitter_sample(&self) -> Duration {
        let bound = self.jitter.min(self.period).as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
    }
}

/// Clears the max-one-instance flag when a firing ends, even by panic
struct InstanceGuard(Arc<AtomicBool>);

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs until aborted; each firing is spawned so aborting the loop never
/// cancels a firing already in flight
pub async fn run_interval<F, Fut>(
    name: String,
    schedule: IntervalSchedule,
    running: Arc<AtomicBool>,
    fire: F,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut next = Instant::now() + schedule.period;

    loop {
        let fire_at = next + schedule.jitter_sample();
        tokio::time::sleep_until(fire_at).await;

        let now = Instant::now();
        let lateness = now.saturating_duration_since(fire_at);

        if lateness > schedule.misfire_grace {
            warn!(
                "Run of {} was missed by {:?}, waiting for the next one",
                name, lateness
            );
        } else if running.swap(true, Ordering::AcqRel) {
            warn!("Skipping run of {}: previous run still in progress", name);
        } else {
            debug!("Firing {}", name);
            let guard = InstanceGuard(running.clone());
            let firing = fire();
            tokio::spawn(async move {
                let _guard = guard;
                firing.await;
            });
        }

        next += schedule.period;
        while next <= now {
            next += schedule.period;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn schedule(period_ms: u64) -> IntervalSchedule {
        IntervalSchedule {
            period: Duration::from_millis(period_ms),
            jitter: Duration::ZERO,
            misfire_grace: Duration::from_secs(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_every_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let handle = tokio::spawn(run_interval(
            "test".to_string(),
            schedule(100),
            Arc::new(AtomicBool::new(false)),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(350)).await;
        handle.abort();

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_tick_while_previous_still_running() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let handle = tokio::spawn(run_interval(
            "slow".to_string(),
            schedule(100),
            Arc::new(AtomicBool::new(false)),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            },
        ));

        // Fires at 100, skips 200 and 300, fires again at 400
        tokio::time::sleep(Duration::from_millis(450)).await;
        handle.abort();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborting_loop_leaves_firing_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let handle = tokio::spawn(run_interval(
            "abort".to_string(),
            schedule(100),
            Arc::new(AtomicBool::new(false)),
            move || {
                let flag = flag.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    flag.store(true, Ordering::SeqCst);
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(finished.load(Ordering::SeqCst));
    }

    fn counting_loop(schedule: IntervalSchedule) -> (tokio::task::JoinHandle<()>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let handle = tokio::spawn(run_interval(
            "late".to_string(),
            schedule,
            Arc::new(AtomicBool::new(false)),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));
        (handle, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_later_than_grace_is_dropped() {
        let (handle, count) = counting_loop(IntervalSchedule {
            misfire_grace: Duration::from_millis(50),
            ..schedule(100)
        });
        // Let the loop arm its first tick at 100ms
        tokio::time::sleep(Duration::from_millis(1)).await;

        // The 100ms tick is observed at 350ms, past the grace window
        tokio::time::advance(Duration::from_millis(349)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // The loop is back on the period grid and fires at 400ms
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_ticks_are_coalesced() {
        let (handle, count) = counting_loop(schedule(100));
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Ticks at 100, 200 and 300 all come due at once
        tokio::time::advance(Duration::from_millis(349)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_jitter_is_bounded_by_period() {
        let schedule = IntervalSchedule {
            period: Duration::from_millis(10),
            jitter: Duration::from_secs(300),
            misfire_grace: Duration::ZERO,
        };
        for _ in 0..100 {
            assert!(schedule.jitter_sample() <= Duration::from_millis(10));
        }
    }
}
