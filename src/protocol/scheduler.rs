use std::future::Future;
use std::time::Duration;
use log::{debug, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Fire now and restart the period from here.
    Rearm,
    /// One extra fire, period untouched.
    FireNow,
}

/// Periodic tick source driving route advertisements.
///
/// Fires immediately when armed, then every `period`. A zero period fires
/// once per arming and never repeats. Ticks run on their own task, one at a
/// time; once [`Scheduler::cancel`] is called no new tick starts, and a tick
/// already running gets a grace period to finish before it is aborted.
pub struct Scheduler {
    commands: mpsc::UnboundedSender<Command>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn arm<F, Fut>(period: Duration, on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            tick_task(period, on_tick, command_rx, shutdown_rx).await;
        });

        Self {
            commands,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn rearm(&self) {
        let _ = self.commands.send(Command::Rearm);
    }

    pub fn fire_now(&self) {
        let _ = self.commands.send(Command::FireNow);
    }

    /// Stops the schedule and waits up to `grace` for an in-flight tick to
    /// complete. A tick still running after that is aborted.
    pub async fn cancel(mut self, grace: Duration) {
        let _ = self.shutdown_tx.send(());
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        match timeout(grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Advertisement task ended abnormally: {}", e),
            Err(_) => {
                warn!("Advertisement still in flight after {:?}, aborting it", grace);
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn tick_task<F, Fut>(
    period: Duration,
    mut on_tick: F,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut deadline = Some(Instant::now());

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!("Advertisement scheduler shutting down");
                break;
            }
            command = command_rx.recv() => match command {
                Some(Command::Rearm) => {
                    debug!("Advertisement scheduler rearmed");
                    deadline = Some(Instant::now());
                }
                Some(Command::FireNow) => on_tick().await,
                None => break,
            },
            _ = wait_for(deadline) => {
                on_tick().await;
                deadline = deadline.and_then(|fired| next_deadline(fired, period));
            }
        }
    }
}

fn next_deadline(fired: Instant, period: Duration) -> Option<Instant> {
    if period.is_zero() {
        return None;
    }
    Some((fired + period).max(Instant::now()))
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    const GRACE: Duration = Duration::from_secs(1);

    fn counting(
        counter: Arc<AtomicUsize>,
    ) -> impl FnMut() -> std::future::Ready<()> + Send + 'static {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_immediately_then_periodically() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::arm(Duration::from_millis(100), counting(ticks.clone()));

        sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(340)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);

        scheduler.cancel(GRACE).await;
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_fires_now_and_restarts_period() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::arm(Duration::from_millis(1000), counting(ticks.clone()));

        sleep(Duration::from_millis(10)).await;
        scheduler.rearm();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        // Old schedule would have fired at 1000ms.
        sleep(Duration::from_millis(985)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        scheduler.cancel(GRACE).await;
    }

    #[tokio::test(start_paused = true)]
    async fn fire_now_keeps_schedule() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::arm(Duration::from_millis(1000), counting(ticks.clone()));

        sleep(Duration::from_millis(10)).await;
        scheduler.fire_now();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        sleep(Duration::from_millis(985)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        scheduler.cancel(GRACE).await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_fires_once_per_arming() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::arm(Duration::ZERO, counting(ticks.clone()));

        sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        scheduler.rearm();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        scheduler.cancel(GRACE).await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_future_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::arm(Duration::from_millis(100), counting(ticks.clone()));

        sleep(Duration::from_millis(150)).await;
        scheduler.cancel(GRACE).await;
        let after_cancel = ticks.load(Ordering::SeqCst);
        assert_eq!(after_cancel, 2);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_waits_for_in_flight_tick() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (s, f) = (started.clone(), finished.clone());

        let scheduler = Scheduler::arm(Duration::from_millis(1000), move || {
            let (s, f) = (s.clone(), f.clone());
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(50)).await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_millis(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        scheduler.cancel(GRACE).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_tick_stuck_past_grace() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (s, f) = (started.clone(), finished.clone());

        let scheduler = Scheduler::arm(Duration::from_millis(1000), move || {
            let (s, f) = (s.clone(), f.clone());
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_millis(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        let begin = Instant::now();
        scheduler.cancel(Duration::from_millis(200)).await;
        assert!(begin.elapsed() >= Duration::from_millis(200));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
