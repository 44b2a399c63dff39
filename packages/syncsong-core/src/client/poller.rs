//! Cancellable periodic polling bound to one (session, queue entry, provider).
//!
//! A poll loop that outlives the context it was started for would publish a
//! position for the wrong track, so replacing the context always cancels the
//! previous loop before the next one starts.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What a poll loop is sampling for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollContext {
    pub session_id: String,
    pub queue_id: Option<String>,
    pub provider: String,
}

/// One running poll loop. Cancelled on drop.
pub struct PollTask {
    context: PollContext,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Spawns a loop calling `tick` every `interval` until cancelled.
    ///
    /// Cancellation also interrupts a tick that is in flight.
    pub fn spawn<F, Fut>(context: PollContext, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut(PollContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let loop_context = context.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tick(loop_context.clone()) => {}
                }
            }
            log::debug!("[Client] Poll loop stopped for {:?}", loop_context.queue_id);
        });

        Self {
            context,
            cancel_token,
            handle,
        }
    }

    pub fn context(&self) -> &PollContext {
        &self.context
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Holds at most one poll loop.
#[derive(Default)]
pub struct Poller {
    current: Option<PollTask>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> Option<&PollContext> {
        self.current.as_ref().map(PollTask::context)
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Ensures a loop is running for `context`.
    ///
    /// Keeps the current loop when the context is unchanged; otherwise cancels
    /// it and starts a new one. Returns true when a new loop was started.
    pub fn ensure<F, Fut>(&mut self, context: PollContext, interval: Duration, tick: F) -> bool
    where
        F: FnMut(PollContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.context() == Some(&context) {
            return false;
        }
        self.stop();
        self.current = Some(PollTask::spawn(context, interval, tick));
        true
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.current.take() {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn context(queue_id: &str) -> PollContext {
        PollContext {
            session_id: "ABC123".into(),
            queue_id: Some(queue_id.into()),
            provider: "spotify".into(),
        }
    }

    fn counting_tick(
        counter: Arc<AtomicUsize>,
    ) -> impl FnMut(PollContext) -> futures::future::Ready<()> + Send + 'static {
        move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut poller = Poller::new();
        assert!(poller.ensure(
            context("q1"),
            Duration::from_millis(500),
            counting_tick(ticks.clone())
        ));

        tokio::time::sleep(Duration::from_millis(1_250)).await;
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected ticks, saw {}", seen);

        poller.stop();
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn same_context_keeps_loop_and_new_context_replaces_it() {
        let old_ticks = Arc::new(AtomicUsize::new(0));
        let new_ticks = Arc::new(AtomicUsize::new(0));
        let mut poller = Poller::new();

        poller.ensure(
            context("q1"),
            Duration::from_millis(500),
            counting_tick(old_ticks.clone()),
        );
        assert!(!poller.ensure(
            context("q1"),
            Duration::from_millis(500),
            counting_tick(new_ticks.clone())
        ));

        assert!(poller.ensure(
            context("q2"),
            Duration::from_millis(500),
            counting_tick(new_ticks.clone())
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let old_seen = old_ticks.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(old_ticks.load(Ordering::SeqCst), old_seen);
        assert!(new_ticks.load(Ordering::SeqCst) >= 2);
        assert_eq!(poller.context().unwrap().queue_id.as_deref(), Some("q2"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_in_flight_tick() {
        let finished = Arc::new(AtomicUsize::new(0));
        let done = finished.clone();
        let task = PollTask::spawn(context("q1"), Duration::from_millis(500), move |_ctx| {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.cancel();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(task.is_finished());
    }
}
