// Poller - Self-rescheduling fetch loop with cooperative cancellation
use crate::application::events::EventChannel;
use crate::application::scalar_api::ApiResponse;
use std::fmt::Display;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared liveness flag. Callbacks run while holding it, so once `cancel`
/// returns no callback is running and none will start.
#[derive(Debug, Clone)]
struct PollToken(Arc<Mutex<bool>>);

impl PollToken {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(true)))
    }

    fn guard(&self) -> MutexGuard<'_, bool> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_alive(&self) -> bool {
        *self.guard()
    }

    fn cancel(&self) {
        *self.guard() = false;
    }
}

/// Runs fetch-then-callback cycles, one at a time. The next cycle starts
/// `interval` after the previous one finished, never on a fixed clock.
#[derive(Debug)]
pub struct Poller {
    name: &'static str,
    token: PollToken,
    task: JoinHandle<()>,
}

impl Poller {
    /// Starts polling immediately.
    ///
    /// A `result: false` envelope is surfaced through `events` and skips the
    /// callback for that cycle; fetch errors are logged and swallowed. The
    /// callback returning `Break` ends the loop.
    pub fn start<T, E, F, Fut, C>(
        name: &'static str,
        interval: Duration,
        mut fetch: F,
        mut on_result: C,
        events: EventChannel,
    ) -> Self
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ApiResponse<T>, E>> + Send + 'static,
        C: FnMut(T) -> ControlFlow<()> + Send + 'static,
    {
        let token = PollToken::new();
        let cycle_token = token.clone();

        let task = tokio::spawn(async move {
            loop {
                if !cycle_token.is_alive() {
                    break;
                }
                let outcome = fetch().await;

                let flow = {
                    let alive = cycle_token.guard();
                    if !*alive {
                        break;
                    }
                    match outcome {
                        Ok(response) if response.result => match response.body {
                            Some(body) => on_result(body),
                            None => {
                                tracing::debug!("{} poll returned no body", name);
                                ControlFlow::Continue(())
                            }
                        },
                        Ok(response) => {
                            events.notify(response.message());
                            ControlFlow::Continue(())
                        }
                        Err(e) => {
                            tracing::debug!("{} poll cycle skipped: {}", name, e);
                            ControlFlow::Continue(())
                        }
                    }
                };

                if flow.is_break() {
                    tracing::debug!("{} poller finished", name);
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        });

        tracing::debug!("{} poller started ({:?})", name, interval);
        Self { name, token, task }
    }

    /// Stops the loop wherever it is: waiting, fetching, or not yet started.
    /// Safe to call repeatedly, but never from inside `on_result`: the callback
    /// holds the token this waits on. Return `ControlFlow::Break` instead.
    pub fn clear(&self) {
        self.token.cancel();
        self.task.abort();
        tracing::debug!("{} poller cleared", self.name);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::DashboardEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn counting_fetch(
        calls: Arc<AtomicUsize>,
        latency: Duration,
    ) -> impl FnMut() -> futures::future::BoxFuture<'static, Result<ApiResponse<usize>, String>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                tokio::time::sleep(latency).await;
                Ok(ApiResponse::success(calls.fetch_add(1, Ordering::SeqCst) + 1))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let poller = Poller::start(
            "test",
            Duration::from_secs(5),
            counting_fetch(calls.clone(), Duration::ZERO),
            move |n| {
                sink.lock().unwrap().push(n);
                ControlFlow::Continue(())
            },
            EventChannel::default(),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        poller.clear();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_counts_from_cycle_completion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let sink = stamps.clone();
        let start = Instant::now();

        let poller = Poller::start(
            "slow",
            Duration::from_secs(1),
            counting_fetch(calls.clone(), Duration::from_secs(3)),
            move |_| {
                sink.lock().unwrap().push(start.elapsed().as_secs());
                ControlFlow::Continue(())
            },
            EventChannel::default(),
        );
        tokio::time::sleep(Duration::from_secs(8) + Duration::from_millis(1)).await;
        poller.clear();

        // fetch 3s, wait 1s, fetch 3s
        assert_eq!(*stamps.lock().unwrap(), vec![3, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_mid_flight_suppresses_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();

        let poller = Poller::start(
            "mid",
            Duration::from_secs(1),
            counting_fetch(calls.clone(), Duration::from_secs(2)),
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            },
            EventChannel::default(),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        poller.clear();
        poller.clear();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(poller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_before_first_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));

        let poller = Poller::start(
            "unstarted",
            Duration::from_secs(1),
            counting_fetch(calls.clone(), Duration::ZERO),
            |_| ControlFlow::Continue(()),
            EventChannel::default(),
        );
        poller.clear();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(poller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_between_cycles() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();

        let poller = Poller::start(
            "waiting",
            Duration::from_secs(2),
            counting_fetch(calls.clone(), Duration::ZERO),
            move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            },
            EventChannel::default(),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        poller.clear();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(poller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_envelope_notifies_and_keeps_polling() {
        let events = EventChannel::default();
        let mut rx = events.subscribe();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let poller = Poller::start(
            "failing",
            Duration::from_secs(1),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok::<_, String>(ApiResponse::<()>::failure("file locked"))
                    } else {
                        Err("connection refused".to_string())
                    }
                }
            },
            |_| ControlFlow::Continue(()),
            events.clone(),
        );
        tokio::time::sleep(Duration::from_millis(2500)).await;
        poller.clear();

        assert_eq!(rx.recv().await.unwrap(), DashboardEvent::Notify("file locked".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_stops_polling() {
        let calls = Arc::new(AtomicUsize::new(0));

        let poller = Poller::start(
            "once",
            Duration::from_secs(1),
            counting_fetch(calls.clone(), Duration::ZERO),
            |n| {
                if n >= 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
            EventChannel::default(),
        );
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(poller.is_finished());
    }
}
