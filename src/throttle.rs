use log::trace;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

type Callback<A> = Arc<dyn Fn(A) + Send + Sync + 'static>;

#[derive(Default)]
struct State {
    last_ran: Option<Instant>,
    trailing: Option<JoinHandle<()>>,
}

/// Runs a callback at most once per `limit`.
///
/// A call outside the window runs right away. The first call inside the window
/// schedules one trailing run, with that call's arguments, for when the window
/// ends; further calls in the same window are dropped.
///
/// ```
/// use resilient_connector_rs::throttle::Throttle;
/// use tokio::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let on_progress = Throttle::new(Duration::from_millis(200), |pct: u32| {
///     println!("{}% done", pct);
/// });
/// for pct in 0..=100 {
///     on_progress.call(pct);
/// }
/// # }
/// ```
pub struct Throttle<A> {
    func: Callback<A>,
    limit: Duration,
    state: Arc<Mutex<State>>,
}

impl<A: Send + 'static> Throttle<A> {
    pub fn new<F>(limit: Duration, func: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            limit,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Runs or schedules the callback. Scheduling a trailing run requires a Tokio runtime.
    pub fn call(&self, args: A) {
        let now = Instant::now();
        let mut state = lock(&self.state);

        match state.last_ran.map(|at| at + self.limit) {
            Some(window_end) if now < window_end => {
                if state.trailing.is_some() {
                    trace!("Throttled call dropped, trailing run already pending");
                    return;
                }
                let func = Arc::clone(&self.func);
                let shared = Arc::clone(&self.state);
                state.trailing = Some(tokio::spawn(async move {
                    sleep_until(window_end).await;
                    {
                        let mut state = lock(&shared);
                        state.last_ran = Some(Instant::now());
                        state.trailing = None;
                    }
                    func(args);
                }));
            }
            _ => {
                state.last_ran = Some(now);
                drop(state);
                (self.func)(args);
            }
        }
    }

    /// Drops a pending trailing run, if any.
    pub fn cancel(&self) {
        if let Some(handle) = lock(&self.state).trailing.take() {
            handle.abort();
        }
    }

    pub fn has_pending(&self) -> bool {
        lock(&self.state).trailing.is_some()
    }
}

impl<A> Drop for Throttle<A> {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.state).trailing.take() {
            handle.abort();
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
