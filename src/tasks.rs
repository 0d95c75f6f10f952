use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{debug, error, trace, warn};
use std::fmt::Display;
use std::future::Future;

/// Runs a batch of deferred async tasks with at most `concurrency` of them in flight.
///
/// Tasks are started in input order. Once the window is full, the next pending task
/// is started each time an in-flight one settles, until every task has settled.
///
/// The returned `Vec` holds the successful results in **completion order**, not input
/// order. A failing task is logged and left out of the results; it never aborts the
/// batch, so this future always resolves.
///
/// A `concurrency` of zero is treated as one. A `concurrency` larger than the number
/// of tasks starts everything immediately.
///
/// Tasks run on the calling task (nothing is spawned), so they do not need to be `Send`.
/// There is no cancellation or per-task timeout: a task that never settles holds its
/// slot forever.
///
/// # Examples
///
/// ```
/// use resilient_connector_rs::tasks::run_tasks_with_concurrency;
///
/// # #[tokio::main]
/// # async fn main() {
/// let tasks = (1..=4).map(|n| move || async move {
///     if n == 3 {
///         Err(format!("task {} failed", n))
///     } else {
///         Ok(n * 10)
///     }
/// });
///
/// let mut results = run_tasks_with_concurrency(tasks, 2).await;
/// results.sort();
/// assert_eq!(results, vec![10, 20, 40]);
/// # }
/// ```
pub async fn run_tasks_with_concurrency<I, F, Fut, T, E>(tasks: I, concurrency: usize) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let concurrency = if concurrency == 0 {
        warn!("Concurrency of 0 requested, running tasks one at a time");
        1
    } else {
        concurrency
    };

    let mut pending = tasks.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut results = Vec::new();

    // Fill the window
    for (index, task) in pending.by_ref().take(concurrency) {
        in_flight.push(start_task(index, task));
    }

    while let Some((index, outcome)) = in_flight.next().await {
        match outcome {
            Ok(value) => {
                trace!("Task {} completed", index);
                results.push(value);
            }
            Err(e) => {
                error!("Task {} failed: {}", index, e); // Logged and skipped
            }
        }
        // Refill the freed slot.
        if let Some((index, task)) = pending.next() {
            in_flight.push(start_task(index, task));
        }
    }

    debug!("Task batch finished with {} successful results", results.len());
    results
}

/// Invokes the task right away so invocation follows dispatch order.
fn start_task<F, Fut, T, E>(index: usize, task: F) -> impl Future<Output = (usize, Result<T, E>)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    debug!("Starting task {}", index);
    let fut = task();
    async move { (index, fut.await) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::{sleep, Duration, Instant};

    #[tokio::test]
    async fn test_empty_batch_returns_immediately() {
        let tasks: Vec<fn() -> std::future::Ready<Result<u32, String>>> = Vec::new();
        let results = run_tasks_with_concurrency(tasks, 3).await;
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_completion_order() {
        let delays = [(1, 30u64), (2, 10), (3, 20)];
        let tasks = delays.iter().map(|&(value, ms)| {
            move || async move {
                sleep(Duration::from_millis(ms)).await;
                Ok::<_, String>(value)
            }
        });

        let results = run_tasks_with_concurrency(tasks, 3).await;
        assert_eq!(results, vec![2, 3, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_of_two_collects_everything() {
        let delays = [(1, 30u64), (2, 10), (3, 20)];
        let tasks = delays.iter().map(|&(value, ms)| {
            move || async move {
                sleep(Duration::from_millis(ms)).await;
                Ok::<_, String>(value)
            }
        });

        let results = run_tasks_with_concurrency(tasks, 2).await;
        assert_eq!(results.len(), 3);
        // Task 2 is the quickest of the first window.
        assert_eq!(results[0], 2);
        let mut sorted = results.clone();
        sorted.sort();
        assert_eq!(sorted, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let outcomes: Vec<Result<i32, &str>> = vec![Err("x"), Ok(1)];
        let tasks = outcomes.into_iter().map(|r| move || async move { r });

        let results = run_tasks_with_concurrency(tasks, 1).await;
        assert_eq!(results, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_never_exceeds_bound() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let invoked = Arc::new(AtomicUsize::new(0));

        let tasks = (0..10u64).map(|i| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            let invoked = Arc::clone(&invoked);
            move || async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5 + (i * 7) % 13)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                if i % 4 == 0 {
                    Err(format!("task {} failed", i))
                } else {
                    Ok(i)
                }
            }
        });

        let results = run_tasks_with_concurrency(tasks, 3).await;
        assert_eq!(invoked.load(Ordering::SeqCst), 10);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        // 0, 4 and 8 fail.
        assert_eq!(results.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_bound_starts_everything_at_once() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let origin = Instant::now();

        let tasks = (0..4u64).map(|i| {
            let started = Arc::clone(&started);
            move || {
                started.lock().unwrap().push(Instant::now());
                async move {
                    sleep(Duration::from_millis(10 * (i + 1))).await;
                    Ok::<_, String>(i)
                }
            }
        });

        let results = run_tasks_with_concurrency(tasks, 16).await;
        assert_eq!(results.len(), 4);
        let started = started.lock().unwrap();
        assert_eq!(started.len(), 4);
        assert!(started.iter().all(|t| *t == origin));
        // Total wall time is the slowest task, not the sum.
        let elapsed = origin.elapsed();
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_concurrency_runs_serially() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..3u32).map(|i| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            move || async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(i)
            }
        });

        let results = run_tasks_with_concurrency(tasks, 0).await;
        assert_eq!(results, vec![0, 1, 2]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
