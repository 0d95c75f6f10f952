// demos/concurrent_tasks.rs
use resilient_connector_rs::clock::start_work_clock;
use resilient_connector_rs::run_tasks_with_concurrency;
use std::time::Instant;
use tokio::time::{sleep, Duration};

// Simulates a job that takes `millis`; every fifth one fails
async fn job(id: u32, millis: u64) -> Result<u32, String> {
    sleep(Duration::from_millis(millis)).await;
    if id % 5 == 0 {
        Err(format!("job {} failed", id))
    } else {
        Ok(id)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (optional)
    env_logger::init();

    // Optional: Load .env file if you have one
    dotenv::dotenv().ok();

    let tasks: Vec<_> = (1..=10u32)
        .map(|id| move || job(id, 50 * u64::from(11 - id)))
        .collect();

    println!("Running 10 jobs, at most 3 at a time...");
    let started = Instant::now();
    let results = run_tasks_with_concurrency(tasks, 3).await;
    println!(
        "Finished in {:?}. Completed (in completion order): {:?}",
        started.elapsed(),
        results
    );

    // A background clock for periodic work
    let ticker = start_work_clock(Some(Duration::from_secs(1)))?;
    let mut ticks = ticker.subscribe();
    for _ in 0..3 {
        let tick = ticks.recv().await?;
        println!("Tick #{} at {}", tick.sequence, tick.at);
    }

    println!("Example finished.");
    Ok(())
}
