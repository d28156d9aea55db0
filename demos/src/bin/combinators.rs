//! Waiting on several deferred values at once with `all`, `all_settled`,
//! `race` and `any`, plus what an unhandled rejection looks like.
//!
//! ```text
//! RUST_LOG=warn cargo run -p deferred-value-demos --bin combinators
//! ```

use std::time::Duration;

use deferred_value::{all, all_settled, any, race, Deferred, DeferredError, Scheduler};
use deferred_value_demos::{init_tracing, simulated_fetch};

fn mirror(scheduler: &Scheduler, name: &str, millis: u64) -> Deferred<String> {
    simulated_fetch(
        scheduler,
        &format!("https://{}.example.com/users/rust", name),
        Duration::from_millis(millis),
    )
    .then({
        let name = name.to_string();
        move |_body| Ok(name)
    })
}

fn broken_mirror(scheduler: &Scheduler, name: &str, millis: u64) -> Deferred<String> {
    simulated_fetch(
        scheduler,
        &format!("https://{}.example.com/users/", name),
        Duration::from_millis(millis),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let scheduler = Scheduler::new()?;

    let everyone = all(
        &scheduler,
        vec![
            mirror(&scheduler, "eu", 300),
            mirror(&scheduler, "us", 100),
            mirror(&scheduler, "ap", 200),
        ],
    );
    println!("all: {:?}", everyone.await?);

    let first_failure = all(
        &scheduler,
        vec![mirror(&scheduler, "eu", 300), broken_mirror(&scheduler, "us", 100)],
    );
    println!("all with a failure: {}", first_failure.await.unwrap_err());

    let report = all_settled(
        &scheduler,
        vec![mirror(&scheduler, "eu", 50), broken_mirror(&scheduler, "us", 10)],
    )
    .await?;
    println!("all_settled: {}", serde_json::to_string_pretty(&report)?);

    let fastest = race(
        &scheduler,
        vec![mirror(&scheduler, "eu", 300), mirror(&scheduler, "us", 100)],
    );
    println!("race: {}", fastest.await?);

    let first_working = any(
        &scheduler,
        vec![broken_mirror(&scheduler, "eu", 10), mirror(&scheduler, "us", 200)],
    );
    println!("any: {}", first_working.await?);

    let all_broken = any(
        &scheduler,
        vec![
            broken_mirror(&scheduler, "eu", 10),
            broken_mirror(&scheduler, "us", 20),
        ],
    );
    match all_broken.await {
        Err(error @ DeferredError::Aggregate { .. }) => println!("any, all broken: {}", error),
        other => println!("any, all broken: unexpected {:?}", other),
    }

    // Nobody handles this one; the default sink logs it at warn level.
    drop(Deferred::<()>::rejected(&scheduler, "forgotten failure"));

    scheduler.wait_idle().await;
    println!("stats: {:?}", scheduler.stats());
    Ok(())
}
