//! Walkthrough of deferred values: creating them, returning data, handling
//! errors, awaiting, chaining a simulated fetch and waiting on several values.
//!
//! ```text
//! cargo run -p deferred-value-demos --bin promises
//! ```

use std::time::Duration;

use deferred_value::{all, Deferred, DeferredError, Scheduler, SchedulerConfig};
use deferred_value_demos::{init_tracing, parse_json, simulated_fetch, LanguageInfo, User};

const TICK: Duration = Duration::from_millis(1000);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let scheduler = Scheduler::start(SchedulerConfig::default().with_name("promises"))?;

    // 1. Creating a deferred value
    let promise_one = Deferred::create(&scheduler, |resolver| {
        scheduler.after(TICK, move || {
            println!("Async task is complete");
            resolver.succeed("PromiseOne resolved");
        });
    });
    promise_one.then(|message| {
        println!("{}", message);
        Ok(())
    });

    // 2. Inline
    Deferred::create(&scheduler, |resolver| {
        scheduler.after(TICK, move || {
            println!("Async task 2");
            resolver.succeed("PromiseTwo resolved");
        });
    })
    .then(|message| {
        println!("{}", message);
        Ok(())
    });

    // 3. Returning data
    let info = LanguageInfo {
        username: "Rust".to_string(),
        email: "rust@example.com".to_string(),
    };
    let promise_three = Deferred::create(&scheduler, |resolver| {
        scheduler.after(TICK, move || {
            resolver.succeed(info);
        });
    });
    promise_three.then(|user| {
        println!("{:?}", user);
        Ok(())
    });

    // 4. Handling errors
    let user_details = User {
        username: "Rust".to_string(),
        password: "123".to_string(),
    };
    fetch_user(&scheduler, user_details.clone(), true)
        .then(|user| {
            println!("{:?}", user);
            Ok(user.username)
        })
        .then(|username| {
            println!("{}", username);
            Ok(())
        })
        .catch(|error| {
            println!("{}", error);
            Ok(())
        })
        .finally(|| println!("The deferred value is either fulfilled or rejected"));

    // 5. Consuming with async/await
    let promise_five = fetch_user(&scheduler, user_details, true);
    let consumer = tokio::spawn(consume_promise_five(promise_five));

    // 6. Fetching data
    let parser = scheduler.clone();
    simulated_fetch(&scheduler, "https://api.github.com/users/rust-lang", TICK / 2)
        .and_then(move |response| parse_json(&parser, response))
        .then(|data| {
            println!("Api Response {}", data);
            Ok(())
        })
        .catch(|error| {
            println!("{}", error);
            Ok(())
        });

    // 7. all
    let promise_a = Deferred::delay(&scheduler, TICK, "Deferred A");
    let promise_b = Deferred::delay(&scheduler, TICK * 2, "Deferred B");
    let promise_c = Deferred::delay(&scheduler, TICK * 3, "Deferred C");
    all(&scheduler, vec![promise_a, promise_b, promise_c])
        .then(|values| {
            println!("All deferred values fulfilled {:?}", values);
            Ok(())
        })
        .catch(|error| {
            println!("Error in one of the deferred values {}", error);
            Ok(())
        });

    scheduler.wait_idle().await;
    consumer.await?;
    Ok(())
}

fn fetch_user(scheduler: &Scheduler, user: User, error: bool) -> Deferred<User> {
    Deferred::create(scheduler, |resolver| {
        scheduler.after(TICK, move || {
            if !error {
                resolver.succeed(user);
            } else {
                resolver.fail("ERROR: failed to fetch user");
            }
        });
    })
}

async fn consume_promise_five(promise: Deferred<User>) {
    match promise.await {
        Ok(response) => println!("{:?}", response),
        Err(DeferredError::Reason { message }) => println!("{}", message),
        Err(error) => println!("{}", error),
    }
}
