//! Shared pieces of the demo binaries.

use std::time::Duration;

use deferred_value::{Deferred, DeferredError, Scheduler};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber. `RUST_LOG` overrides the default `warn`
/// level, e.g. `RUST_LOG=deferred_value=debug` to watch settlements.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();
}

/// Public profile data returned by the simulated user API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub username: String,
    pub email: String,
}

/// Credentials the error handling walkthrough pretends to fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

/// Pretends to fetch `url`: after `latency`, fulfils with a JSON body, or
/// rejects when the URL does not look like a user endpoint.
pub fn simulated_fetch(scheduler: &Scheduler, url: &str, latency: Duration) -> Deferred<String> {
    let url = url.to_string();
    Deferred::spawn(scheduler, async move {
        tokio::time::sleep(latency).await;
        let login = url
            .rsplit_once("/users/")
            .map(|(_, login)| login.to_string())
            .filter(|login| !login.is_empty())
            .ok_or_else(|| DeferredError::reason(format!("404 Not Found: {}", url)))?;

        let body = serde_json::json!({
            "login": login,
            "html_url": format!("https://github.com/{}", login),
            "public_repos": 42,
        });
        Ok::<_, DeferredError>(body.to_string())
    })
}

/// Parses a response body, as `response.json()` would.
pub fn parse_json(scheduler: &Scheduler, body: String) -> Deferred<serde_json::Value> {
    Deferred::spawn(scheduler, async move {
        serde_json::from_str(&body).map_err(DeferredError::from)
    })
}
