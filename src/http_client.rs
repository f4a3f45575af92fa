use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

/// API-Football's free tier allows a handful of requests per minute and calls
/// are already spaced by `request_delay`, so a stalled request is abandoned
/// after 10s rather than eating into the next slot.
const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("formcast/", env!("CARGO_PKG_VERSION"));

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Process-wide blocking client shared by every API call.
pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build http client")
    })
}
