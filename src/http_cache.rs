//! On-disk cache of JSON responses keyed by URL.
//!
//! Request headers (the API key in particular) are never part of the key or
//! the stored entry.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};

use crate::config::app_cache_dir;

const CACHE_VERSION: u32 = 1;
const CACHE_FILE: &str = "http_cache.json";

static CACHE: Mutex<Option<HttpCacheFile>> = Mutex::new(None);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Always ask the server; reuse the body on 304.
    Revalidate,
    /// Serve a cached body younger than the given age without a request.
    FreshFor(Duration),
    /// Skip the cache entirely.
    Bypass,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HttpCacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

impl CacheEntry {
    fn is_fresh(&self, max_age: Duration, now: u64) -> bool {
        now.saturating_sub(self.fetched_at) <= max_age.as_secs()
    }
}

fn lock_cache() -> MutexGuard<'static, Option<HttpCacheFile>> {
    // A panic while holding the lock leaves at worst a stale map behind.
    CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn fetch_json_cached(
    client: &Client,
    url: &str,
    headers: &[(&str, &str)],
    policy: CachePolicy,
) -> Result<String> {
    let cached_entry = if policy == CachePolicy::Bypass {
        None
    } else {
        let mut guard = lock_cache();
        let cache = guard.get_or_insert_with(load_cache_file);
        cache.entries.get(url).cloned()
    };

    let now = now_secs();
    if let CachePolicy::FreshFor(max_age) = policy
        && let Some(entry) = cached_entry.as_ref()
        && entry.is_fresh(max_age, now)
    {
        log::debug!("cache hit {url}");
        return Ok(entry.body.clone());
    }

    let mut req = client.get(url);
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    if let Some(entry) = cached_entry.as_ref() {
        if let Some(etag) = entry.etag.as_ref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_ref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    log::debug!("GET {url}");
    let resp = req.send().with_context(|| format!("request {url} failed"))?;
    let status = resp.status();
    let response_headers = resp.headers().clone();
    if status == StatusCode::NOT_MODIFIED {
        if let Some(mut entry) = cached_entry {
            entry.fetched_at = now;
            let body = entry.body.clone();
            store_entry(url, entry);
            return Ok(body);
        }
        return Err(anyhow!("received 304 without cache body"));
    }

    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow!("http {status}: {body}"));
    }

    if policy != CachePolicy::Bypass {
        let header = |name: HeaderName| {
            response_headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        store_entry(
            url,
            CacheEntry {
                body: body.clone(),
                etag: header(ETAG),
                last_modified: header(LAST_MODIFIED),
                fetched_at: now,
            },
        );
    }
    Ok(body)
}

/// Drops a cached body, e.g. one that turned out to carry an API error.
pub fn forget(url: &str) {
    let mut guard = lock_cache();
    let cache = guard.get_or_insert_with(load_cache_file);
    if cache.entries.remove(url).is_some()
        && let Err(err) = save_cache_file(cache)
    {
        log::warn!("failed to persist http cache: {err:#}");
    }
}

fn store_entry(key: &str, entry: CacheEntry) {
    let mut guard = lock_cache();
    let cache = guard.get_or_insert_with(load_cache_file);
    cache.version = CACHE_VERSION;
    cache.entries.insert(key.to_string(), entry);
    if let Err(err) = save_cache_file(cache) {
        log::warn!("failed to persist http cache: {err:#}");
    }
}

fn load_cache_file() -> HttpCacheFile {
    let Some(path) = cache_path() else {
        return HttpCacheFile::default();
    };
    let Ok(raw) = fs::read_to_string(path) else {
        return HttpCacheFile::default();
    };
    let cache = serde_json::from_str::<HttpCacheFile>(&raw).unwrap_or_default();
    if cache.version != CACHE_VERSION {
        return HttpCacheFile::default();
    }
    cache
}

fn save_cache_file(cache: &HttpCacheFile) -> Result<()> {
    let Some(path) = cache_path() else {
        return Ok(());
    };
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(cache).context("serialize http cache")?;
    fs::write(&tmp, json).context("write http cache")?;
    fs::rename(&tmp, &path).context("swap http cache")?;
    Ok(())
}

fn cache_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(CACHE_FILE))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
