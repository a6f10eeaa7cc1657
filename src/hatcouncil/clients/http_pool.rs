//! Pool of persistent HTTP clients, one per base URL.
//!
//! Every completion and search call of a session goes to one of two hosts, so
//! reusing a single `reqwest::Client` per base URL keeps connections, DNS results
//! and TLS sessions warm across the whole discussion.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create the shared client for `base_url`.
pub fn get_http_client(base_url: &str) -> reqwest::Client {
    let mut pool = match HTTP_CLIENT_POOL.lock() {
        Ok(pool) => pool,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = build_client();
    pool.insert(base_url.to_string(), client.clone());
    client
}

fn build_client() -> reqwest::Client {
    reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        // Final summaries with search context can take a while.
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap_or_else(|e| {
            log::error!("falling back to a default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

/// Number of base URLs with a pooled client.
pub fn pooled_hosts() -> usize {
    HTTP_CLIENT_POOL.lock().map(|pool| pool.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Other tests share the pool, so only count this test's own URLs.
    fn entries_under(prefix: &str) -> usize {
        HTTP_CLIENT_POOL
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .count()
    }

    #[test]
    fn repeated_lookups_reuse_the_pooled_client() {
        let prefix = "https://pool-test.example";
        let url = "https://pool-test.example/v1";
        let _first = get_http_client(url);
        assert_eq!(entries_under(prefix), 1);

        for _ in 0..5 {
            let _again = get_http_client(url);
        }
        assert_eq!(entries_under(prefix), 1);

        let _other = get_http_client("https://pool-test.example/v2");
        assert_eq!(entries_under(prefix), 2);
        assert!(pooled_hosts() >= 2);
    }
}
