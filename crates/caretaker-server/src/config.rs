//! Supervisor configuration.
//!
//! Loaded from environment variables. Required values (cookie signing
//! secret, tenant namespace key, tenant image) make startup fail; everything
//! else has defaults matching the documented timeouts and thresholds.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Public base URL of the supervisor.
    pub public_url: String,
    /// Log level filter (e.g. `info`, `debug`).
    pub log_level: String,
    /// Session cookie name.
    pub cookie_name: String,
    /// Symmetric session signing secret.
    pub cookie_secret: String,
    /// Cookie domain, if scoped.
    pub cookie_domain: Option<String>,
    /// Session token lifetime.
    pub session_ttl: Duration,
    /// Sliding-renewal window.
    pub renew_window: Duration,
    /// Revocation store URL.
    pub redis_url: String,
    /// Path of the central analytics SQLite file.
    pub central_db_path: String,
    /// Idle threshold before the reaper stops a tenant.
    pub idle_threshold: Duration,
    /// Interval between reaper passes.
    pub reaper_interval: Duration,
    /// Deadline for the warmup health wait.
    pub health_wait: Duration,
    /// Tenant namespace key (user → tenant HMAC key).
    pub namespace_key: String,
    /// Tenant application image.
    pub tenant_image: String,
    /// TCP port the tenant application listens on.
    pub tenant_port: u16,
    /// Tenant CPU cap in whole cores.
    pub tenant_cpus: i64,
    /// Tenant memory cap in GiB.
    pub tenant_ram_gb: i64,
    /// Tenant PIDs cap.
    pub tenant_pids: i64,
    /// Environment injected into tenant containers (upstream API keys).
    pub tenant_env: Vec<(String, String)>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CARETAKER_BIND_ADDR` — full bind address (overrides `PORT`, default `127.0.0.1:8087`)
    /// - `PORT` — port to bind on `0.0.0.0`
    /// - `CARETAKER_PUBLIC_URL` — public base URL (default derived from bind address)
    /// - `CARETAKER_LOG_LEVEL` — log filter (default `info`)
    /// - `CARETAKER_COOKIE_NAME` — session cookie name (default `session`)
    /// - `CARETAKER_COOKIE_SECRET` — session signing secret (required)
    /// - `CARETAKER_COOKIE_DOMAIN` — cookie domain (optional)
    /// - `CARETAKER_SESSION_TTL_MINUTES` — session lifetime (default `30`)
    /// - `CARETAKER_RENEW_WINDOW_MINUTES` — sliding-renewal window (default `10`)
    /// - `REDIS_URL` — revocation store (default `redis://127.0.0.1:6379`)
    /// - `CARETAKER_CENTRAL_DB` — central SQLite path (default `./data/central.db`)
    /// - `CARETAKER_IDLE_MINUTES` — reaper idle threshold (default `30`)
    /// - `CARETAKER_REAPER_INTERVAL_SECS` — reaper cadence (default `60`)
    /// - `CARETAKER_HEALTH_WAIT_SECS` — warmup health deadline (default `45`)
    /// - `CARETAKER_NAMESPACE_KEY` — tenant namespace key (required)
    /// - `CARETAKER_TENANT_IMAGE` — tenant image (required)
    /// - `CARETAKER_TENANT_PORT` — tenant listen port (default `8080`)
    /// - `CARETAKER_TENANT_CPUS` — CPU cap in cores (default `1`)
    /// - `CARETAKER_TENANT_RAM_GB` — memory cap in GiB (default `2`)
    /// - `CARETAKER_TENANT_PIDS` — PIDs cap (default `256`)
    /// - `CARETAKER_TENANT_PASS_ENV` — comma-separated names of supervisor
    ///   environment variables forwarded into tenants (API keys)
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or a value fails
    /// to parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = if let Ok(addr) = std::env::var("CARETAKER_BIND_ADDR") {
            addr.parse()
                .with_context(|| format!("invalid CARETAKER_BIND_ADDR: {addr}"))?
        } else if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid PORT: {port}"))?;
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8087))
        };

        let cookie_secret = std::env::var("CARETAKER_COOKIE_SECRET")
            .context("CARETAKER_COOKIE_SECRET is required")?;
        let namespace_key = std::env::var("CARETAKER_NAMESPACE_KEY")
            .context("CARETAKER_NAMESPACE_KEY is required")?;
        let tenant_image = std::env::var("CARETAKER_TENANT_IMAGE")
            .context("CARETAKER_TENANT_IMAGE is required")?;

        let pass_env_spec = std::env::var("CARETAKER_TENANT_PASS_ENV").unwrap_or_default();
        let tenant_env = pass_env(&pass_env_spec, |name| std::env::var(name).ok());

        Ok(Self {
            bind_addr,
            public_url: std::env::var("CARETAKER_PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://{bind_addr}")),
            log_level: std::env::var("CARETAKER_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            cookie_name: std::env::var("CARETAKER_COOKIE_NAME")
                .unwrap_or_else(|_| "session".to_owned()),
            cookie_secret,
            cookie_domain: std::env::var("CARETAKER_COOKIE_DOMAIN").ok(),
            session_ttl: Duration::from_secs(
                parsed_env("CARETAKER_SESSION_TTL_MINUTES", 30u64)? * 60,
            ),
            renew_window: Duration::from_secs(
                parsed_env("CARETAKER_RENEW_WINDOW_MINUTES", 10u64)? * 60,
            ),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned()),
            central_db_path: std::env::var("CARETAKER_CENTRAL_DB")
                .unwrap_or_else(|_| "./data/central.db".to_owned()),
            idle_threshold: Duration::from_secs(parsed_env("CARETAKER_IDLE_MINUTES", 30u64)? * 60),
            reaper_interval: Duration::from_secs(parsed_env(
                "CARETAKER_REAPER_INTERVAL_SECS",
                60u64,
            )?),
            health_wait: Duration::from_secs(parsed_env("CARETAKER_HEALTH_WAIT_SECS", 45u64)?),
            namespace_key,
            tenant_image,
            tenant_port: parsed_env("CARETAKER_TENANT_PORT", 8080u16)?,
            tenant_cpus: parsed_env("CARETAKER_TENANT_CPUS", 1i64)?,
            tenant_ram_gb: parsed_env("CARETAKER_TENANT_RAM_GB", 2i64)?,
            tenant_pids: parsed_env("CARETAKER_TENANT_PIDS", 256i64)?,
            tenant_env,
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset.
fn parsed_env<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid {name}: {raw}")),
        Err(_) => Ok(default),
    }
}

/// Resolve a comma-separated list of variable names into `(name, value)`
/// pairs, skipping names with no value.
fn pass_env(spec: &str, lookup: impl Fn(&str) -> Option<String>) -> Vec<(String, String)> {
    spec.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| lookup(name).map(|value| (name.to_owned(), value)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pass_env_resolves_named_variables() {
        let pairs = pass_env("A_KEY, B_KEY", |name| match name {
            "A_KEY" => Some("a".to_owned()),
            "B_KEY" => Some("b".to_owned()),
            _ => None,
        });
        assert_eq!(
            pairs,
            vec![
                ("A_KEY".to_owned(), "a".to_owned()),
                ("B_KEY".to_owned(), "b".to_owned())
            ]
        );
    }

    #[test]
    fn pass_env_skips_unset_and_empty_names() {
        let pairs = pass_env("MISSING,,  ", |_| None);
        assert!(pairs.is_empty());
    }

    #[test]
    fn parsed_env_uses_default_when_unset() {
        let value: u64 = parsed_env("CARETAKER_TEST_UNSET_VARIABLE", 42u64).unwrap();
        assert_eq!(value, 42);
    }
}
