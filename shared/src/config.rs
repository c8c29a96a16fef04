use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Process configuration, read once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub http_port: u16,
    pub data_dir: String,
    pub cache_default_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub cache_max_entries: Option<usize>, // None = unbounded
    pub proxy_default_ttl: Duration,
    pub proxy_sweep_interval: Duration,
    pub proxy_max_entries: Option<usize>, // None = unbounded
    pub processing_stale_timeout: Duration,
    pub store_deadline: Duration,
    pub store_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 5000,
            data_dir: "./data".to_string(),
            cache_default_ttl: Duration::from_secs(3600),
            cache_sweep_interval: Duration::from_secs(60),
            cache_max_entries: Some(10_000),
            proxy_default_ttl: Duration::from_secs(3600),
            proxy_sweep_interval: Duration::from_secs(300),
            proxy_max_entries: Some(50_000),
            processing_stale_timeout: Duration::from_secs(600),
            store_deadline: Duration::from_secs(10),
            store_max_attempts: 3,
        }
    }
}

impl Config {
    /// Read `VIDSTATE_*` variables, keeping the default for anything unset or
    /// malformed. Durations are whole seconds; a max-entries value of 0 means
    /// unbounded.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let (port_var, http_port) =
            first_set(&["VIDSTATE_HTTP_PORT", "PORT"], |name| std::env::var(name).ok());

        Self {
            host: std::env::var("VIDSTATE_HOST").unwrap_or(defaults.host),
            http_port: parse_or(port_var, http_port, defaults.http_port),
            data_dir: std::env::var("VIDSTATE_DATA_DIR").unwrap_or(defaults.data_dir),
            cache_default_ttl: secs_from_env("VIDSTATE_CACHE_TTL_SECS", defaults.cache_default_ttl),
            cache_sweep_interval: secs_from_env(
                "VIDSTATE_CACHE_SWEEP_SECS",
                defaults.cache_sweep_interval,
            ),
            cache_max_entries: capacity_from_env(
                "VIDSTATE_CACHE_MAX_ENTRIES",
                defaults.cache_max_entries,
            ),
            proxy_default_ttl: secs_from_env("VIDSTATE_PROXY_TTL_SECS", defaults.proxy_default_ttl),
            proxy_sweep_interval: secs_from_env(
                "VIDSTATE_PROXY_SWEEP_SECS",
                defaults.proxy_sweep_interval,
            ),
            proxy_max_entries: capacity_from_env(
                "VIDSTATE_PROXY_MAX_ENTRIES",
                defaults.proxy_max_entries,
            ),
            processing_stale_timeout: secs_from_env(
                "VIDSTATE_PROCESSING_STALE_SECS",
                defaults.processing_stale_timeout,
            ),
            store_deadline: secs_from_env("VIDSTATE_STORE_DEADLINE_SECS", defaults.store_deadline),
            store_max_attempts: parse_or(
                "VIDSTATE_STORE_MAX_ATTEMPTS",
                std::env::var("VIDSTATE_STORE_MAX_ATTEMPTS").ok(),
                defaults.store_max_attempts,
            )
            .max(1),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

fn secs_from_env(name: &str, default: Duration) -> Duration {
    match parse_or(name, std::env::var(name).ok(), default.as_secs()) {
        0 => {
            warn!("{} must be greater than zero, using {}", name, default.as_secs());
            default
        }
        secs => Duration::from_secs(secs),
    }
}

fn capacity_from_env(name: &str, default: Option<usize>) -> Option<usize> {
    match std::env::var(name).ok() {
        None => default,
        raw => match parse_or(name, raw, default.unwrap_or(0)) {
            0 => None,
            n => Some(n),
        },
    }
}

/// The first variable in `names` that is set, with its value. Falls back to
/// the first name and no value.
fn first_set(
    names: &[&'static str],
    lookup: impl Fn(&str) -> Option<String>,
) -> (&'static str, Option<String>) {
    names
        .iter()
        .find_map(|name| lookup(name).map(|value| (*name, Some(value))))
        .unwrap_or((names.first().copied().unwrap_or_default(), None))
}

/// Parse a raw environment value, falling back to `default` when it is unset
/// or malformed.
fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match raw {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value '{}' for {}, using {}", value, name, default);
            default
        }),
    }
}
