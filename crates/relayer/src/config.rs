//! Configuration for the relay.

use crate::error::ConfigError;

const DEFAULT_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5000",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5000",
];

const DEFAULT_ORIGIN_SUFFIXES: &[&str] =
    &["localhost", "127.0.0.1", "netlify.app", "railway.app"];

/// 16 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

pub const DEFAULT_OUTBOUND_BUFFER: usize = 1024;

/// Which browser origins may open a WebSocket or make CORS requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    Any,
    List {
        origins: Vec<String>,
        host_suffixes: Vec<String>,
    },
}

impl OriginPolicy {
    /// Requests without an `Origin` header (non-browser clients) are always allowed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };
        match self {
            Self::Any => true,
            Self::List {
                origins,
                host_suffixes,
            } => {
                if origins.iter().any(|o| o == origin) {
                    return true;
                }
                let host = origin_host(origin);
                !host.is_empty()
                    && host_suffixes
                        .iter()
                        .any(|s| host == s || host.ends_with(&format!(".{}", s)))
            }
        }
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::List {
            origins: default_origins(),
            host_suffixes: default_origin_suffixes(),
        }
    }
}

fn default_origins() -> Vec<String> {
    DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect()
}

fn default_origin_suffixes() -> Vec<String> {
    DEFAULT_ORIGIN_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

/// Host part of an origin (`https://app.netlify.app:443` -> `app.netlify.app`).
fn origin_host(origin: &str) -> &str {
    let rest = origin.split_once("://").map_or(origin, |(_, r)| r);
    let authority = rest.split('/').next().unwrap_or("");
    if let Some(v6) = authority.strip_prefix('[') {
        return v6.split(']').next().unwrap_or("");
    }
    authority.split(':').next().unwrap_or("")
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub ws_path: String,
    pub max_payload_bytes: usize,
    pub outbound_buffer: usize,
    pub origin_policy: OriginPolicy,
    pub service_name: String,
    pub shutdown_grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", lookup("PORT"), 3000u16)?;

        let ws_path = lookup("WS_PATH").unwrap_or_else(|| "/ws".to_string());
        if !ws_path.starts_with('/') || ws_path == "/" || ws_path == "/health" {
            return Err(ConfigError::invalid(
                "WS_PATH",
                &ws_path,
                "must start with '/' and not collide with / or /health",
            ));
        }

        let max_payload_bytes = parse_nonzero(
            "MAX_PAYLOAD_BYTES",
            lookup("MAX_PAYLOAD_BYTES"),
            DEFAULT_MAX_PAYLOAD_BYTES,
        )?;
        let outbound_buffer = parse_nonzero(
            "OUTBOUND_BUFFER",
            lookup("OUTBOUND_BUFFER"),
            DEFAULT_OUTBOUND_BUFFER,
        )?;

        let origin_policy = match lookup("ALLOWED_ORIGINS").as_deref().map(str::trim) {
            Some("*") => OriginPolicy::Any,
            origins => OriginPolicy::List {
                origins: origins.map(split_list).unwrap_or_else(default_origins),
                host_suffixes: lookup("ALLOWED_ORIGIN_SUFFIXES")
                    .as_deref()
                    .map(split_list)
                    .unwrap_or_else(default_origin_suffixes),
            },
        };

        let service_name =
            lookup("SERVICE_NAME").unwrap_or_else(|| "WebRTC Signaling Relay".to_string());
        let shutdown_grace_secs =
            parse_or("SHUTDOWN_GRACE_SECS", lookup("SHUTDOWN_GRACE_SECS"), 5u64)?;

        Ok(Self {
            host,
            port,
            ws_path,
            max_payload_bytes,
            outbound_buffer,
            origin_policy,
            service_name,
            shutdown_grace_secs,
        })
    }

    /// Loopback config on an OS-assigned port.
    pub fn for_test() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            ws_path: "/ws".to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            outbound_buffer: 64,
            origin_policy: OriginPolicy::default(),
            service_name: "test-relay".to_string(),
            shutdown_grace_secs: 1,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e| ConfigError::invalid(key, &v, e)),
    }
}

fn parse_nonzero(
    key: &'static str,
    raw: Option<String>,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = parse_or(key, raw.clone(), default)?;
    if value == 0 {
        return Err(ConfigError::invalid(
            key,
            raw.as_deref().unwrap_or("0"),
            "must be greater than zero",
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.max_payload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
        assert_eq!(config.origin_policy, OriginPolicy::default());
        assert_eq!(config.shutdown_grace_secs, 5);
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("PORT", "8081"),
            ("WS_PATH", "/signal"),
            ("MAX_PAYLOAD_BYTES", "1024"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("ALLOWED_ORIGIN_SUFFIXES", ""),
        ])
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.ws_path, "/signal");
        assert_eq!(config.max_payload_bytes, 1024);
        assert_eq!(
            config.origin_policy,
            OriginPolicy::List {
                origins: vec!["https://a.example".into(), "https://b.example".into()],
                host_suffixes: vec![],
            }
        );
    }

    #[test]
    fn star_allows_any_origin() {
        let config = config_from(&[("ALLOWED_ORIGINS", "*")]).unwrap();
        assert_eq!(config.origin_policy, OriginPolicy::Any);
        assert!(config.origin_policy.allows(Some("https://evil.example")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("MAX_PAYLOAD_BYTES", "0")]).is_err());
        assert!(config_from(&[("WS_PATH", "ws")]).is_err());
        assert!(config_from(&[("WS_PATH", "/health")]).is_err());
    }

    #[test]
    fn default_policy_matches_hosts() {
        let policy = OriginPolicy::default();
        assert!(policy.allows(None));
        assert!(policy.allows(Some("http://localhost:3000")));
        assert!(policy.allows(Some("http://localhost:8080")));
        assert!(policy.allows(Some("https://my-site.netlify.app")));
        assert!(policy.allows(Some("https://relay-production.up.railway.app")));
        assert!(!policy.allows(Some("https://example.com")));
        // suffix must align on a label boundary
        assert!(!policy.allows(Some("https://evilnetlify.app")));
        assert!(!policy.allows(Some("https://netlify.app.evil.com")));
    }

    #[test]
    fn origin_host_strips_scheme_and_port() {
        assert_eq!(origin_host("https://a.b.c:8443/x"), "a.b.c");
        assert_eq!(origin_host("http://[::1]:3000"), "::1");
        assert_eq!(origin_host("null"), "null");
    }
}
