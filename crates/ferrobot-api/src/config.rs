//! [`ApiConfig`] – listener, credentials, TLS material and CORS policy.
//!
//! No file is read; the config is built in code and optionally layered with
//! `FERROBOT_API_*` environment overrides.

use std::fmt;

use ferrobot_types::FerroError;

use crate::cors::CorsConfig;

pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_BASE_PATH: &str = "/api";

#[derive(Clone, PartialEq)]
pub struct ApiConfig {
    /// Interface to bind. Empty means every interface.
    pub host: String,
    pub port: String,
    /// Basic auth is enabled when `username` is non-empty.
    pub username: String,
    pub password: String,
    /// PEM certificate chain path.
    pub cert: String,
    /// PEM private key path.
    pub key: String,
    pub base_path: String,
    pub cors: Option<CorsConfig>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT.to_string(),
            username: String::new(),
            password: String::new(),
            cert: String::new(),
            key: String::new(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            cors: None,
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field(
                "password",
                if self.password.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("cert", &self.cert)
            .field("key", &self.key)
            .field("base_path", &self.base_path)
            .field("cors", &self.cors)
            .finish()
    }
}

impl ApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_tls(mut self, cert: impl Into<String>, key: impl Into<String>) -> Self {
        self.cert = cert.into();
        self.key = key.into();
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = Some(cors);
        self
    }

    /// `host:port`, with an empty host bound to every interface.
    pub fn address(&self) -> String {
        let host = if self.host.is_empty() { "0.0.0.0" } else { &self.host };
        format!("{host}:{}", self.port)
    }

    pub fn uses_tls(&self) -> bool {
        !self.cert.is_empty() && !self.key.is_empty()
    }

    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        (!self.username.is_empty()).then_some((self.username.as_str(), self.password.as_str()))
    }

    /// Base path without a trailing slash; `"/"` and `""` both become `""`.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }

    /// # Errors
    ///
    /// [`FerroError::Config`] for a port that is not a number in `0..=65535`.
    pub fn validate(&self) -> Result<(), FerroError> {
        self.port
            .parse::<u16>()
            .map(|_| ())
            .map_err(|_| FerroError::Config(format!("invalid api port '{}'", self.port)))
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `FERROBOT_API_*` overrides read through `lookup`.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `FERROBOT_API_HOST` | `host` |
    /// | `FERROBOT_API_PORT` | `port` |
    /// | `FERROBOT_API_USERNAME` | `username` |
    /// | `FERROBOT_API_PASSWORD` | `password` |
    /// | `FERROBOT_API_CERT` | `cert` |
    /// | `FERROBOT_API_KEY` | `key` |
    /// | `FERROBOT_API_BASE_PATH` | `base_path` |
    /// | `FERROBOT_API_CORS_ORIGINS` | `cors` origins, comma separated |
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut String); 7] = [
            ("FERROBOT_API_HOST", &mut self.host),
            ("FERROBOT_API_PORT", &mut self.port),
            ("FERROBOT_API_USERNAME", &mut self.username),
            ("FERROBOT_API_PASSWORD", &mut self.password),
            ("FERROBOT_API_CERT", &mut self.cert),
            ("FERROBOT_API_KEY", &mut self.key),
            ("FERROBOT_API_BASE_PATH", &mut self.base_path),
        ];
        for (key, field) in fields {
            if let Some(v) = lookup(key) {
                *field = v;
            }
        }
        if let Some(origins) = lookup("FERROBOT_API_CORS_ORIGINS") {
            let origins: Vec<String> = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
            if !origins.is_empty() {
                let cors = self.cors.take().unwrap_or_default();
                self.cors = Some(cors.with_origins(origins));
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let cfg = ApiConfig::default();
        assert_eq!(cfg.address(), "0.0.0.0:3000");
        assert_eq!(cfg.normalized_base_path(), "/api");
        assert!(!cfg.uses_tls());
        assert!(cfg.basic_auth().is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn tls_needs_both_files() {
        assert!(!ApiConfig::new().with_tls("cert.pem", "").uses_tls());
        assert!(ApiConfig::new().with_tls("cert.pem", "key.pem").uses_tls());
    }

    #[test]
    fn base_path_normalization() {
        for (raw, want) in [("/", ""), ("", ""), ("/api/", "/api"), ("robots", "/robots")] {
            assert_eq!(ApiConfig::new().with_base_path(raw).normalized_base_path(), want);
        }
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = ApiConfig::new().with_basic_auth("admin", "hunter2");
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
        assert!(format!("{:?}", ApiConfig::new()).contains("<not set>"));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FERROBOT_API_HOST", "127.0.0.1"),
            ("FERROBOT_API_PORT", "8088"),
            ("FERROBOT_API_USERNAME", "admin"),
            ("FERROBOT_API_PASSWORD", "secret"),
            ("FERROBOT_API_CORS_ORIGINS", "http://localhost:*, http://*.example.com,"),
        ]
        .into_iter()
        .collect();
        let cfg = ApiConfig::new().with_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.address(), "127.0.0.1:8088");
        assert_eq!(cfg.basic_auth(), Some(("admin", "secret")));
        assert_eq!(cfg.base_path, "/api");
        let cors = cfg.cors.unwrap();
        assert_eq!(cors.origins, vec!["http://localhost:*", "http://*.example.com"]);
        assert_eq!(cors.allowed_methods(), "GET,POST");
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(matches!(
            ApiConfig::new().with_port("http").validate(),
            Err(FerroError::Config(_))
        ));
    }
}
