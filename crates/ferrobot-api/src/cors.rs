//! CORS policy: origin glob patterns plus fixed method and header lists.
//!
//! A pattern of `*` admits every origin. Otherwise `*` matches a run of
//! characters without a `.`, so `http://*.example.com` admits
//! `http://api.example.com` but not `http://example.com`, and
//! `http://localhost:*` admits any port.

use axum::http::{HeaderName, HeaderValue, Method};
use ferrobot_types::FerroError;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const DEFAULT_HEADERS: [&str; 4] = ["Origin", "X-Requested-With", "Content-Type", "Accept"];
pub const DEFAULT_METHODS: [&str; 2] = ["GET", "POST"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    pub origins: Vec<String>,
    pub methods: Vec<String>,
    pub headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: Vec::new(),
            methods: DEFAULT_METHODS.map(String::from).to_vec(),
            headers: DEFAULT_HEADERS.map(String::from).to_vec(),
        }
    }
}

impl CorsConfig {
    /// Policy admitting `origins` with the default methods and headers.
    pub fn allow_from<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().with_origins(origins)
    }

    pub fn with_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origins = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.origins.iter().any(|pattern| origin_matches(pattern, origin))
    }

    /// `Access-Control-Allow-Methods` value, e.g. `"GET,POST"`.
    pub fn allowed_methods(&self) -> String {
        self.methods.join(",")
    }

    /// `Access-Control-Allow-Headers` value.
    pub fn allowed_headers(&self) -> String {
        self.headers.join(",")
    }

    /// Build the tower layer. Disallowed origins are served without an
    /// `Access-Control-Allow-Origin` header; preflights answer with 200.
    ///
    /// # Errors
    ///
    /// [`FerroError::Config`] for a method or header name that is not valid
    /// HTTP.
    pub fn layer(&self) -> Result<CorsLayer, FerroError> {
        let methods = self
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.as_bytes())
                    .map_err(|_| FerroError::Config(format!("invalid CORS method '{m}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let headers = self
            .headers
            .iter()
            .map(|h| {
                HeaderName::from_bytes(h.as_bytes())
                    .map_err(|_| FerroError::Config(format!("invalid CORS header '{h}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let policy = self.clone();
        let origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin.to_str().is_ok_and(|o| policy.is_origin_allowed(o))
        });
        Ok(CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(headers))
    }
}

/// Glob match where `*` stands for any run of non-`.` characters.
pub fn origin_matches(pattern: &str, origin: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    glob(pattern.as_bytes(), origin.as_bytes())
}

fn glob(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => {
            let run = text.iter().take_while(|&&c| c != b'.').count();
            (0..=run).any(|skip| glob(rest, &text[skip..]))
        }
        Some((&c, rest)) => text.first() == Some(&c) && glob(rest, &text[1..]),
    }
}
