//! Connection target construction.
//!
//! Turns one of the three [`ConnectionConfig`] shapes into a fully resolved
//! [`ConnectionTarget`] (scheme, host, port, path, query, headers). Building
//! is pure and total: optional fields that are missing or malformed fall back
//! to defaults instead of failing.
//!
//! Query values are reproduced verbatim by default. Callers talking to the
//! legacy deployment rely on that; everyone else should switch the builder to
//! [`QueryEncoding::Percent`].

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

/// Path used when a structured config gives none, and always for legacy configs.
pub const DEFAULT_PATH: &str = "/ws";

/// Ports that select the secure scheme for legacy parameter configs.
pub const LEGACY_SECURE_PORTS: [u16; 3] = [443, 8443, 8089];

/// WebSocket scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// `wss://`
    Secure,
    /// `ws://`
    Plain,
}

impl Scheme {
    /// Picks `Secure` when `secure` is true.
    pub fn from_secure(secure: bool) -> Self {
        if secure {
            Scheme::Secure
        } else {
            Scheme::Plain
        }
    }

    /// URL scheme string (`wss` or `ws`).
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Secure => "wss",
            Scheme::Plain => "ws",
        }
    }

    /// Port implied when the URL carries none.
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Secure => 443,
            Scheme::Plain => 80,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How query parameter keys and values are written into the URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryEncoding {
    /// Values are copied as given. Callers are responsible for safe characters.
    #[default]
    Verbatim,
    /// Keys and values are percent-encoded.
    Percent,
}

/// Structured connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub use_secure: bool,
    /// Appended to the URL in this order.
    pub query_params: Vec<(String, String)>,
    /// Sent with the opening handshake, never embedded in the URL.
    pub headers: BTreeMap<String, String>,
}

impl StructuredConfig {
    /// Creates a config with the default path (`/ws`), secure scheme and no
    /// query parameters or headers.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: DEFAULT_PATH.to_string(),
            use_secure: true,
            query_params: Vec::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn use_secure(mut self, use_secure: bool) -> Self {
        self.use_secure = use_secure;
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Legacy parameter set: identity fields serialized onto a fixed `/ws` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub employee_id: String,
    pub employee_name: String,
    pub department_id: String,
    pub account_id: String,
    /// Appended after the five fixed parameters, in this order.
    pub extra_params: Vec<(String, String)>,
}

/// One of the three supported ways of describing what to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfig {
    /// A fully formed address, used verbatim.
    Direct { url: String },
    /// Host/port/path assembled into a URL, plus handshake headers.
    Structured(StructuredConfig),
    /// Legacy identity parameters.
    LegacyParams(LegacyConfig),
}

impl ConnectionConfig {
    /// Short name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionConfig::Direct { .. } => "direct",
            ConnectionConfig::Structured(_) => "structured",
            ConnectionConfig::LegacyParams(_) => "legacy",
        }
    }
}

/// Fully resolved, immutable connection address.
///
/// The rendered URL is computed once at construction; for direct configs it
/// is the caller's string, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: String,
    query: Vec<(String, String)>,
    headers: BTreeMap<String, String>,
    url: String,
}

impl ConnectionTarget {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, `None` when the scheme default applies.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// The address handed to the transport.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Builds targets with a fixed query encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetBuilder {
    encoding: QueryEncoding,
}

impl TargetBuilder {
    pub fn new(encoding: QueryEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> QueryEncoding {
        self.encoding
    }

    /// Resolves `config` into a target. Never fails.
    pub fn build(&self, config: &ConnectionConfig) -> ConnectionTarget {
        match config {
            ConnectionConfig::Direct { url } => from_direct(url),
            ConnectionConfig::Structured(c) => {
                let scheme = Scheme::from_secure(c.use_secure);
                let path = normalize_path(&c.path);
                self.assemble(
                    scheme,
                    &c.host,
                    c.port,
                    path,
                    c.query_params.clone(),
                    c.headers.clone(),
                )
            }
            ConnectionConfig::LegacyParams(c) => {
                let scheme = Scheme::from_secure(LEGACY_SECURE_PORTS.contains(&c.port));
                let mut query = vec![
                    ("api_key".to_string(), c.api_key.clone()),
                    ("emp_id".to_string(), c.employee_id.clone()),
                    ("emp_name".to_string(), c.employee_name.clone()),
                    ("dep_id".to_string(), c.department_id.clone()),
                    ("acc_id".to_string(), c.account_id.clone()),
                ];
                query.extend(c.extra_params.iter().cloned());
                self.assemble(
                    scheme,
                    &c.host,
                    c.port,
                    DEFAULT_PATH.to_string(),
                    query,
                    BTreeMap::new(),
                )
            }
        }
    }

    fn assemble(
        &self,
        scheme: Scheme,
        host: &str,
        port: u16,
        path: String,
        query: Vec<(String, String)>,
        headers: BTreeMap<String, String>,
    ) -> ConnectionTarget {
        let port = (port != 0 && port != scheme.default_port()).then_some(port);

        let mut url = format!("{}://{}", scheme, host);
        if let Some(port) = port {
            let _ = write!(url, ":{}", port);
        }
        url.push_str(&path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&self.render_query(&query));
        }

        ConnectionTarget {
            scheme,
            host: host.to_string(),
            port,
            path,
            query,
            headers,
            url,
        }
    }

    fn render_query(&self, query: &[(String, String)]) -> String {
        query
            .iter()
            .map(|(key, value)| match self.encoding {
                QueryEncoding::Verbatim => format!("{}={}", key, value),
                QueryEncoding::Percent => format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                ),
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Builds a target with verbatim query values.
pub fn build(config: &ConnectionConfig) -> ConnectionTarget {
    TargetBuilder::default().build(config)
}

/// Empty paths fall back to `/ws`; a missing leading slash is added.
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        DEFAULT_PATH.to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Keeps `url` verbatim and fills the descriptive fields best-effort.
fn from_direct(url: &str) -> ConnectionTarget {
    let mut target = ConnectionTarget {
        scheme: Scheme::Secure,
        host: String::new(),
        port: None,
        path: "/".to_string(),
        query: Vec::new(),
        headers: BTreeMap::new(),
        url: url.to_string(),
    };

    let Ok(parsed) = url::Url::parse(url) else {
        tracing::debug!(url, "direct url did not parse, keeping it as an opaque address");
        return target;
    };

    target.scheme = match parsed.scheme() {
        "ws" | "http" => Scheme::Plain,
        _ => Scheme::Secure,
    };
    target.host = parsed.host_str().unwrap_or_default().to_string();
    target.port = parsed.port();
    target.path = parsed.path().to_string();
    target.query = parsed
        .query()
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect()
        })
        .unwrap_or_default();
    target
}
