//! Data source name parsing.
//!
//! A data source is configured with either a URL the pool driver understands
//! (`mysql://`, `postgres://`, `sqlite:` and friends) or a Go-driver style MySQL
//! DSN such as `user:pass@tcp(host:3306)/app?charset=utf8mb4`. The latter is
//! rewritten into an equivalent `mysql://` URL.

use crate::models::DatabaseType;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;
use url::Url;

const DEFAULT_MYSQL_ADDR: &str = "127.0.0.1:3306";

/// Errors produced while interpreting a DSN string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DsnError {
    #[error("DSN is empty")]
    Empty,

    #[error("Unrecognized DSN format (expected a mysql://, postgres:// or sqlite: URL, or user:pass@tcp(host:port)/dbname)")]
    UnrecognizedFormat,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported network type '{0}' (expected tcp or unix)")]
    UnsupportedNetwork(String),

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Unsupported tls value '{0}'")]
    UnsupportedTls(String),
}

/// A validated data source, normalised into a driver URL.
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    db_type: DatabaseType,
    url: String,
}

impl Dsn {
    /// Parse a configured DSN.
    pub fn parse(raw: &str) -> Result<Self, DsnError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DsnError::Empty);
        }

        match DatabaseType::from_connection_string(raw) {
            Some(DatabaseType::SQLite) => Ok(Self {
                db_type: DatabaseType::SQLite,
                url: raw.to_string(),
            }),
            Some(db_type) => {
                let mut url = Url::parse(raw).map_err(|e| DsnError::InvalidUrl(e.to_string()))?;
                if url.scheme().eq_ignore_ascii_case("mariadb") {
                    // sqlx only knows the mysql scheme
                    url = Url::parse(&format!("mysql{}", &raw["mariadb".len()..]))
                        .map_err(|e| DsnError::InvalidUrl(e.to_string()))?;
                }
                Ok(Self {
                    db_type,
                    url: url.to_string(),
                })
            }
            None if raw.contains('/') && !raw.contains("://") => Ok(Self {
                db_type: DatabaseType::MySQL,
                url: go_mysql_to_url(raw)?,
            }),
            None => Err(DsnError::UnrecognizedFormat),
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// The URL handed to the pool driver. Contains credentials; never log it.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL with any password replaced by `****`, safe for logs.
    pub fn masked(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) if url.password().is_some() => {
                // set_password only fails for URLs that cannot carry credentials
                if url.set_password(Some("****")).is_ok() {
                    url.to_string()
                } else {
                    self.url.clone()
                }
            }
            _ => self.url.clone(),
        }
    }
}

impl std::fmt::Debug for Dsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dsn")
            .field("db_type", &self.db_type)
            .field("url", &self.masked())
            .finish()
    }
}

impl std::fmt::Display for Dsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.masked())
    }
}

impl std::str::FromStr for Dsn {
    type Err = DsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Rewrite `[user[:password]@][net[(addr)]]/dbname[?param=value&...]` as a
/// `mysql://` URL.
fn go_mysql_to_url(raw: &str) -> Result<String, DsnError> {
    // The database name follows the last '/', since passwords and socket paths may contain '/'.
    let slash = raw.rfind('/').ok_or(DsnError::UnrecognizedFormat)?;
    let (head, tail) = (&raw[..slash], &raw[slash + 1..]);
    let (dbname, query) = match tail.split_once('?') {
        Some((db, q)) => (db, Some(q)),
        None => (tail, None),
    };

    // Passwords may contain '@'
    let (credentials, net_addr) = match head.rfind('@') {
        Some(at) => (Some(&head[..at]), &head[at + 1..]),
        None => (None, head),
    };

    let (net, addr) = match net_addr.find('(') {
        Some(open) => {
            let addr = net_addr[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| DsnError::InvalidAddress(net_addr.to_string()))?;
            (&net_addr[..open], addr)
        }
        None => (net_addr, ""),
    };

    let mut url = Url::parse("mysql://localhost").map_err(|e| DsnError::InvalidUrl(e.to_string()))?;
    let mut socket = None;

    match net {
        "" | "tcp" | "tcp4" | "tcp6" => {
            let addr = if addr.is_empty() { DEFAULT_MYSQL_ADDR } else { addr };
            let (host, port) = split_host_port(addr)?;
            url.set_host(Some(host))
                .map_err(|_| DsnError::InvalidAddress(addr.to_string()))?;
            url.set_port(Some(port))
                .map_err(|_| DsnError::InvalidAddress(addr.to_string()))?;
        }
        "unix" => {
            let path = if addr.is_empty() { "/tmp/mysql.sock" } else { addr };
            socket = Some(path.to_string());
        }
        other => return Err(DsnError::UnsupportedNetwork(other.to_string())),
    }

    if let Some(credentials) = credentials {
        let (user, password) = match credentials.split_once(':') {
            Some((user, password)) => (user, Some(password)),
            None => (credentials, None),
        };
        // Go credentials are literal text; `Url` would keep a `%` as an escape.
        let user = utf8_percent_encode(user, NON_ALPHANUMERIC).to_string();
        let password = password.map(|p| utf8_percent_encode(p, NON_ALPHANUMERIC).to_string());
        url.set_username(&user)
            .map_err(|_| DsnError::InvalidUrl("username cannot be set".to_string()))?;
        url.set_password(password.as_deref())
            .map_err(|_| DsnError::InvalidUrl("password cannot be set".to_string()))?;
    }

    if !dbname.is_empty() {
        url.set_path(&format!("/{dbname}"));
    }

    let mut params: Vec<(String, String)> = Vec::new();
    if let Some(socket) = socket {
        params.push(("socket".to_string(), socket));
    }
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                // Go accepts a fallback list; the first entry is the preferred charset
                "charset" => {
                    let first = value.split(',').next().unwrap_or_default();
                    params.push(("charset".to_string(), first.to_string()));
                }
                "collation" => params.push(("collation".to_string(), value.into_owned())),
                "tls" => params.push(("ssl-mode".to_string(), tls_to_ssl_mode(&value)?.to_string())),
                other => {
                    tracing::debug!(param = other, "Dropping MySQL DSN parameter with no pool equivalent");
                }
            }
        }
    }
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }

    Ok(url.to_string())
}

fn split_host_port(addr: &str) -> Result<(&str, u16), DsnError> {
    let invalid = || DsnError::InvalidAddress(addr.to_string());

    // "[::1]:3306" or "[::1]"
    if addr.starts_with('[') {
        let close = addr.find(']').ok_or_else(invalid)?;
        let host = &addr[..=close];
        let port = match &addr[close + 1..] {
            "" => 3306,
            rest => rest
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)?,
        };
        return Ok((host, port));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            Ok((host, port.parse().map_err(|_| invalid())?))
        }
        Some(_) => Err(invalid()),
        None => Ok((addr, 3306)),
    }
}

fn tls_to_ssl_mode(value: &str) -> Result<&'static str, DsnError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok("VERIFY_IDENTITY"),
        "false" => Ok("DISABLED"),
        "skip-verify" => Ok("REQUIRED"),
        "preferred" => Ok("PREFERRED"),
        "" => Err(DsnError::UnsupportedTls(value.to_string())),
        // A named custom TLS config registered with the Go driver
        _ => Ok("REQUIRED"),
    }
}
