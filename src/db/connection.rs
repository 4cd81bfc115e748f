use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use super::error::{DatabaseError, Result};
use super::outcome::{all_of, Try};
use super::validation::{require_non_blank, validate};

pub const DEFAULT_PORT: u16 = 8529;

/// Credentials for a single connection attempt.
///
/// Validated when built, never mutated afterwards. Deserializing runs the
/// same checks as [`Credentials::new`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CredentialsRecord", into = "CredentialsRecord")]
pub struct Credentials {
    hostname: String,
    port: u16,
    user: String,
    password: String,
    database_name: String,
    use_ssl: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRecord {
    hostname: String,
    #[serde(default = "default_port")]
    port: u32,
    user: String,
    #[serde(default)]
    password: String,
    database_name: String,
    #[serde(default)]
    use_ssl: bool,
}

fn default_port() -> u32 {
    DEFAULT_PORT as u32
}

impl Credentials {
    pub fn new(
        hostname: impl Into<String>,
        port: u32,
        user: impl Into<String>,
        password: impl Into<String>,
        database_name: impl Into<String>,
    ) -> Result<Self> {
        Self::with_ssl(hostname, port, user, password, database_name, false)
    }

    pub fn with_ssl(
        hostname: impl Into<String>,
        port: u32,
        user: impl Into<String>,
        password: impl Into<String>,
        database_name: impl Into<String>,
        use_ssl: bool,
    ) -> Result<Self> {
        let hostname = hostname.into();
        let user = user.into();
        let database_name = database_name.into();

        all_of([
            require_non_blank(&hostname, "Host cannot be blank").void(),
            validate(port, |p| (1..=65535).contains(p), || {
                DatabaseError::invalid_argument("Port must be between 1 and 65535")
            })
            .void(),
            require_non_blank(&user, "User cannot be blank").void(),
            require_non_blank(&database_name, "Database name cannot be blank").void(),
        ])
        .into_result()?;

        let port = u16::try_from(port)
            .map_err(|_| DatabaseError::invalid_argument("Port must be between 1 and 65535"))?;

        Ok(Self {
            hostname,
            port,
            user,
            password: password.into(),
            database_name,
            use_ssl,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn use_ssl(&self) -> bool {
        self.use_ssl
    }

    /// Base URL of the server, `https` when TLS is requested.
    pub fn endpoint(&self) -> Result<Url> {
        let scheme = if self.use_ssl { "https" } else { "http" };
        Try::capture(|| Url::parse(&format!("{scheme}://{}:{}", self.hostname, self.port)))
            .into_result()
    }
}

impl From<url::ParseError> for DatabaseError {
    fn from(err: url::ParseError) -> Self {
        DatabaseError::InvalidArgument(format!("Invalid host: {err}"))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database_name", &self.database_name)
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

impl TryFrom<CredentialsRecord> for Credentials {
    type Error = DatabaseError;

    fn try_from(record: CredentialsRecord) -> Result<Self> {
        Credentials::with_ssl(
            record.hostname,
            record.port,
            record.user,
            record.password,
            record.database_name,
            record.use_ssl,
        )
    }
}

impl From<Credentials> for CredentialsRecord {
    fn from(credentials: Credentials) -> Self {
        Self {
            hostname: credentials.hostname,
            port: credentials.port as u32,
            user: credentials.user,
            password: credentials.password,
            database_name: credentials.database_name,
            use_ssl: credentials.use_ssl,
        }
    }
}

/// Configuration for the worker runtime owned by a client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Worker threads; `None` lets tokio pick one per core
    pub worker_threads: Option<usize>,
    pub thread_name: String,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            worker_threads: None,
            thread_name: "arango-worker".to_string(),
        }
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
