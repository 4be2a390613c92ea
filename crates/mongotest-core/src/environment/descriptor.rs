//! Connection parameters for a running topology

use std::fmt;

/// Username/password pair used against an authenticated deployment
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Database the user is defined in
    pub auth_source: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            auth_source: "admin".to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("auth_source", &self.auth_source)
            .finish()
    }
}

/// Everything needed to open a connection to a topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    /// Database the tests work in
    pub database: String,
    pub replica_set: Option<String>,
    pub credentials: Option<Credentials>,
    pub tls: bool,
}

impl ConnectionDescriptor {
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            replica_set: None,
            credentials: None,
            tls: false,
        }
    }

    pub fn with_replica_set(mut self, name: impl Into<String>) -> Self {
        self.replica_set = Some(name.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// The same endpoint without credentials
    pub fn anonymous(&self) -> Self {
        Self {
            credentials: None,
            ..self.clone()
        }
    }

    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `mongodb://` connection string including auth and set parameters
    pub fn uri(&self) -> String {
        let auth = self
            .credentials
            .as_ref()
            .map(|c| format!("{}:{}@", c.username, c.password))
            .unwrap_or_default();

        let mut params = Vec::new();
        if let Some(set) = &self.replica_set {
            params.push(format!("replicaSet={}", set));
        }
        if let Some(creds) = &self.credentials {
            params.push(format!("authSource={}", creds.auth_source));
        }
        if self.tls {
            params.push("tls=true".to_string());
        }

        let query = if params.is_empty() {
            String::new()
        } else {
            format!("?{}", params.join("&"))
        };

        format!(
            "mongodb://{}{}/{}{}",
            auth,
            self.endpoint(),
            self.database,
            query
        )
    }
}
