//! Where a proxied request goes.

/// Backend host, port and path prefix of one node in the proxy tree.
///
/// Immutable: descending into a path segment derives a new target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    host: String,
    port: u16,
    path: String,
}

impl BackendTarget {
    /// Target at the root of the backend (empty path).
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: String::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Same host and port, path extended by one segment.
    pub fn child(&self, segment: &str) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            path: format!("{}/{}", self.path, segment),
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.bracketed_host(), self.port)
    }

    /// Value of the `Host` header sent to the backend.
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.bracketed_host()
        } else {
            self.authority()
        }
    }

    /// Origin-form request target for the backend request line.
    pub fn path_and_query(&self, query: Option<&str>) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        match query {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        }
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl std::fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.authority(), self.path_and_query(None))
    }
}
