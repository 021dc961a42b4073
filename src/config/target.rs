//! Store connection target parsing.

use std::fmt;

use url::Url;

const DEFAULT_PORT: u16 = 6379;

/// Where the shared store lives, parsed from a `scheme://host:port?db=N` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTarget {
    pub host: String,
    pub port: u16,
    pub db: u32,
}

impl StoreTarget {
    /// Parse a connection string. Port defaults to 6379 and `db` to 0;
    /// a non-numeric `db` also falls back to 0.
    pub fn parse(connection: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(connection)?;
        let host = url
            .host_str()
            .ok_or(url::ParseError::EmptyHost)?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);
        let db = url
            .query_pairs()
            .find(|(k, _)| k == "db")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);

        Ok(Self { host, port, db })
    }
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.db)
    }
}
