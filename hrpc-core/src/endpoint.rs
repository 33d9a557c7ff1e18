use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Address of one remote server instance. Supplied by configuration; this
/// core never derives endpoints on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Pair form accepted by `ToSocketAddrs`.
    pub fn addr(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid endpoint '{0}', expected host:port")]
pub struct EndpointParseError(String);

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError(s.to_string()))?;
        if host.is_empty() {
            return Err(EndpointParseError(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| EndpointParseError(s.to_string()))?;
        Ok(Endpoint::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> String {
        endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let endpoint: Endpoint = "localhost:8080".parse().unwrap();
        assert_eq!(endpoint.host(), "localhost");
        assert_eq!(endpoint.port(), 8080);
        assert_eq!(endpoint.to_string(), "localhost:8080");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("no-port".parse::<Endpoint>().is_err());
        assert!(":8080".parse::<Endpoint>().is_err());
        assert!("host:notaport".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_serde_string_form() {
        let endpoint = Endpoint::new("10.0.0.1", 9090);
        let json = serde_json::to_string(&endpoint).unwrap();
        assert_eq!(json, "\"10.0.0.1:9090\"");

        let deserialized: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, endpoint);
    }
}
