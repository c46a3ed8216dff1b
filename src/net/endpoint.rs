use std::fmt;

use reqwest::Url;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("API endpoint is empty")]
    Empty,
    #[error("invalid API endpoint {input:?}: {reason}")]
    Invalid { input: String, reason: String },
    #[error("unsupported scheme {0:?}; expected http or https")]
    UnsupportedScheme(String),
    #[error("API endpoint {0:?} has no host")]
    MissingHost(String),
}

/// The service base URL plus every HTTP and WebSocket address derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    secure: bool,
    authority: String,
    path: String,
}

impl Endpoint {
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let trimmed = input.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(EndpointError::Empty);
        }

        let url = Url::parse(trimmed).map_err(|error| EndpointError::Invalid {
            input: trimmed.to_owned(),
            reason: error.to_string(),
        })?;

        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(EndpointError::UnsupportedScheme(other.to_owned())),
        };

        let host = url
            .host_str()
            .ok_or_else(|| EndpointError::MissingHost(trimmed.to_owned()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };

        Ok(Self {
            secure,
            authority,
            path: url.path().trim_end_matches('/').to_owned(),
        })
    }

    fn http(&self, suffix: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}{}{suffix}", self.authority, self.path)
    }

    fn ws(&self, suffix: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}{}{suffix}", self.authority, self.path)
    }

    pub fn hubs_url(&self) -> String {
        self.http("/hubs")
    }

    pub fn devices_url(&self) -> String {
        self.http("/devices")
    }

    pub fn updates_url(&self) -> String {
        self.ws("/updates")
    }

    pub fn hub_packets_url(&self, hub_id: &str) -> String {
        self.ws(&format!("/hubs/{hub_id}/packets"))
    }

    pub fn device_events_url(&self, device_id: &str) -> String {
        self.ws(&format!("/devices/{device_id}/events"))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.http(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_http_maps_to_ws() {
        let endpoint = Endpoint::parse("http://localhost:8000").expect("valid endpoint");
        assert_eq!(endpoint.updates_url(), "ws://localhost:8000/updates");
        assert_eq!(endpoint.hubs_url(), "http://localhost:8000/hubs");
        assert_eq!(
            endpoint.hub_packets_url("H1"),
            "ws://localhost:8000/hubs/H1/packets"
        );
    }

    #[test]
    fn https_and_sub_paths_survive_trailing_slashes() {
        let endpoint = Endpoint::parse("  https://net.example.com/api/v1///  ").expect("valid endpoint");
        assert_eq!(
            endpoint.device_events_url("D1"),
            "wss://net.example.com/api/v1/devices/D1/events"
        );
        assert_eq!(endpoint.devices_url(), "https://net.example.com/api/v1/devices");
        assert_eq!(endpoint.to_string(), "https://net.example.com/api/v1");
    }

    #[test]
    fn rejects_unusable_endpoints() {
        assert_eq!(Endpoint::parse(" / "), Err(EndpointError::Empty));
        assert!(matches!(
            Endpoint::parse("ftp://files.example.com"),
            Err(EndpointError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
        assert!(matches!(
            Endpoint::parse("not a url"),
            Err(EndpointError::Invalid { .. })
        ));
    }
}
