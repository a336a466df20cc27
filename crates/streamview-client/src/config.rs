use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;
use std::time::Duration;

use streamview_common::TransportError;
use url::Url;

pub const DEFAULT_SIGNALING_PORT: u16 = 8443;
pub const DEFAULT_SIGNALING_PATH: &str = "ws";
pub const DEFAULT_ORIGIN_HOST: &str = "localhost";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Where the signaling channel lives. Unset parts fall back to the origin
/// host, [`DEFAULT_SIGNALING_PORT`] and [`DEFAULT_SIGNALING_PATH`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
}

impl Endpoint {
    /// Build `ws://<host>[:<port>]/<path>`.
    ///
    /// `origin` stands in for the host when none was given explicitly. A
    /// port of `0` leaves the port out of the url.
    pub fn resolve(&self, origin: Option<&str>) -> Result<Url, TransportError> {
        let host = self
            .host
            .as_deref()
            .or(origin)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_ORIGIN_HOST);
        let host = match host.parse::<Ipv6Addr>() {
            Ok(_) => format!("[{host}]"),
            Err(_) => host.to_owned(),
        };
        let port = match self.port.unwrap_or(DEFAULT_SIGNALING_PORT) {
            0 => String::new(),
            port => format!(":{port}"),
        };
        let path = self
            .path
            .as_deref()
            .unwrap_or(DEFAULT_SIGNALING_PATH)
            .trim_start_matches('/');

        let raw = format!("ws://{host}{port}/{path}");
        Url::parse(&raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))
    }
}

/// A STUN or TURN server entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// Which candidate types the engine may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IcePolicy {
    #[default]
    All,
    Relay,
}

impl FromStr for IcePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(IcePolicy::All),
            "relay" => Ok(IcePolicy::Relay),
            other => Err(format!("unknown ICE transport policy '{other}' (expected all|relay)")),
        }
    }
}

impl fmt::Display for IcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IcePolicy::All => f.write_str("all"),
            IcePolicy::Relay => f.write_str("relay"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceConfig {
    pub servers: Vec<IceServer>,
    pub policy: IcePolicy,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec![IceServer::stun(DEFAULT_STUN_SERVER)],
            policy: IcePolicy::All,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    /// Host used when `endpoint.host` is unset.
    pub origin: Option<String>,
    pub ice: IceConfig,
    /// Idle interval after which a websocket ping is sent. `None` disables it.
    pub keepalive: Option<Duration>,
    /// Plain-text frame sent right after the channel opens.
    pub greeting: Option<String>,
    /// Hold remote candidates that arrive before any remote description and
    /// apply them once one has been set.
    pub buffer_early_candidates: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            origin: None,
            ice: IceConfig::default(),
            keepalive: Some(DEFAULT_KEEPALIVE),
            greeting: None,
            buffer_early_candidates: false,
        }
    }
}

impl SessionConfig {
    pub fn signaling_url(&self) -> Result<Url, TransportError> {
        self.endpoint.resolve(self.origin.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let url = Endpoint::default().resolve(None).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8443/ws");
    }

    #[test]
    fn test_origin_used_when_host_missing() {
        let url = Endpoint::default().resolve(Some("media.example.org")).unwrap();
        assert_eq!(url.as_str(), "ws://media.example.org:8443/ws");

        let explicit = Endpoint {
            host: Some("10.0.0.7".into()),
            ..Default::default()
        };
        let url = explicit.resolve(Some("media.example.org")).unwrap();
        assert_eq!(url.host_str(), Some("10.0.0.7"));
    }

    #[test]
    fn test_explicit_parts_and_zero_port() {
        let endpoint = Endpoint {
            host: Some("cam.local".into()),
            port: Some(0),
            path: Some("/signal/feed".into()),
        };
        let url = endpoint.resolve(None).unwrap();
        assert_eq!(url.as_str(), "ws://cam.local/signal/feed");
    }

    #[test]
    fn test_ipv6_hosts_are_bracketed() {
        let endpoint = Endpoint {
            host: Some("::1".into()),
            ..Default::default()
        };
        assert_eq!(endpoint.resolve(None).unwrap().as_str(), "ws://[::1]:8443/ws");

        let url = Endpoint {
            port: Some(0),
            ..Default::default()
        }
        .resolve(Some("fe80::1"))
        .unwrap();
        assert_eq!(url.as_str(), "ws://[fe80::1]/ws");

        let bracketed = Endpoint {
            host: Some("[2001:db8::7]".into()),
            ..Default::default()
        };
        assert_eq!(
            bracketed.resolve(None).unwrap().host_str(),
            Some("[2001:db8::7]")
        );
    }

    #[test]
    fn test_invalid_host_rejected() {
        let endpoint = Endpoint {
            host: Some("bad host".into()),
            ..Default::default()
        };
        assert!(matches!(
            endpoint.resolve(None),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_ice_policy_parse() {
        assert_eq!("relay".parse::<IcePolicy>().unwrap(), IcePolicy::Relay);
        assert_eq!(" ALL ".parse::<IcePolicy>().unwrap(), IcePolicy::All);
        assert!("host".parse::<IcePolicy>().is_err());
    }

    #[test]
    fn test_default_ice_config_has_one_stun_server() {
        let ice = IceConfig::default();
        assert_eq!(ice.servers, vec![IceServer::stun(DEFAULT_STUN_SERVER)]);
        assert_eq!(ice.policy, IcePolicy::All);
    }
}
