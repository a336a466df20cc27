use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use streamview_client::config::{DEFAULT_SIGNALING_PATH, DEFAULT_SIGNALING_PORT, DEFAULT_STUN_SERVER};
use streamview_client::{
    run_session, Endpoint, ErrorReporter, IceConfig, IcePolicy, IceServer, RtpStatsSink,
    SessionConfig, WebRtcConnector,
};
use streamview_common::EngineError;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "streamview-client", about = "Receive a WebRTC stream via websocket signaling")]
struct Args {
    /// Signaling host (defaults to --origin)
    #[arg(long, env = "STREAMVIEW_HOST")]
    host: Option<String>,
    /// Signaling port; 0 leaves the port out of the url
    #[arg(long, env = "STREAMVIEW_PORT", default_value_t = DEFAULT_SIGNALING_PORT)]
    port: u16,
    #[arg(long, env = "STREAMVIEW_PATH", default_value = DEFAULT_SIGNALING_PATH)]
    path: String,
    /// Host the client was served from
    #[arg(long, env = "STREAMVIEW_ORIGIN")]
    origin: Option<String>,
    /// STUN server url (repeatable)
    #[arg(long = "stun", env = "STREAMVIEW_STUN", value_delimiter = ',', default_value = DEFAULT_STUN_SERVER)]
    stun: Vec<String>,
    /// TURN server url
    #[arg(long, env = "STREAMVIEW_TURN", requires_all = ["turn_username", "turn_credential"])]
    turn: Option<String>,
    #[arg(long, env = "STREAMVIEW_TURN_USERNAME")]
    turn_username: Option<String>,
    #[arg(long, env = "STREAMVIEW_TURN_CREDENTIAL", hide_env_values = true)]
    turn_credential: Option<String>,
    /// ICE transport policy: all|relay
    #[arg(long, env = "STREAMVIEW_ICE_POLICY", default_value = "all")]
    ice_policy: IcePolicy,
    /// Websocket ping interval in seconds; 0 disables it
    #[arg(long, env = "STREAMVIEW_KEEPALIVE_SECS", default_value_t = 30)]
    keepalive_secs: u64,
    /// Text frame sent right after connecting (e.g. HELLO)
    #[arg(long, env = "STREAMVIEW_GREETING")]
    greeting: Option<String>,
    /// Hold remote candidates until the offer has been applied
    #[arg(long, env = "STREAMVIEW_BUFFER_EARLY_CANDIDATES", default_value_t = false)]
    buffer_early_candidates: bool,
    /// Seconds between RTP throughput log lines
    #[arg(long, env = "STREAMVIEW_STATS_SECS", default_value_t = 5)]
    stats_secs: u64,
    #[arg(long, env = "STREAMVIEW_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let mut servers: Vec<IceServer> = self.stun.iter().map(IceServer::stun).collect();
        if let (Some(url), Some(user), Some(cred)) =
            (&self.turn, &self.turn_username, &self.turn_credential)
        {
            servers.push(IceServer::turn(url, user, cred));
        }

        SessionConfig {
            endpoint: Endpoint {
                host: self.host.clone(),
                port: Some(self.port),
                path: Some(self.path.clone()),
            },
            origin: self.origin.clone(),
            ice: IceConfig {
                servers,
                policy: self.ice_policy,
            },
            keepalive: (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs)),
            greeting: self.greeting.clone(),
            buffer_early_candidates: self.buffer_early_candidates,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    streamview_common::init_tracing_with_default(&args.log_level);

    let failures = Arc::new(AtomicU64::new(0));
    let counter = failures.clone();
    let report: ErrorReporter = Arc::new(move |_: &EngineError| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let connector = WebRtcConnector::new()?;
    let sink = Arc::new(RtpStatsSink::new(Duration::from_secs(args.stats_secs.max(1))));

    let result = run_session(args.session_config(), connector, sink, report).await;
    info!(
        negotiation_failures = failures.load(Ordering::Relaxed),
        "session finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build_session_config() {
        let args = Args::try_parse_from(["streamview-client"]).unwrap();
        let config = args.session_config();
        assert_eq!(
            config.signaling_url().unwrap().as_str(),
            "ws://localhost:8443/ws"
        );
        assert_eq!(config.ice, IceConfig::default());
        assert_eq!(config.keepalive, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_turn_and_relay_policy() {
        let args = Args::try_parse_from([
            "streamview-client",
            "--host",
            "cam.local",
            "--port",
            "0",
            "--turn",
            "turn:turn.example.org:3478",
            "--turn-username",
            "viewer",
            "--turn-credential",
            "secret",
            "--ice-policy",
            "relay",
            "--keepalive-secs",
            "0",
        ])
        .unwrap();
        let config = args.session_config();
        assert_eq!(config.signaling_url().unwrap().as_str(), "ws://cam.local/ws");
        assert_eq!(config.ice.servers.len(), 2);
        assert_eq!(config.ice.servers[1].username.as_deref(), Some("viewer"));
        assert_eq!(config.ice.policy, IcePolicy::Relay);
        assert!(config.keepalive.is_none());
    }

    #[test]
    fn test_turn_requires_credentials() {
        assert!(Args::try_parse_from(["streamview-client", "--turn", "turn:t:3478"]).is_err());
    }
}
