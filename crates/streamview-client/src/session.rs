use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::SessionConfig;
use crate::controller::{ErrorReporter, NegotiationController};
use crate::peer::PeerConnector;
use crate::sink::MediaSink;
use crate::transport;

/// Open the signaling channel described by `config` and negotiate until it
/// closes. The initial connection is attempted once.
pub async fn run_session<C: PeerConnector>(
    config: SessionConfig,
    connector: C,
    sink: Arc<dyn MediaSink>,
    report: ErrorReporter,
) -> Result<()> {
    let url = config.signaling_url()?;
    info!(%url, policy = %config.ice.policy, "starting signaling session");

    let (outbound, inbound) = transport::connect(&url, config.keepalive, config.greeting)
        .await
        .with_context(|| format!("failed to open signaling channel {url}"))?;

    NegotiationController::new(connector, config.ice, outbound, sink, report)
        .with_early_candidate_buffering(config.buffer_early_candidates)
        .run(inbound)
        .await?;

    info!(%url, "signaling channel closed");
    Ok(())
}
