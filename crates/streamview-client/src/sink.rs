use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::peer::RemoteStream;

/// Playback target for inbound media.
pub trait MediaSink: Send + Sync + 'static {
    /// Take ownership of a newly negotiated stream.
    fn attach(&self, stream: RemoteStream);
}

/// Drops streams on the floor after logging them.
pub struct NullSink;

impl MediaSink for NullSink {
    fn attach(&self, stream: RemoteStream) {
        info!(stream_id = %stream.stream_id, kind = %stream.kind, "remote stream ignored");
    }
}

/// Reads RTP from every attached track and periodically logs throughput.
pub struct RtpStatsSink {
    report_every: Duration,
}

impl RtpStatsSink {
    pub fn new(report_every: Duration) -> Self {
        Self { report_every }
    }
}

impl Default for RtpStatsSink {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl MediaSink for RtpStatsSink {
    fn attach(&self, stream: RemoteStream) {
        info!(
            stream_id = %stream.stream_id,
            track_id = %stream.track_id,
            kind = %stream.kind,
            "remote stream attached"
        );
        let Some(track) = stream.track else {
            return;
        };
        let report_every = self.report_every;
        let track_id = stream.track_id;

        tokio::spawn(async move {
            let mut packets: u64 = 0;
            let mut bytes: u64 = 0;
            let mut last_report = Instant::now();
            loop {
                match track.read_rtp().await {
                    Ok((packet, _)) => {
                        packets += 1;
                        bytes += packet.payload.len() as u64;
                        if last_report.elapsed() >= report_every {
                            info!(track_id = %track_id, packets, bytes, "rtp received");
                            last_report = Instant::now();
                        }
                    }
                    Err(e) => {
                        debug!(track_id = %track_id, error = %e, "remote track ended");
                        break;
                    }
                }
            }
            info!(track_id = %track_id, packets, bytes, "remote track finished");
        });
    }
}
