//! Per-destination frame delivery with interleave protection.
//!
//! Two independent producers write to each connection: the guest's own
//! session (notices, `PONG`, the close frame) and its roommate (relayed
//! traffic). A destination is busy from the moment a non-final frame is
//! written until the matching final frame goes out; while it is, frames
//! from the other producer are queued instead of written, and the queue
//! drains one frame per completed message. Admitted frames reach the
//! socket through a write pump that owns the write half; admission
//! holds its lock only around the queue bookkeeping, never a write.

use std::collections::VecDeque;
use std::sync::Mutex;

use tandem_protocol::{Frame, codec};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Which producer a frame came from, as seen by its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    /// Received from the roommate and relayed through.
    Forwarded,
    /// Generated by the destination's own session.
    Outgoing,
}

/// Error returned when the destination's socket is gone.
#[derive(Debug, thiserror::Error)]
#[error("delivery failed: connection closed")]
pub struct DeliveryClosed;

#[derive(Default)]
struct AdmissionState {
    /// Source of the in-progress, not-yet-final write sequence, if any.
    busy_from: Option<FrameSource>,
    queue: VecDeque<(Frame, FrameSource)>,
}

/// Outbound side of one connection.
pub struct Outbound {
    state: Mutex<AdmissionState>,
    tx: mpsc::UnboundedSender<Frame>,
}

impl Outbound {
    /// Creates the outbound side and spawns its write pump over the
    /// socket's write half.
    pub fn spawn<W>(writer: W, cancel: CancellationToken) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_pump(writer, rx, cancel));
        Self {
            state: Mutex::new(AdmissionState::default()),
            tx,
        }
    }

    /// Delivers one frame: written immediately when the wire is free for
    /// this source, queued behind the in-progress message otherwise.
    pub fn deliver(&self, frame: Frame, source: FrameSource) -> Result<(), DeliveryClosed> {
        let mut state = self.state.lock().unwrap();
        if state.busy_from.is_none() || state.busy_from == Some(source) {
            self.admit(&mut state, frame, source)
        } else {
            debug!(?source, "destination busy, frame queued");
            state.queue.push_back((frame, source));
            Ok(())
        }
    }

    /// Hands a frame to the write pump and updates the busy marker. A
    /// final frame frees the wire and drains queued frames until the
    /// queue is empty or a drained frame leaves the wire busy again.
    fn admit(
        &self,
        state: &mut AdmissionState,
        frame: Frame,
        source: FrameSource,
    ) -> Result<(), DeliveryClosed> {
        let fin = frame.fin;
        self.tx.send(frame).map_err(|_| DeliveryClosed)?;
        if !fin {
            state.busy_from = Some(source);
            return Ok(());
        }

        state.busy_from = None;
        while let Some((queued, queued_source)) = state.queue.pop_front() {
            let queued_fin = queued.fin;
            self.tx.send(queued).map_err(|_| DeliveryClosed)?;
            if !queued_fin {
                state.busy_from = Some(queued_source);
                break;
            }
        }
        Ok(())
    }
}

/// Write pump: encodes admitted frames onto the socket in admission
/// order, then shuts the write half down.
async fn write_pump<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Frame>, cancel: CancellationToken)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = codec::write_frame(&mut writer, &frame).await {
                            warn!("write failed, dropping connection: {e}");
                            break;
                        }
                    }
                    None => break, // All senders gone.
                }
            }
        }
    }

    let _ = writer.shutdown().await;
}
