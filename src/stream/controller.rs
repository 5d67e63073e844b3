//! The read loop that turns a response body into a reconciled message.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;

use super::frame::{FrameBuffer, Frames};
use super::reconciler::{Applied, MessageReconciler};
use crate::error::ChatError;
use crate::observability::{log_stream_complete, StreamStats};
use crate::protocol::event::{decode_frame, FrameDecode};
use crate::protocol::message::Message;
use crate::protocol::request::ChatRequest;
use crate::transport::ChatTransport;

/// Lifecycle of one stream.
///
/// `Idle -> Sending -> Streaming -> {Completed | Failed | Cancelled}`.
/// Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl StreamState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Failed | StreamState::Cancelled
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Idle => "idle",
            StreamState::Sending => "sending",
            StreamState::Streaming => "streaming",
            StreamState::Completed => "completed",
            StreamState::Failed => "failed",
            StreamState::Cancelled => "cancelled",
        }
    }

    fn can_enter(self, next: StreamState) -> bool {
        match self {
            StreamState::Idle => matches!(next, StreamState::Sending),
            StreamState::Sending => matches!(
                next,
                StreamState::Streaming | StreamState::Failed | StreamState::Cancelled
            ),
            StreamState::Streaming => next.is_terminal(),
            StreamState::Completed | StreamState::Failed | StreamState::Cancelled => false,
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What subscribers see: the current state and an immutable copy of the
/// in-progress message.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSnapshot {
    pub state: StreamState,
    pub message: Message,
}

/// Final result of a stream, returned on every exit path.
#[derive(Debug)]
pub struct StreamOutcome {
    pub state: StreamState,
    /// The sealed assistant message, including any partial content.
    pub message: Message,
    /// Set when `state` is [`StreamState::Failed`].
    pub error: Option<ChatError>,
    pub stats: StreamStats,
}

impl StreamOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == StreamState::Completed
    }
}

/// Requests cancellation of a running stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Stop the stream at its next suspension point. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

enum LoopEnd {
    Sentinel,
    TransportEnd,
    Cancelled,
}

/// Drives one request from dispatch to a sealed message.
///
/// Single consumer, single producer: one loop reads the body, decodes frames
/// and applies events in order. Every change is published as a
/// [`StreamSnapshot`] on a watch channel; the in-progress message itself is
/// never shared. `run` consumes the controller, so a stream cannot be restarted.
pub struct StreamController {
    state: StreamState,
    frame_buffer: FrameBuffer,
    reconciler: MessageReconciler,
    stats: StreamStats,
    snapshots: watch::Sender<StreamSnapshot>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    idle_timeout: Option<Duration>,
}

impl StreamController {
    #[must_use]
    pub fn new() -> Self {
        let reconciler = MessageReconciler::new();
        let (snapshots, _) = watch::channel(StreamSnapshot {
            state: StreamState::Idle,
            message: reconciler.message().clone(),
        });
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            state: StreamState::Idle,
            frame_buffer: FrameBuffer::new(),
            reconciler,
            stats: StreamStats::default(),
            snapshots,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            idle_timeout: None,
        }
    }

    /// Fail the stream when no chunk arrives within `timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Receive a snapshot after every state change and every applied event.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.snapshots.subscribe()
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Dispatch `request` over `transport` and stream the answer to completion.
    pub async fn run<T>(mut self, transport: &T, request: &ChatRequest) -> StreamOutcome
    where
        T: ChatTransport + Sync,
    {
        let started = Instant::now();
        self.transition(StreamState::Sending);

        let opened = tokio::select! {
            biased;
            () = cancelled(&mut self.cancel_rx) => None,
            result = transport.open(request) => Some(result),
        };
        match opened {
            None => self.finish(StreamState::Cancelled, None, started),
            Some(Err(err)) => self.finish(StreamState::Failed, Some(err), started),
            Some(Ok(body)) => self.drive(body, started).await,
        }
    }

    /// Stream an already-open response body to completion.
    pub async fn consume<S>(mut self, body: S) -> StreamOutcome
    where
        S: Stream<Item = Result<Bytes, ChatError>> + Unpin,
    {
        let started = Instant::now();
        self.transition(StreamState::Sending);
        self.drive(body, started).await
    }

    async fn drive<S>(mut self, mut body: S, started: Instant) -> StreamOutcome
    where
        S: Stream<Item = Result<Bytes, ChatError>> + Unpin,
    {
        self.transition(StreamState::Streaming);
        let result = self.read_loop(&mut body).await;
        drop(body);
        tracing::debug!("response body released");

        match result {
            Ok(LoopEnd::Sentinel | LoopEnd::TransportEnd) => {
                self.finish(StreamState::Completed, None, started)
            }
            Ok(LoopEnd::Cancelled) => self.finish(StreamState::Cancelled, None, started),
            Err(err) => self.finish(StreamState::Failed, Some(err), started),
        }
    }

    async fn read_loop<S>(&mut self, body: &mut S) -> Result<LoopEnd, ChatError>
    where
        S: Stream<Item = Result<Bytes, ChatError>> + Unpin,
    {
        let mut frames = Frames::new();
        loop {
            let next = tokio::select! {
                biased;
                () = cancelled(&mut self.cancel_rx) => return Ok(LoopEnd::Cancelled),
                next = next_chunk(body, self.idle_timeout) => next?,
            };
            let Some(chunk) = next else {
                let remainder = self.frame_buffer.remainder();
                if !remainder.trim().is_empty() {
                    tracing::debug!(
                        bytes = remainder.len(),
                        "discarding incomplete trailing frame"
                    );
                }
                return Ok(LoopEnd::TransportEnd);
            };

            self.stats.record_chunk(chunk.len());
            self.frame_buffer.push_into(&chunk, &mut frames);
            let total = frames.len();
            for (index, frame) in frames.drain(..).enumerate() {
                let decoded = decode_frame(&frame);
                self.stats.record_frame(&decoded);
                match decoded {
                    FrameDecode::Done => {
                        self.stats.frames_dropped += (total - index - 1) as u64;
                        return Ok(LoopEnd::Sentinel);
                    }
                    FrameDecode::Event(event) => {
                        let applied = self.reconciler.apply(event);
                        self.stats.record_applied(applied);
                        if applied == Applied::Merged {
                            self.publish();
                        }
                    }
                    FrameDecode::NotData
                    | FrameDecode::Malformed(_)
                    | FrameDecode::UnknownKind(_) => {}
                }
            }
        }
    }

    fn transition(&mut self, next: StreamState) {
        if !self.state.can_enter(next) {
            tracing::warn!(from = %self.state, to = %next, "ignoring invalid stream transition");
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "stream transition");
        self.state = next;
        self.publish();
    }

    fn publish(&self) {
        self.snapshots.send_replace(StreamSnapshot {
            state: self.state,
            message: self.reconciler.message().clone(),
        });
    }

    fn finish(
        mut self,
        state: StreamState,
        error: Option<ChatError>,
        started: Instant,
    ) -> StreamOutcome {
        if let Some(err) = &error {
            tracing::error!(error = %err, "chat stream failed");
            self.reconciler.annotate_error(&err.annotation_text());
        }
        self.transition(state);
        log_stream_complete(state.as_str(), &self.stats, started);
        StreamOutcome {
            state: self.state,
            message: self.reconciler.seal(),
            error,
            stats: self.stats,
        }
    }
}

impl Default for StreamController {
    fn default() -> Self {
        Self::new()
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    // A closed channel can never be cancelled.
    let signalled = rx.wait_for(|cancelled| *cancelled).await.is_ok();
    if !signalled {
        std::future::pending::<()>().await;
    }
}

async fn next_chunk<S>(body: &mut S, idle_timeout: Option<Duration>) -> Result<Option<Bytes>, ChatError>
where
    S: Stream<Item = Result<Bytes, ChatError>> + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, body.next())
            .await
            .map_err(|_| ChatError::IdleTimeout(limit))?,
        None => body.next().await,
    };
    next.transpose()
}
