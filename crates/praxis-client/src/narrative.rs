//! Narrative generation, buffered and streamed.
//!
//! A stream runs in its own task: the task opens the call through the
//! request pipeline, decodes events as bytes arrive and forwards them over
//! a channel. The caller reads them through [`NarrativeStream`], which
//! owns the cancellation token. Cancelling stops the transport, discards
//! anything buffered but undelivered, and yields exactly one
//! `Complete(UserCancelled)`.

use std::sync::Arc;

use futures::StreamExt;
use praxis_core::models::narrative::{NarrativeRequest, NarrativeResponse};
use praxis_core::paths;
use praxis_core::request::ApiRequest;
use praxis_narrative::events::{NarrativeEvent, StopReason};
use praxis_narrative::sse::EventDecoder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::pipeline::RequestPipeline;

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub const UNTERMINATED_STREAM: &str = "stream ended before completion";

#[derive(Clone)]
pub struct NarrativeApi {
    pipeline: Arc<RequestPipeline>,
}

impl NarrativeApi {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    /// Generate the whole narrative in one call.
    pub async fn generate(&self, request: &NarrativeRequest) -> Result<NarrativeResponse, ClientError> {
        validate(request)?;
        let api_request = ApiRequest::post(paths::NARRATIVES).json(request)?;
        let response: NarrativeResponse = self.pipeline.send(api_request).await?.decode()?;
        info!(stop_reason = %response.stop_reason, chars = response.text.len(), "narrative generated");
        Ok(response)
    }

    /// Start streaming a narrative. Returns as soon as the producing task
    /// is spawned; nothing has been sent yet. Invalid requests fail here
    /// rather than through the stream.
    pub fn stream(&self, request: &NarrativeRequest) -> Result<NarrativeStream, ClientError> {
        validate(request)?;
        let api_request = ApiRequest::post(paths::NARRATIVE_STREAM).json(request)?;

        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        tokio::spawn(pump(
            Arc::clone(&self.pipeline),
            api_request,
            events,
            cancel.clone(),
        ));

        Ok(NarrativeStream {
            events: receiver,
            cancel,
            finished: false,
        })
    }
}

fn validate(request: &NarrativeRequest) -> Result<(), ClientError> {
    request
        .validate()
        .map_err(|e| ClientError::InvalidRequest(e.to_string()))
}

// ── Consumer side ────────────────────────────────────────────────────────────

/// Callbacks for [`NarrativeStream::drive`]. Exactly one of `on_complete`
/// or `on_error` is called, after every `on_chunk`.
pub trait NarrativeHandler: Send {
    fn on_chunk(&mut self, text: &str);
    fn on_complete(&mut self, stop_reason: &StopReason);
    fn on_error(&mut self, message: &str);
}

/// Cancels one stream. Cloneable, idempotent, and a no-op once the stream
/// has finished.
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// The events of one in-flight stream. Dropping it cancels the stream.
#[derive(Debug)]
pub struct NarrativeStream {
    events: mpsc::Receiver<NarrativeEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl NarrativeStream {
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The next event, or `None` after the terminal one.
    ///
    /// Cancellation wins over events already queued: once cancelled, the
    /// next call returns `Complete(UserCancelled)` and nothing follows.
    pub async fn next(&mut self) -> Option<NarrativeEvent> {
        if self.finished {
            return None;
        }

        let received = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            received = self.events.recv() => Some(received),
        };

        match received {
            None => {
                self.finish();
                debug!("narrative stream cancelled by caller");
                Some(NarrativeEvent::Complete(StopReason::UserCancelled))
            }
            Some(Some(event)) => {
                if event.is_terminal() {
                    self.finish();
                }
                Some(event)
            }
            Some(None) => {
                self.finish();
                Some(NarrativeEvent::Error(UNTERMINATED_STREAM.to_string()))
            }
        }
    }

    /// Feed every event to `handler` until the stream finishes.
    pub async fn drive<H: NarrativeHandler>(mut self, handler: &mut H) {
        while let Some(event) = self.next().await {
            match event {
                NarrativeEvent::Chunk(text) => handler.on_chunk(&text),
                NarrativeEvent::Complete(reason) => handler.on_complete(&reason),
                NarrativeEvent::Error(message) => handler.on_error(&message),
            }
        }
    }

    /// Read the stream to the end, concatenating chunks.
    pub async fn collect(mut self) -> Transcript {
        let mut transcript = Transcript::default();
        while let Some(event) = self.next().await {
            match event {
                NarrativeEvent::Chunk(text) => {
                    transcript.text.push_str(&text);
                    transcript.chunks += 1;
                }
                terminal => transcript.end = Some(terminal),
            }
        }
        transcript
    }

    fn finish(&mut self) {
        self.finished = true;
        self.events.close();
        self.cancel.cancel();
    }
}

impl Drop for NarrativeStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A fully consumed stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub chunks: usize,
    /// The terminal event: `Complete` or `Error`.
    pub end: Option<NarrativeEvent>,
}

impl Transcript {
    pub fn stop_reason(&self) -> Option<&StopReason> {
        match &self.end {
            Some(NarrativeEvent::Complete(reason)) => Some(reason),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.end {
            Some(NarrativeEvent::Error(message)) => Some(message),
            _ => None,
        }
    }
}

// ── Producer side ────────────────────────────────────────────────────────────

async fn pump(
    pipeline: Arc<RequestPipeline>,
    request: ApiRequest,
    events: mpsc::Sender<NarrativeEvent>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = pipeline.open_stream(request) => opened,
    };

    let mut chunks = match opened {
        Ok(response) => response.chunks,
        Err(e) => {
            warn!(error = %e, "narrative stream failed to open");
            let _ = events.send(NarrativeEvent::Error(e.to_string())).await;
            return;
        }
    };

    let mut decoder = EventDecoder::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("aborting narrative transport");
                return;
            }
            next = chunks.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                for event in decoder.push(&bytes) {
                    if deliver(&events, event).await {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "narrative transport failed");
                let _ = events.send(NarrativeEvent::Error(e.to_string())).await;
                return;
            }
            None => break,
        }
    }

    if let Some(event) = decoder.finish()
        && deliver(&events, event).await
    {
        return;
    }

    warn!("narrative stream closed without a terminal event");
    let _ = events
        .send(NarrativeEvent::Error(UNTERMINATED_STREAM.to_string()))
        .await;
}

/// Forward one event. True when the stream is over, either because the
/// event was terminal or because the consumer is gone.
async fn deliver(events: &mpsc::Sender<NarrativeEvent>, event: NarrativeEvent) -> bool {
    let terminal = event.is_terminal();
    events.send(event).await.is_err() || terminal
}
