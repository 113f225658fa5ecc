//! Owned live sessions over a backend event stream.
//!
//! A session spawns one pump task that exclusively owns its reducer (the transcript
//! interpreter or the progress tracker). Consumers never touch the reducer; they read
//! immutable [`Snapshot`]s from a `watch` channel. Closing or dropping the session aborts
//! the pump, so a discarded session can never deliver into a newer one.

use crate::backend::Backend;
use crate::error::ClientResult;
use crate::events::EventStream;
use analyst_core::{
    AnalystConfig, EnrichmentProgress, RenderUnit, Segment, TranscriptInterpreter,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// State a stream message is folded into.
pub trait StreamReducer: Clone + Send + 'static {
    type View: Clone + Send + Sync + 'static;

    /// Apply one event payload. Returns whether the view changed.
    fn apply(&mut self, message: &str) -> bool;

    fn view(&self) -> Self::View;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    /// The server closed the stream, or the session was closed locally.
    Ended,
    Failed(String),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot<V> {
    pub state: SessionState,
    pub view: V,
    pub updated_at: DateTime<Utc>,
}

impl<V> Snapshot<V> {
    fn new(state: SessionState, view: V) -> Self {
        Self {
            state,
            view,
            updated_at: Utc::now(),
        }
    }
}

/// Derived transcript at one point in the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptView {
    pub segments: Vec<Segment>,
    pub units: Vec<RenderUnit>,
    pub line_count: usize,
}

impl TranscriptView {
    /// Units that later lines can no longer change: everything but the last one.
    pub fn settled_units(&self) -> &[RenderUnit] {
        let settled = self.units.len().saturating_sub(1);
        &self.units[..settled]
    }
}

impl StreamReducer for TranscriptInterpreter {
    type View = TranscriptView;

    fn apply(&mut self, message: &str) -> bool {
        self.ingest_message(message) > 0
    }

    fn view(&self) -> TranscriptView {
        TranscriptView {
            segments: self.segments().to_vec(),
            units: self.units().to_vec(),
            line_count: self.lines().len(),
        }
    }
}

impl StreamReducer for EnrichmentProgress {
    type View = EnrichmentProgress;

    fn apply(&mut self, message: &str) -> bool {
        self.observe(message)
    }

    fn view(&self) -> EnrichmentProgress {
        self.clone()
    }
}

pub type TranscriptSnapshot = Snapshot<TranscriptView>;
pub type ProgressSnapshot = Snapshot<EnrichmentProgress>;

/// A live event stream folded into a reducer by a background task.
///
/// Must be created inside a Tokio runtime.
pub struct StreamSession<R: StreamReducer> {
    backend: Backend,
    path: String,
    session_id: String,
    blank: R,
    snapshots: Arc<watch::Sender<Snapshot<R::View>>>,
    generation: Arc<AtomicU64>,
    pump: Option<JoinHandle<()>>,
}

pub type TranscriptSession = StreamSession<TranscriptInterpreter>;
pub type ProgressSession = StreamSession<EnrichmentProgress>;

impl StreamSession<TranscriptInterpreter> {
    /// Stream the transcript of `session_id` into a fresh interpreter.
    pub fn open(config: AnalystConfig, session_id: &str) -> ClientResult<Self> {
        let interpreter = TranscriptInterpreter::with_policy(config.parse_policy());
        let path = config.transcript_path.clone();
        Ok(Self::connect(Backend::new(config)?, &path, session_id, interpreter))
    }
}

impl StreamSession<EnrichmentProgress> {
    /// Follow enrichment progress for `session_id`.
    pub fn open(config: AnalystConfig, session_id: &str) -> ClientResult<Self> {
        let path = config.progress_path.clone();
        Ok(Self::connect(
            Backend::new(config)?,
            &path,
            session_id,
            EnrichmentProgress::new(),
        ))
    }
}

impl<R: StreamReducer> StreamSession<R> {
    /// Start pumping `{backend}{path}?session_id=<id>` into `reducer`.
    ///
    /// `reducer` is kept as the blank state every [`restart`](Self::restart) begins from.
    pub fn connect(backend: Backend, path: &str, session_id: &str, reducer: R) -> Self {
        let (tx, _) = watch::channel(Snapshot::new(SessionState::Connecting, reducer.view()));
        let mut session = Self {
            backend,
            path: path.to_string(),
            session_id: session_id.to_string(),
            blank: reducer,
            snapshots: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
            pump: None,
        };
        session.spawn_pump();
        session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<R::View>> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot<R::View> {
        self.snapshots.borrow().clone()
    }

    /// Wait until the stream has ended or failed, then return the final snapshot.
    pub async fn finished(&self) -> Snapshot<R::View> {
        let mut rx = self.subscribe();
        let done = rx
            .wait_for(|snapshot| snapshot.state.is_terminal())
            .await
            .map(|snapshot| snapshot.clone());
        match done {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.pump.as_ref().is_some_and(|pump| !pump.is_finished())
    }

    /// Stop the pump now. Nothing from this stream is delivered afterwards.
    pub fn close(&mut self) {
        if self.abort_pump() {
            info!("closed stream session {}", self.session_id);
        }
        self.snapshots.send_if_modified(|snapshot| {
            if snapshot.state.is_terminal() {
                return false;
            }
            *snapshot = Snapshot::new(SessionState::Ended, snapshot.view.clone());
            true
        });
    }

    /// Close and reconnect with a fresh reducer. Existing subscribers keep receiving.
    pub fn restart(&mut self) {
        self.abort_pump();
        info!("restarting stream session {}", self.session_id);
        self.snapshots
            .send_replace(Snapshot::new(SessionState::Connecting, self.blank.view()));
        self.spawn_pump();
    }

    fn abort_pump(&mut self) -> bool {
        self.generation.fetch_add(1, Ordering::SeqCst);
        match self.pump.take() {
            Some(pump) => {
                pump.abort();
                true
            }
            None => false,
        }
    }

    fn spawn_pump(&mut self) {
        let publisher = Publisher {
            snapshots: Arc::clone(&self.snapshots),
            generation: Arc::clone(&self.generation),
            current: self.generation.load(Ordering::SeqCst),
        };
        let client = self.backend.streaming().clone();
        let url = self.backend.endpoint(&self.path);
        let session_id = self.session_id.clone();
        let reducer = self.blank.clone();
        self.pump = Some(tokio::spawn(pump(client, url, session_id, reducer, publisher)));
    }
}

impl<R: StreamReducer> Drop for StreamSession<R> {
    fn drop(&mut self) {
        self.abort_pump();
    }
}

/// Publishes for one pump generation; stale pumps are silenced after close or restart.
struct Publisher<V> {
    snapshots: Arc<watch::Sender<Snapshot<V>>>,
    generation: Arc<AtomicU64>,
    current: u64,
}

impl<V> Publisher<V> {
    fn publish(&self, state: SessionState, view: V) {
        self.snapshots.send_if_modified(|snapshot| {
            if self.generation.load(Ordering::SeqCst) != self.current {
                return false;
            }
            *snapshot = Snapshot::new(state, view);
            true
        });
    }
}

async fn pump<R: StreamReducer>(
    client: reqwest::Client,
    url: String,
    session_id: String,
    mut reducer: R,
    publisher: Publisher<R::View>,
) {
    let query = [("session_id", session_id.as_str())];
    let mut events = match EventStream::connect(&client, &url, &query).await {
        Ok(events) => events,
        Err(e) => {
            warn!("event stream for session {} failed to open: {}", session_id, e);
            publisher.publish(SessionState::Failed(e.to_string()), reducer.view());
            return;
        }
    };
    publisher.publish(SessionState::Streaming, reducer.view());

    while let Some(event) = events.next_event().await {
        match event {
            Ok(event) => {
                if reducer.apply(&event.data) {
                    publisher.publish(SessionState::Streaming, reducer.view());
                } else {
                    debug!("event for session {} changed nothing", session_id);
                }
            }
            Err(e) => {
                warn!("event stream for session {} lost: {}", session_id, e);
                publisher.publish(SessionState::Failed(e.to_string()), reducer.view());
                return;
            }
        }
    }

    info!("event stream for session {} ended", session_id);
    publisher.publish(SessionState::Ended, reducer.view());
}
