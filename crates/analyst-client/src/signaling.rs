//! WebRTC offer/answer exchange with the voice backend.
//!
//! The media stack itself lives behind [`PeerConnection`]; this module only drives the
//! negotiation and the HTTP leg of it.

use crate::backend::Backend;
use crate::error::{rejection_reason, ClientError, ClientResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const OFFER_PATH: &str = "/api/offer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: SdpKind,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpKind::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpKind::Answer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// Transport state reported by the media stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Voice connection status as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => f.write_str("Disconnected"),
            ConnectionStatus::Connecting => f.write_str("Connecting"),
            ConnectionStatus::Connected => f.write_str("Connected"),
            ConnectionStatus::Failed(_) => f.write_str("Connection failed"),
        }
    }
}

/// The peer connection as seen by signaling. Implemented by the native media stack.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> ClientResult<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> ClientResult<()>;

    /// Local description including gathered candidates, once one has been set.
    async fn local_description(&self) -> Option<SessionDescription>;

    fn ice_gathering_state(&self) -> IceGatheringState;

    fn subscribe_ice_gathering(&self) -> watch::Receiver<IceGatheringState>;

    fn connection_state(&self) -> PeerConnectionState;

    fn subscribe_connection_state(&self) -> watch::Receiver<PeerConnectionState>;

    async fn set_remote_description(&self, description: SessionDescription) -> ClientResult<()>;

    async fn close(&self) -> ClientResult<()>;
}

/// Wait until ICE gathering completes, at most `limit`.
///
/// Returns `false` on timeout. Sending an offer with the candidates gathered so far is
/// still valid, so a timeout is only logged.
pub async fn wait_for_ice_gathering(pc: &dyn PeerConnection, limit: Duration) -> bool {
    if pc.ice_gathering_state() == IceGatheringState::Complete {
        return true;
    }
    let mut states = pc.subscribe_ice_gathering();
    let waited = tokio::time::timeout(limit, async move {
        states
            .wait_for(|state| *state == IceGatheringState::Complete)
            .await
            .is_ok()
    })
    .await;

    match waited {
        Ok(true) => true,
        Ok(false) => {
            warn!("ICE gathering state channel closed before completion");
            false
        }
        Err(_) => {
            warn!("ICE gathering did not complete within {:?}, sending offer anyway", limit);
            false
        }
    }
}

#[derive(Debug, Serialize)]
struct OfferRequest<'a> {
    sdp: &'a str,
    #[serde(rename = "type")]
    kind: SdpKind,
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pc_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OfferAnswer {
    sdp: String,
    #[serde(rename = "type")]
    kind: SdpKind,
    #[serde(default)]
    pc_id: Option<String>,
}

/// Map a transport change onto the user-facing status. `None` leaves it unchanged.
fn status_for(state: PeerConnectionState) -> Option<ConnectionStatus> {
    match state {
        PeerConnectionState::Connected => Some(ConnectionStatus::Connected),
        PeerConnectionState::Disconnected | PeerConnectionState::Closed => {
            Some(ConnectionStatus::Disconnected)
        }
        PeerConnectionState::Failed => Some(ConnectionStatus::Failed(
            "peer connection failed".to_string(),
        )),
        PeerConnectionState::New | PeerConnectionState::Connecting => None,
    }
}

/// Negotiates one peer connection. Remembers the backend's `pc_id` so later offers
/// renegotiate the same connection, and tracks the connection status.
#[derive(Debug)]
pub struct SignalingClient {
    backend: Backend,
    ice_timeout: Duration,
    pc_id: Option<String>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    follower: Option<JoinHandle<()>>,
}

impl SignalingClient {
    pub fn new(backend: Backend) -> Self {
        let ice_timeout = backend.config().ice_gathering_timeout();
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            backend,
            ice_timeout,
            pc_id: None,
            status: Arc::new(status),
            follower: None,
        }
    }

    pub fn with_ice_timeout(mut self, limit: Duration) -> Self {
        self.ice_timeout = limit;
        self
    }

    /// Backend-assigned id of the negotiated connection, if any.
    pub fn pc_id(&self) -> Option<&str> {
        self.pc_id.as_deref()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Run the offer/answer exchange. Status moves to `Connecting`, then `Connected` or
    /// `Failed`; afterwards it follows the peer's own connection state changes.
    pub async fn negotiate(
        &mut self,
        pc: &dyn PeerConnection,
        session_id: &str,
    ) -> ClientResult<SessionDescription> {
        self.stop_following();
        self.status.send_replace(ConnectionStatus::Connecting);
        match self.exchange(pc, session_id).await {
            Ok(answer) => {
                self.status.send_replace(ConnectionStatus::Connected);
                self.follow(pc.subscribe_connection_state());
                Ok(answer)
            }
            Err(e) => {
                warn!("negotiation for session {} failed: {}", session_id, e);
                self.status.send_replace(ConnectionStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn exchange(
        &mut self,
        pc: &dyn PeerConnection,
        session_id: &str,
    ) -> ClientResult<SessionDescription> {
        let offer = pc.create_offer().await?;
        pc.set_local_description(offer).await?;
        wait_for_ice_gathering(pc, self.ice_timeout).await;

        let local = pc
            .local_description()
            .await
            .ok_or_else(|| ClientError::Signaling("no local description after offer".into()))?;

        let request = OfferRequest {
            sdp: &local.sdp,
            kind: local.kind,
            session_id,
            pc_id: self.pc_id.as_deref(),
        };
        info!(
            "sending offer for session {} (renegotiate: {})",
            session_id,
            request.pc_id.is_some()
        );

        let response = self
            .backend
            .http()
            .post(self.backend.endpoint(OFFER_PATH))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                reason: rejection_reason(&body, "Offer failed"),
            });
        }

        let answer: OfferAnswer = serde_json::from_str(&body)?;
        if let Some(pc_id) = answer.pc_id {
            debug!("backend assigned pc_id {}", pc_id);
            self.pc_id = Some(pc_id);
        }

        let remote = SessionDescription {
            sdp: answer.sdp,
            kind: answer.kind,
        };
        pc.set_remote_description(remote.clone()).await?;
        Ok(remote)
    }

    /// Close the connection and forget its `pc_id`.
    pub async fn disconnect(&mut self, pc: &dyn PeerConnection) -> ClientResult<()> {
        self.stop_following();
        self.pc_id = None;
        self.status.send_replace(ConnectionStatus::Disconnected);
        pc.close().await
    }

    fn follow(&mut self, mut states: watch::Receiver<PeerConnectionState>) {
        let status = Arc::clone(&self.status);
        states.borrow_and_update();
        self.follower = Some(tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                if let Some(next) = status_for(state) {
                    debug!("peer connection {:?}", state);
                    status.send_replace(next);
                }
            }
        }));
    }

    fn stop_following(&mut self) {
        if let Some(follower) = self.follower.take() {
            follower.abort();
        }
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.stop_following();
    }
}
