//! # analyst-client
//!
//! Network collaborators of the voice analyst client.
//!
//! ```text
//!  dataset.csv ──upload──▶ backend ◀──offer/answer── PeerConnection (voice)
//!                             │
//!          transcript events  │  enrichment events
//!                             ▼
//!  TranscriptSession ──▶ TranscriptInterpreter ──▶ watch<Snapshot> ──▶ UI
//!  ProgressSession   ──▶ EnrichmentProgress    ──▶ watch<Snapshot> ──▶ UI
//! ```
//!
//! All collaborators share one [`Backend`] handle built from [`AnalystConfig`].

pub mod backend;
pub mod error;
pub mod events;
pub mod report;
pub mod session;
pub mod signaling;
pub mod upload;

pub use analyst_core::AnalystConfig;
pub use backend::Backend;
pub use error::{ClientError, ClientResult};
pub use events::{EventStream, SseDecoder, SseEvent};
pub use report::{ReportAck, ReportClient};
pub use session::{
    ProgressSession, ProgressSnapshot, SessionState, Snapshot, StreamReducer, StreamSession,
    TranscriptSession, TranscriptSnapshot, TranscriptView,
};
pub use signaling::{
    wait_for_ice_gathering, ConnectionStatus, IceGatheringState, PeerConnection,
    PeerConnectionState, SdpKind, SessionDescription, SignalingClient,
};
pub use upload::{UploadClient, UploadReceipt};
