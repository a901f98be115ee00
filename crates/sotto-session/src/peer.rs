//! Per-peer transport negotiation state machine.
//!
//! Manages the offer/answer/candidate exchange for one remote
//! participant. Uses the action pattern: methods take events and
//! return actions for the driver to execute against the real
//! transport. This keeps the state machine pure (no I/O) and makes
//! testing straightforward.
//!
//! # State Machine
//!
//! ```text
//!            connect                    answer
//! ┌─────┐  (initiator)   ┌───────────┐ applied  ┌─────────────────┐
//! │ New │───────────────>│ OfferSent │─────────>│ AnswerExchanged │
//! └─────┘                └───────────┘          └─────────────────┘
//!    │                                                  │  ▲
//!    │ offer received        answer sent                │  │ restart
//!    │ (responder)   ┌───────────────┐                  ▼  │ (once)
//!    └──────────────>│ OfferReceived │────────>─── ┌───────────┐
//!                    └───────────────┘             │ Connected │
//!                                                  └───────────┘
//!                                                        │ second failure
//!                                                        ▼
//!                                            ┌────────┐     ┌────────┐
//!                                            │ Failed │     │ Closed │
//!                                            └────────┘     └────────┘
//! ```
//!
//! Connectivity candidates that arrive before the remote description
//! is applied are buffered and flushed exactly once, on the transition
//! into `AnswerExchanged`. Stale or duplicate offer/answer messages
//! are ignored without a state transition.

use std::collections::VecDeque;

use sotto_proto::SignalMessage;

/// Actions returned by the peer state machine.
///
/// The driver (test harness or production transport glue) executes
/// these against the underlying connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAction {
    /// Create a local transport offer; reply with
    /// [`PeerSession::local_description_ready`].
    CreateOffer,

    /// Create a local transport answer; reply with
    /// [`PeerSession::local_description_ready`].
    CreateAnswer,

    /// Apply the remote session description.
    ApplyRemoteDescription {
        /// Serialized remote description.
        sdp: String,
    },

    /// Apply a remote connectivity candidate.
    ApplyCandidate {
        /// Serialized candidate.
        candidate: String,
    },

    /// Restart connectivity negotiation after a transport failure.
    RestartIce,

    /// Open the application data channel (initiator side).
    OpenDataChannel,

    /// Publish this signaling message through the relay.
    SendSignal(SignalMessage),
}

/// Peer session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No negotiation started.
    New,
    /// Local offer published, waiting for an answer.
    OfferSent,
    /// Remote offer applied, local answer pending.
    OfferReceived,
    /// Both descriptions applied; connectivity checks running.
    AnswerExchanged,
    /// Transport is up.
    Connected,
    /// Torn down deliberately.
    Closed,
    /// Terminal failure after the single allowed restart.
    Failed,
}

/// Transport state changes reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// The transport reports an established connection.
    Connected,
    /// The transport lost connectivity.
    Disconnected,
    /// The transport failed outright.
    Failed,
}

/// Negotiation state machine for one remote participant.
///
/// Pure state machine - no I/O, no clocks. All transport interaction
/// is expressed through [`PeerAction`]s.
#[derive(Debug, Clone)]
pub struct PeerSession {
    local_id: String,
    peer_id: String,
    state: PeerState,
    initiator: bool,
    pending_candidates: VecDeque<String>,
    restarts: u32,
    channel_open: bool,
}

impl PeerSession {
    /// Maximum automatic connectivity restarts before terminal failure.
    pub const MAX_RESTARTS: u32 = 1;

    /// Create a session for a remote participant in [`PeerState::New`].
    pub fn new(local_id: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            peer_id: peer_id.into(),
            state: PeerState::New,
            initiator: false,
            pending_candidates: VecDeque::new(),
            restarts: 0,
            channel_open: false,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// The remote participant this session negotiates with.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Whether the session has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PeerState::Closed | PeerState::Failed)
    }

    /// Whether the application data channel is open.
    #[must_use]
    pub fn is_channel_open(&self) -> bool {
        self.channel_open
    }

    /// The driver reported the data channel as open.
    pub fn channel_opened(&mut self) {
        if self.state == PeerState::Connected {
            self.channel_open = true;
        }
    }

    /// Start negotiation as the initiator.
    ///
    /// Only meaningful in [`PeerState::New`]; in any other state the
    /// call is ignored (duplicate connect attempts are harmless).
    pub fn connect(&mut self) -> Vec<PeerAction> {
        if self.state != PeerState::New || self.initiator {
            return Vec::new();
        }

        self.initiator = true;
        vec![PeerAction::CreateOffer]
    }

    /// The driver produced the local session description.
    ///
    /// Initiator: publish the offer and move to `OfferSent`.
    /// Responder: publish the answer, move to `AnswerExchanged`, and
    /// flush any buffered candidates.
    pub fn local_description_ready(&mut self, sdp: String) -> Vec<PeerAction> {
        match self.state {
            PeerState::New if self.initiator => {
                self.state = PeerState::OfferSent;
                vec![PeerAction::SendSignal(SignalMessage::Offer {
                    from: self.local_id.clone(),
                    to: self.peer_id.clone(),
                    sdp,
                })]
            }
            PeerState::OfferReceived => {
                self.state = PeerState::AnswerExchanged;
                let mut actions = vec![PeerAction::SendSignal(SignalMessage::Answer {
                    from: self.local_id.clone(),
                    to: self.peer_id.clone(),
                    sdp,
                })];
                actions.extend(self.flush_candidates());
                actions
            }
            _ => {
                tracing::debug!(peer = %self.peer_id, state = ?self.state,
                    "ignoring local description in unexpected state");
                Vec::new()
            }
        }
    }

    /// A remote offer arrived (responder path).
    ///
    /// Ignored outside [`PeerState::New`]: a duplicate or stale offer
    /// must not restart an in-progress negotiation.
    pub fn handle_offer(&mut self, sdp: String) -> Vec<PeerAction> {
        if self.state != PeerState::New {
            tracing::debug!(peer = %self.peer_id, state = ?self.state, "ignoring stale offer");
            return Vec::new();
        }

        self.state = PeerState::OfferReceived;
        vec![PeerAction::ApplyRemoteDescription { sdp }, PeerAction::CreateAnswer]
    }

    /// A remote answer arrived (initiator path).
    ///
    /// Applies the description, moves to `AnswerExchanged`, and
    /// flushes buffered candidates exactly once. Ignored outside
    /// [`PeerState::OfferSent`].
    pub fn handle_answer(&mut self, sdp: String) -> Vec<PeerAction> {
        if self.state != PeerState::OfferSent {
            tracing::debug!(peer = %self.peer_id, state = ?self.state, "ignoring stale answer");
            return Vec::new();
        }

        self.state = PeerState::AnswerExchanged;
        let mut actions = vec![PeerAction::ApplyRemoteDescription { sdp }];
        actions.extend(self.flush_candidates());
        actions
    }

    /// A remote connectivity candidate arrived.
    ///
    /// Applied immediately once the remote description is in place;
    /// otherwise buffered (applying a candidate before the description
    /// must re-queue gracefully, never error out the session).
    pub fn handle_candidate(&mut self, candidate: String) -> Vec<PeerAction> {
        match self.state {
            PeerState::AnswerExchanged | PeerState::Connected => {
                vec![PeerAction::ApplyCandidate { candidate }]
            }
            PeerState::New | PeerState::OfferSent | PeerState::OfferReceived => {
                self.pending_candidates.push_back(candidate);
                Vec::new()
            }
            PeerState::Closed | PeerState::Failed => Vec::new(),
        }
    }

    /// The driver reported a transport state change.
    ///
    /// A failure triggers one automatic restart; a second failure is
    /// terminal. Returns `(actions, became_terminal)` so the owner can
    /// tear the session down and surface the disconnect.
    pub fn transport_state(&mut self, transport: TransportState) -> (Vec<PeerAction>, bool) {
        if self.is_terminal() {
            return (Vec::new(), false);
        }

        match transport {
            TransportState::Connected => {
                self.state = PeerState::Connected;
                if self.initiator {
                    (vec![PeerAction::OpenDataChannel], false)
                } else {
                    (Vec::new(), false)
                }
            }
            TransportState::Disconnected | TransportState::Failed => {
                self.channel_open = false;
                if self.restarts < Self::MAX_RESTARTS {
                    self.restarts += 1;
                    self.state = PeerState::AnswerExchanged;
                    (vec![PeerAction::RestartIce], false)
                } else {
                    self.state = PeerState::Failed;
                    (Vec::new(), true)
                }
            }
        }
    }

    /// Tear the session down deliberately.
    pub fn close(&mut self) {
        self.state = PeerState::Closed;
        self.pending_candidates.clear();
    }

    fn flush_candidates(&mut self) -> Vec<PeerAction> {
        self.pending_candidates
            .drain(..)
            .map(|candidate| PeerAction::ApplyCandidate { candidate })
            .collect()
    }
}
