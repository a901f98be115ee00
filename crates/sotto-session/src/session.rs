//! The session: one participant's view of one room.
//!
//! `Session` owns everything derived from the room code - the key
//! set, the signaling channel, the peer table, the retry queue - and
//! exposes the action pattern throughout: operations and inbound
//! events return [`SessionAction`]s for the driver to execute. No
//! global state; every component receives the keys it needs from the
//! session that owns them.
//!
//! # Message paths
//!
//! - Signaling and admin traffic crosses the relay as signed
//!   envelopes; failed publishes retry with backoff
//! - Chat is double-wrapped (inner `chat` key, outer `auth` key) and
//!   sent directly over peer data channels
//! - Voice notes seal whole under the `chat` key, with the mime tag
//!   in the clear for playback
//! - Files travel the data channels in sealed chunks under the `file`
//!   key

use std::collections::HashMap;

use sotto_crypto::{
    IV_SIZE, Iv, KdfConfig, KeySet, SignalingKeys, StorageId, derive_master_key,
    derive_signaling_keys, derive_storage_id, derive_subkeys, open, rotate, seal,
};
use sotto_proto::{AdminAction, ChatBody, FileChunk, MessageRecord, PeerFrame, SignalMessage};

use crate::{
    env::Environment,
    error::SessionError,
    file::{FileAssembler, chunk_file},
    peer::{PeerAction, PeerSession, PeerState, TransportState},
    retry::{RetryConfig, RetryQueue},
    signaling::{Inbound, SignalingChannel},
};

/// Actions returned by the session for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Subscribe to the relay feed for this room.
    Subscribe {
        /// Relay-visible room identifier.
        storage_id: String,
    },

    /// Write an encoded record to the relay. The driver must report
    /// the result via [`Session::publish_outcome`].
    Publish {
        /// Relay-visible room identifier.
        storage_id: String,
        /// Encoded relay record.
        record: String,
    },

    /// Send bytes over an open peer data channel.
    SendPeer {
        /// The remote participant.
        peer: String,
        /// Encoded peer frame.
        payload: Vec<u8>,
    },

    /// Execute a transport action against one peer's connection.
    Peer {
        /// The remote participant.
        peer: String,
        /// The transport action.
        action: PeerAction,
    },

    /// Surface an event to the user.
    Notify(Notification),
}

/// User-visible session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A chat message was received and authenticated.
    ChatReceived {
        /// Authenticated sender (from the inner plaintext).
        from: String,
        /// Message text.
        text: String,
        /// Sender timestamp, Unix milliseconds.
        ts: u64,
    },

    /// A voice note was received and decrypted.
    VoiceReceived {
        /// Sending peer.
        from: String,
        /// Audio container type, e.g. `audio/webm`.
        mime: String,
        /// Decrypted audio blob.
        data: Vec<u8>,
    },

    /// A file transfer completed.
    FileReceived {
        /// Sending peer.
        from: String,
        /// Transfer identifier.
        file_id: String,
        /// Reassembled file contents.
        data: Vec<u8>,
    },

    /// A peer's transport connected.
    PeerConnected {
        /// The remote participant.
        peer: String,
    },

    /// A peer was torn down (transport failure past the single
    /// restart, or kicked).
    PeerDisconnected {
        /// The remote participant.
        peer: String,
    },

    /// A participant announced itself.
    PresenceSeen {
        /// The announcing participant.
        peer: String,
        /// Their wall-clock timestamp, Unix milliseconds.
        ts: u64,
    },

    /// A participant was renamed by an admin.
    Renamed {
        /// Identity that was renamed.
        target: String,
        /// New display name.
        name: String,
    },

    /// We were removed from the room by an admin.
    Kicked,

    /// A signaling message exhausted its retries and was dropped.
    /// Emitted exactly once per dropped record.
    DeliveryFailed,
}

/// Per-room state, dropped wholesale on leave (keys zeroize on drop).
struct Room<I>
where
    I: Copy + Ord + std::ops::Add<std::time::Duration, Output = I> + std::ops::Sub<Output = std::time::Duration>,
{
    storage_id: StorageId,
    keys: KeySet,
    channel: SignalingChannel,
    peers: HashMap<String, PeerSession>,
    retry: RetryQueue<I>,
    files: FileAssembler,
}

/// One participant's session.
///
/// Generic over the [`Environment`] so tests drive it with virtual
/// time and seeded randomness.
pub struct Session<E: Environment> {
    env: E,
    local_id: String,
    room: Option<Room<E::Instant>>,
}

impl<E: Environment> Session<E> {
    /// Create a session for a local participant identity.
    pub fn new(env: E, local_id: impl Into<String>) -> Self {
        Self { env, local_id: local_id.into(), room: None }
    }

    /// The local participant identity.
    #[must_use]
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The relay-visible room identifier, if joined.
    #[must_use]
    pub fn storage_id(&self) -> Option<&StorageId> {
        self.room.as_ref().map(|room| &room.storage_id)
    }

    /// Current negotiation state for a peer, if known.
    #[must_use]
    pub fn peer_state(&self, peer: &str) -> Option<PeerState> {
        self.room.as_ref()?.peers.get(peer).map(PeerSession::state)
    }

    /// Join a room: derive the key hierarchy and announce presence.
    ///
    /// Key derivation is deliberately expensive (memory-hard); callers
    /// should run `join` off the media path. Joining while already in
    /// a room leaves the old room first.
    ///
    /// # Errors
    ///
    /// [`SessionError::KeyDerivation`] if the KDF parameters are
    /// rejected. Fatal: surfaces to the user, no weaker fallback.
    pub fn join(
        &mut self,
        room_code: &str,
        pepper: &str,
        kdf: &KdfConfig,
    ) -> Result<Vec<SessionAction>, SessionError> {
        self.leave();

        let storage_id = derive_storage_id(room_code, pepper);
        let master = derive_master_key(room_code, &storage_id, kdf)?;
        let keys = derive_subkeys(&master);
        let signaling = derive_signaling_keys(&keys.signal);

        let channel = SignalingChannel::new(&self.local_id, signaling, keys.meta.clone());

        let mut room = Room {
            storage_id,
            keys,
            channel,
            peers: HashMap::new(),
            retry: RetryQueue::new(RetryConfig::default()),
            files: FileAssembler::new(),
        };

        let presence = SignalMessage::Presence {
            from: self.local_id.clone(),
            ts: self.env.wall_clock_ms(),
        };
        let record = room.channel.publish(&self.env, &presence);

        let actions = vec![
            SessionAction::Subscribe { storage_id: room.storage_id.as_str().to_owned() },
            SessionAction::Publish {
                storage_id: room.storage_id.as_str().to_owned(),
                record,
            },
        ];

        self.room = Some(room);
        Ok(actions)
    }

    /// Leave the room synchronously: peers, pending retries, and
    /// partial file transfers are discarded and key material is
    /// zeroized as the room state drops.
    pub fn leave(&mut self) {
        self.room = None;
    }

    /// Initiate a connection to a peer (initiator path).
    ///
    /// # Errors
    ///
    /// [`SessionError::NotJoined`] outside a room.
    pub fn connect_to_peer(&mut self, peer: &str) -> Result<Vec<SessionAction>, SessionError> {
        let local_id = self.local_id.clone();
        let room = self.room.as_mut().ok_or(SessionError::NotJoined)?;

        let session = room
            .peers
            .entry(peer.to_owned())
            .or_insert_with(|| PeerSession::new(local_id, peer));
        let actions = session.connect();

        Ok(route_peer_actions(&self.env, room, peer, actions))
    }

    /// The driver produced a local session description for a peer.
    pub fn local_description_ready(&mut self, peer: &str, sdp: String) -> Vec<SessionAction> {
        let Some(room) = self.room.as_mut() else {
            return Vec::new();
        };
        let Some(session) = room.peers.get_mut(peer) else {
            tracing::debug!(%peer, "local description for unknown peer");
            return Vec::new();
        };

        let actions = session.local_description_ready(sdp);
        route_peer_actions(&self.env, room, peer, actions)
    }

    /// The driver reported a transport state change for a peer.
    ///
    /// A terminal failure tears the peer down after its single restart
    /// and surfaces one [`Notification::PeerDisconnected`].
    pub fn transport_state(&mut self, peer: &str, state: TransportState) -> Vec<SessionAction> {
        let Some(room) = self.room.as_mut() else {
            return Vec::new();
        };
        let Some(session) = room.peers.get_mut(peer) else {
            return Vec::new();
        };

        let (actions, terminal) = session.transport_state(state);
        let mut out = route_peer_actions(&self.env, room, peer, actions);

        if terminal {
            let error = SessionError::TransportNegotiation { peer: peer.to_owned() };
            tracing::warn!(%error, "tearing down peer session");
            room.peers.remove(peer);
            room.files.drop_peer(peer);
            out.push(SessionAction::Notify(Notification::PeerDisconnected {
                peer: peer.to_owned(),
            }));
        }

        out
    }

    /// The driver discovered a local connectivity candidate; relay it
    /// to the peer.
    pub fn local_candidate(&mut self, peer: &str, candidate: String) -> Vec<SessionAction> {
        let Some(room) = self.room.as_mut() else {
            return Vec::new();
        };
        if !room.peers.contains_key(peer) {
            tracing::debug!(%peer, "local candidate for unknown peer");
            return Vec::new();
        }

        let message = SignalMessage::IceCandidate {
            from: self.local_id.clone(),
            to: peer.to_owned(),
            candidate,
        };
        vec![SessionAction::Publish {
            storage_id: room.storage_id.as_str().to_owned(),
            record: room.channel.publish(&self.env, &message),
        }]
    }

    /// The driver reported a peer's data channel as open. Chat and
    /// file traffic can flow to the peer from here on.
    pub fn channel_open(&mut self, peer: &str) -> Vec<SessionAction> {
        let Some(room) = self.room.as_mut() else {
            return Vec::new();
        };
        let Some(session) = room.peers.get_mut(peer) else {
            return Vec::new();
        };

        session.channel_opened();
        if session.is_channel_open() {
            vec![SessionAction::Notify(Notification::PeerConnected { peer: peer.to_owned() })]
        } else {
            Vec::new()
        }
    }

    /// Process one inbound relay row.
    ///
    /// Rows that fail verification or parsing are dropped (logged by
    /// the channel); the session continues.
    pub fn handle_row(&mut self, row: &str) -> Vec<SessionAction> {
        let local_id = self.local_id.clone();
        let Some(room) = self.room.as_mut() else {
            return Vec::new();
        };

        match room.channel.handle_row(row) {
            Some(Inbound::Signal { from, message }) => match message {
                SignalMessage::Offer { sdp, .. } => {
                    // A terminal session is replaced: the peer is
                    // renegotiating from scratch.
                    let session = room
                        .peers
                        .entry(from.clone())
                        .and_modify(|existing| {
                            if existing.is_terminal() {
                                *existing = PeerSession::new(local_id.as_str(), from.as_str());
                            }
                        })
                        .or_insert_with(|| PeerSession::new(local_id.as_str(), from.as_str()));

                    let actions = session.handle_offer(sdp);
                    route_peer_actions(&self.env, room, &from, actions)
                }
                SignalMessage::Answer { sdp, .. } => {
                    let Some(session) = room.peers.get_mut(&from) else {
                        tracing::debug!(peer = %from, "answer from unknown peer");
                        return Vec::new();
                    };
                    let actions = session.handle_answer(sdp);
                    route_peer_actions(&self.env, room, &from, actions)
                }
                SignalMessage::IceCandidate { candidate, .. } => {
                    let session = room
                        .peers
                        .entry(from.clone())
                        .or_insert_with(|| PeerSession::new(local_id.as_str(), from.as_str()));
                    let actions = session.handle_candidate(candidate);
                    route_peer_actions(&self.env, room, &from, actions)
                }
                SignalMessage::Presence { ts, .. } => {
                    let mut out = Vec::new();

                    // A newcomer announces itself; existing members
                    // initiate. The newcomer never initiates, so the
                    // two sides cannot glare.
                    if !room.peers.contains_key(&from) {
                        let session = room
                            .peers
                            .entry(from.clone())
                            .or_insert_with(|| PeerSession::new(local_id.as_str(), from.as_str()));
                        let actions = session.connect();
                        out = route_peer_actions(&self.env, room, &from, actions);
                    }

                    out.push(SessionAction::Notify(Notification::PresenceSeen {
                        peer: from,
                        ts,
                    }));
                    out
                }
            },
            Some(Inbound::Admin { from, action }) => {
                tracing::debug!(%from, ?action, "applying admin action");
                self.apply_admin(action)
            }
            None => Vec::new(),
        }
    }

    /// Send a chat message to every connected peer.
    ///
    /// Double wrap: the body seals under the `chat` key, the result
    /// re-seals under the `auth` key. The two layers must both verify
    /// on the receiving side before any text surfaces.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotJoined`] outside a room.
    pub fn send_chat(&mut self, text: &str) -> Result<Vec<SessionAction>, SessionError> {
        let body = ChatBody {
            from: self.local_id.clone(),
            text: text.to_owned(),
            ts: self.env.wall_clock_ms(),
        };
        let room = self.room.as_mut().ok_or(SessionError::NotJoined)?;

        let inner = seal(&room.keys.chat, &body.encode(), fresh_iv(&self.env));
        let outer_plain = MessageRecord { enc: inner.into() }.encode();
        let outer = seal(&room.keys.auth, &outer_plain, fresh_iv(&self.env));
        let payload = PeerFrame::Chat { enc: outer.into() }.encode();

        Ok(broadcast(room, payload))
    }

    /// Send a recorded voice note to every connected peer.
    ///
    /// The audio blob seals whole under the `chat` key; the mime tag
    /// rides alongside in the clear so receivers can play the
    /// decrypted blob back without sniffing the container.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotJoined`] outside a room.
    pub fn send_voice(
        &mut self,
        mime: &str,
        audio: &[u8],
    ) -> Result<Vec<SessionAction>, SessionError> {
        let room = self.room.as_mut().ok_or(SessionError::NotJoined)?;

        let sealed = seal(&room.keys.chat, audio, fresh_iv(&self.env));
        let payload = PeerFrame::Voice { mime: mime.to_owned(), enc: sealed.into() }.encode();

        Ok(broadcast(room, payload))
    }

    /// Send a file to every connected peer in sealed chunks.
    ///
    /// Returns the generated transfer id along with the actions.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotJoined`] outside a room.
    pub fn send_file(&mut self, data: &[u8]) -> Result<(String, Vec<SessionAction>), SessionError> {
        let file_id = format!("{:016x}", self.env.random_u64());
        let room = self.room.as_mut().ok_or(SessionError::NotJoined)?;

        let mut actions = Vec::new();
        for chunk in chunk_file(&file_id, data) {
            let sealed = seal(&room.keys.file, &chunk.encode(), fresh_iv(&self.env));
            let payload = PeerFrame::File { enc: sealed.into() }.encode();
            actions.extend(broadcast(room, payload));
        }

        Ok((file_id, actions))
    }

    /// Process one payload received over a peer data channel.
    ///
    /// # Errors
    ///
    /// [`SessionError::Authentication`] if either wrap fails to
    /// verify, [`SessionError::MalformedMessage`] on a parse failure.
    /// The payload is dropped either way; callers log and continue.
    pub fn handle_peer_payload(
        &mut self,
        peer: &str,
        payload: &[u8],
    ) -> Result<Vec<SessionAction>, SessionError> {
        let room = self.room.as_mut().ok_or(SessionError::NotJoined)?;

        match PeerFrame::decode(payload)? {
            PeerFrame::Chat { enc } => {
                let outer_plain = open(&room.keys.auth, &enc.into_envelope()?)?;
                let record = MessageRecord::decode(&outer_plain)?;
                let inner_plain = open(&room.keys.chat, &record.enc.into_envelope()?)?;
                let body = ChatBody::decode(&inner_plain)?;

                Ok(vec![SessionAction::Notify(Notification::ChatReceived {
                    from: body.from,
                    text: body.text,
                    ts: body.ts,
                })])
            }
            PeerFrame::Voice { mime, enc } => {
                let audio = open(&room.keys.chat, &enc.into_envelope()?)?;

                Ok(vec![SessionAction::Notify(Notification::VoiceReceived {
                    from: peer.to_owned(),
                    mime,
                    data: audio,
                })])
            }
            PeerFrame::File { enc } => {
                let plain = open(&room.keys.file, &enc.into_envelope()?)?;
                let chunk = FileChunk::decode(&plain)?;
                let file_id = chunk.file_id.clone();

                Ok(match room.files.insert(peer, chunk) {
                    Some(data) => vec![SessionAction::Notify(Notification::FileReceived {
                        from: peer.to_owned(),
                        file_id,
                        data,
                    })],
                    None => Vec::new(),
                })
            }
        }
    }

    /// Publish a rename admin action.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotJoined`] outside a room.
    pub fn rename_peer(
        &mut self,
        target: &str,
        name: &str,
    ) -> Result<Vec<SessionAction>, SessionError> {
        self.publish_admin(AdminAction::Rename {
            target: target.to_owned(),
            name: name.to_owned(),
        })
    }

    /// Publish a kick admin action.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotJoined`] outside a room.
    pub fn kick(&mut self, target: &str) -> Result<Vec<SessionAction>, SessionError> {
        self.publish_admin(AdminAction::Kick { target: target.to_owned() })
    }

    /// Rotate the room keys: derive successors from the current
    /// signaling key with a fresh salt, apply them locally, and
    /// publish the salt so every peer rotates to the same keys.
    ///
    /// The pre-rotation signaling keys stay usable for inbound rows
    /// until [`Session::retire_previous_keys`] is called.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotJoined`] outside a room.
    pub fn rotate_keys(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        let mut salt = [0u8; 32];
        self.env.random_bytes(&mut salt);

        // The salt announcement must be sealed and signed under the
        // OUTGOING keys: peers can only verify it with what they hold
        // now. Only then do we rotate locally.
        let actions = self.publish_admin(AdminAction::Rotate { salt: salt.to_vec() })?;

        let room = self.room.as_mut().ok_or(SessionError::NotJoined)?;
        apply_rotation_salt(room, &salt);

        Ok(actions)
    }

    /// Drop the retained pre-rotation signaling keys once every peer
    /// has confirmed the rotation.
    pub fn retire_previous_keys(&mut self) {
        if let Some(room) = self.room.as_mut() {
            room.channel.retire_previous_keys();
        }
    }

    /// Driver feedback for a [`SessionAction::Publish`].
    ///
    /// Failed publishes enter the retry queue silently; the failure
    /// only surfaces as [`Notification::DeliveryFailed`] once the
    /// attempt bound is exhausted.
    pub fn publish_outcome(
        &mut self,
        record: &str,
        delivered: bool,
        now: E::Instant,
    ) -> Vec<SessionAction> {
        let Some(room) = self.room.as_mut() else {
            return Vec::new();
        };

        if room.retry.in_flight_record() == Some(record) {
            if delivered {
                room.retry.report_success();
            } else if room.retry.report_failure(now).is_some() {
                let error = SessionError::RelayUnavailable {
                    attempts: room.retry.config().max_attempts + 1,
                };
                tracing::warn!(%error, "signaling message dropped");
                return vec![SessionAction::Notify(Notification::DeliveryFailed)];
            }
            return Vec::new();
        }

        if !delivered {
            room.retry.enqueue(record.to_owned(), now);
        }
        Vec::new()
    }

    /// Drive the retry queue; call periodically.
    pub fn tick(&mut self, now: E::Instant) -> Vec<SessionAction> {
        let Some(room) = self.room.as_mut() else {
            return Vec::new();
        };

        match room.retry.tick(now) {
            Some(record) => vec![SessionAction::Publish {
                storage_id: room.storage_id.as_str().to_owned(),
                record,
            }],
            None => Vec::new(),
        }
    }

    fn publish_admin(&mut self, action: AdminAction) -> Result<Vec<SessionAction>, SessionError> {
        let room = self.room.as_mut().ok_or(SessionError::NotJoined)?;
        let record = room.channel.publish_admin(&self.env, &action);

        Ok(vec![SessionAction::Publish {
            storage_id: room.storage_id.as_str().to_owned(),
            record,
        }])
    }

    fn apply_admin(&mut self, action: AdminAction) -> Vec<SessionAction> {
        match action {
            AdminAction::Rename { target, name } => {
                vec![SessionAction::Notify(Notification::Renamed { target, name })]
            }
            AdminAction::Kick { target } => {
                if target == self.local_id {
                    // Kicked: tear the whole session down immediately.
                    self.leave();
                    return vec![SessionAction::Notify(Notification::Kicked)];
                }

                let Some(room) = self.room.as_mut() else {
                    return Vec::new();
                };
                if let Some(mut session) = room.peers.remove(&target) {
                    session.close();
                    room.files.drop_peer(&target);
                    return vec![SessionAction::Notify(Notification::PeerDisconnected {
                        peer: target,
                    })];
                }
                Vec::new()
            }
            AdminAction::Rotate { salt } => {
                if let Some(room) = self.room.as_mut() {
                    apply_rotation_salt(room, &salt);
                }
                Vec::new()
            }
        }
    }
}

/// Derive and swap in successor keys for a rotation salt.
fn apply_rotation_salt<I>(room: &mut Room<I>, salt: &[u8])
where
    I: Copy + Ord + std::ops::Add<std::time::Duration, Output = I> + std::ops::Sub<Output = std::time::Duration>,
{
    let rotated = rotate(&room.keys.signal, salt);
    room.keys.apply_rotation(&rotated);
    room.channel.apply_rotation(SignalingKeys {
        aes: rotated.signal.clone(),
        hmac: rotated.signal_hmac.clone(),
    });
}

/// Convert peer actions into session actions, turning outbound
/// signaling into sealed relay publishes.
fn route_peer_actions<E, I>(
    env: &E,
    room: &mut Room<I>,
    peer: &str,
    actions: Vec<PeerAction>,
) -> Vec<SessionAction>
where
    E: Environment,
    I: Copy + Ord + std::ops::Add<std::time::Duration, Output = I> + std::ops::Sub<Output = std::time::Duration>,
{
    actions
        .into_iter()
        .map(|action| match action {
            PeerAction::SendSignal(message) => SessionAction::Publish {
                storage_id: room.storage_id.as_str().to_owned(),
                record: room.channel.publish(env, &message),
            },
            other => SessionAction::Peer { peer: peer.to_owned(), action: other },
        })
        .collect()
}

/// Fan a payload out to every connected peer's data channel.
fn broadcast<I>(room: &Room<I>, payload: Vec<u8>) -> Vec<SessionAction>
where
    I: Copy + Ord + std::ops::Add<std::time::Duration, Output = I> + std::ops::Sub<Output = std::time::Duration>,
{
    room.peers
        .iter()
        .filter(|(_, session)| session.is_channel_open())
        .map(|(peer, _)| SessionAction::SendPeer { peer: peer.clone(), payload: payload.clone() })
        .collect()
}

fn fresh_iv<E: Environment>(env: &E) -> Iv {
    let mut iv = [0u8; IV_SIZE];
    env.random_bytes(&mut iv);
    Iv::from_bytes(iv)
}
