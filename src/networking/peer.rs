// Copyright (c) 2026 Bloomlink
// Licensed under the Apache License, Version 2.0

//! Two-party peer channel: role negotiation, framed exchange, diff.
//!
//! Role negotiation is a connect/listen race: dial the peer with a 10 s
//! timeout; on any dial failure bind the listen port and accept exactly one
//! inbound connection. The client sends first in each phase, the server
//! receives first; framing is symmetric so a double-connect still converges.
//!
//! Frames are `u32` big-endian length prefixes followed by one UTF-8 JSON
//! message. A hard frame cap rejects length bombs. All socket awaits race a
//! shutdown channel; cancellation never leaves a task behind.

use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::core::types::{
    CanonicalMap, IntersectionPayload, MatchPair, PeerMessage, TokenPayload,
};

/// Client-side dial timeout before falling back to listening.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single frame; tens of thousands of records fit well below.
const MAX_FRAME_BYTES: usize = 1 << 30;

/// Peer channel errors.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Dial, bind, accept, or socket failure.
    #[error("network: {0}")]
    Network(#[from] io::Error),
    /// Peer announced a frame beyond the cap.
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
    /// Frame body is not a valid message.
    #[error("frame: {0}")]
    Frame(#[from] serde_json::Error),
    /// Peer closed the connection mid-exchange.
    #[error("peer closed the connection mid-exchange")]
    Eof,
    /// Wrong message type for the current phase.
    #[error("unexpected {got:?} message during {phase}")]
    UnexpectedType {
        /// Phase in progress.
        phase: &'static str,
        /// Received message type.
        got: &'static str,
    },
    /// Caller-initiated shutdown.
    #[error("canceled")]
    Canceled,
}

/// Which side acts first. Labels ordering only; framing is symmetric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Dialed successfully; sends first.
    Client,
    /// Accepted the connection; receives first.
    Server,
}

/// Fresh shutdown channel; set the sender to `true` to cancel the session.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once shutdown is requested; pends forever if it never can be.
async fn canceled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without signaling: cancellation can no longer occur.
            std::future::pending::<()>().await;
        }
    }
}

fn map_eof(e: io::Error) -> PeerError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        PeerError::Eof
    } else {
        PeerError::Network(e)
    }
}

/// One established linkage connection.
pub struct PeerChannel {
    stream: TcpStream,
    role: Role,
    shutdown: watch::Receiver<bool>,
}

impl PeerChannel {
    /// Connect/listen race against `peer_host:peer_port` / `listen_port`.
    pub async fn establish(
        peer_host: &str,
        peer_port: u16,
        listen_port: u16,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Self, PeerError> {
        let addr = format!("{peer_host}:{peer_port}");
        let dialed = tokio::select! {
            _ = canceled(&mut shutdown) => return Err(PeerError::Canceled),
            res = timeout(DIAL_TIMEOUT, TcpStream::connect(addr.as_str())) => res,
        };

        if let Ok(Ok(stream)) = dialed {
            info!(peer = %addr, "dialed peer, acting as client");
            return Ok(Self { stream, role: Role::Client, shutdown });
        }

        // Dial failed or timed out: we are the server. Accept exactly one
        // inbound connection; no timeout here, the shutdown channel is the
        // caller's lever.
        let listener = TcpListener::bind(("0.0.0.0", listen_port)).await?;
        info!(port = listen_port, "dial failed, listening for peer");
        let (stream, remote) = tokio::select! {
            _ = canceled(&mut shutdown) => return Err(PeerError::Canceled),
            res = listener.accept() => res?,
        };
        info!(%remote, "accepted peer connection, acting as server");
        Ok(Self { stream, role: Role::Server, shutdown })
    }

    /// Wrap an already-connected socket (tests, explicit-role deployments).
    pub fn from_stream(stream: TcpStream, role: Role, shutdown: watch::Receiver<bool>) -> Self {
        Self { stream, role, shutdown }
    }

    /// Negotiated role.
    pub fn role(&self) -> Role {
        self.role
    }

    async fn send_inner<T: Serialize>(stream: &mut TcpStream, msg: &T) -> Result<(), PeerError> {
        let body = serde_json::to_vec(msg)?;
        if body.len() > MAX_FRAME_BYTES {
            return Err(PeerError::FrameTooLarge(body.len()));
        }
        stream.write_all(&(body.len() as u32).to_be_bytes()).await?;
        stream.write_all(&body).await?;
        stream.flush().await?;
        debug!(bytes = body.len(), "frame sent");
        Ok(())
    }

    async fn recv_inner(stream: &mut TcpStream) -> Result<PeerMessage, PeerError> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.map_err(map_eof)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(PeerError::FrameTooLarge(len));
        }
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.map_err(map_eof)?;
        debug!(bytes = len, "frame received");
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(&mut self, msg: &PeerMessage) -> Result<(), PeerError> {
        tokio::select! {
            _ = canceled(&mut self.shutdown) => Err(PeerError::Canceled),
            res = Self::send_inner(&mut self.stream, msg) => res,
        }
    }

    async fn recv(&mut self) -> Result<PeerMessage, PeerError> {
        tokio::select! {
            _ = canceled(&mut self.shutdown) => Err(PeerError::Canceled),
            res = Self::recv_inner(&mut self.stream) => res,
        }
    }

    /// Phase 1: symmetric token exchange.
    pub async fn exchange_tokens(&mut self, local: TokenPayload) -> Result<TokenPayload, PeerError> {
        let msg = PeerMessage::Tokens(local);
        match self.role {
            Role::Client => {
                self.send(&msg).await?;
                self.expect_tokens().await
            }
            Role::Server => {
                let got = self.expect_tokens().await?;
                self.send(&msg).await?;
                Ok(got)
            }
        }
    }

    /// Phase 3: symmetric intersection exchange.
    pub async fn exchange_intersection(
        &mut self,
        local: IntersectionPayload,
    ) -> Result<IntersectionPayload, PeerError> {
        let msg = PeerMessage::Intersection(local);
        match self.role {
            Role::Client => {
                self.send(&msg).await?;
                self.expect_intersection().await
            }
            Role::Server => {
                let got = self.expect_intersection().await?;
                self.send(&msg).await?;
                Ok(got)
            }
        }
    }

    async fn expect_tokens(&mut self) -> Result<TokenPayload, PeerError> {
        match self.recv().await? {
            PeerMessage::Tokens(p) => Ok(p),
            other => Err(PeerError::UnexpectedType { phase: "token exchange", got: other.kind() }),
        }
    }

    async fn expect_intersection(&mut self) -> Result<IntersectionPayload, PeerError> {
        match self.recv().await? {
            PeerMessage::Intersection(p) => Ok(p),
            other => Err(PeerError::UnexpectedType {
                phase: "intersection exchange",
                got: other.kind(),
            }),
        }
    }
}

/// Phase 4 cross-verification result over canonical pair keys.
#[derive(Clone, Debug)]
pub struct IntersectionDiff {
    /// Pairs this side found.
    pub local_count: usize,
    /// Pairs the peer reported.
    pub peer_count: usize,
    /// Canonical pairs only this side found.
    pub only_in_local: CanonicalMap<String, MatchPair>,
    /// Canonical pairs only the peer reported.
    pub only_in_peer: CanonicalMap<String, MatchPair>,
}

impl IntersectionDiff {
    /// Both sets agree and counts match: the linkage is confirmed.
    pub fn is_confirmed(&self) -> bool {
        self.only_in_local.is_empty()
            && self.only_in_peer.is_empty()
            && self.local_count == self.peer_count
    }
}

/// Compare both intersections as sets of orientation-free canonical pairs.
pub fn compare_intersections(local: &[MatchPair], peer: &[MatchPair]) -> IntersectionDiff {
    let local_keys: CanonicalMap<String, &MatchPair> =
        local.iter().map(|p| (p.canonical_key(), p)).collect();
    let peer_keys: CanonicalMap<String, &MatchPair> =
        peer.iter().map(|p| (p.canonical_key(), p)).collect();

    let only_in_local = local_keys
        .iter()
        .filter(|(k, _)| !peer_keys.contains_key(*k))
        .map(|(k, p)| (k.clone(), (*p).clone()))
        .collect();
    let only_in_peer = peer_keys
        .iter()
        .filter(|(k, _)| !local_keys.contains_key(*k))
        .map(|(k, p)| (k.clone(), (*p).clone()))
        .collect();

    IntersectionDiff {
        local_count: local.len(),
        peer_count: peer.len(),
        only_in_local,
        only_in_peer,
    }
}
