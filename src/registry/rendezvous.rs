//! Session-negotiation rendezvous
//!
//! Each quality exposes two single-slot handoff points so an out-of-band
//! signaling service can bridge a peer-connection setup to that quality: the
//! signaling side posts the remote offer and waits for the local answer, the
//! media side takes the offer and posts the answer.
//!
//! Both slots hold one description. A second write before the first is taken
//! waits for the slot to free up. Closing wakes every waiter: writers get
//! `false`, readers drain what is buffered and then get `None`.

use std::sync::{Mutex, PoisonError};

use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

use super::config::RENDEZVOUS_CAPACITY;

/// Kind of session description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Opaque session description exchanged through the rendezvous
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

struct Slot {
    tx: Mutex<Option<mpsc::Sender<SessionDescription>>>,
    rx: AsyncMutex<mpsc::Receiver<SessionDescription>>,
    closed: watch::Sender<bool>,
}

impl Slot {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(RENDEZVOUS_CAPACITY);
        let (closed, _) = watch::channel(false);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: AsyncMutex::new(rx),
            closed,
        }
    }

    async fn put(&self, desc: SessionDescription) -> bool {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(tx) = tx else {
            return false;
        };

        // A writer parked on a full slot must still wake up on close
        let mut closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => false,
            sent = tx.send(desc) => sent.is_ok(),
        }
    }

    async fn take(&self) -> Option<SessionDescription> {
        let mut rx = self.rx.lock().await;
        let mut closed = self.closed.subscribe();
        tokio::select! {
            biased;
            desc = rx.recv() => return desc,
            _ = wait_closed(&mut closed) => {}
        }

        // Closed: hand over anything still buffered
        rx.try_recv().ok()
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.closed.send_replace(true);
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

/// Offer/answer slot pair owned by a quality
pub struct Rendezvous {
    offers: Slot,
    answers: Slot,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self {
            offers: Slot::new(),
            answers: Slot::new(),
        }
    }

    /// Post a remote offer. Returns `false` once the quality is closed.
    pub async fn send_offer(&self, offer: SessionDescription) -> bool {
        self.offers.put(offer).await
    }

    /// Wait for the next offer. Returns `None` once closed and drained.
    pub async fn recv_offer(&self) -> Option<SessionDescription> {
        self.offers.take().await
    }

    /// Post the local answer. Returns `false` once the quality is closed.
    pub async fn send_answer(&self, answer: SessionDescription) -> bool {
        self.answers.put(answer).await
    }

    /// Wait for the next answer. Returns `None` once closed and drained.
    pub async fn recv_answer(&self) -> Option<SessionDescription> {
        self.answers.take().await
    }

    /// Signaling-side helper: post an offer, then wait for its answer
    pub async fn negotiate(&self, offer: SessionDescription) -> Option<SessionDescription> {
        if !self.send_offer(offer).await {
            return None;
        }
        self.recv_answer().await
    }

    /// Stop accepting descriptions; pending waiters observe `None`
    pub(crate) fn close(&self) {
        self.offers.close();
        self.answers.close();
    }
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Rendezvous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendezvous").finish_non_exhaustive()
    }
}
