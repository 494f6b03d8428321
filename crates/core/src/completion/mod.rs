//! One-shot "sequence finished" notification from a sequence to its host.
//!
//! The signal carries nothing but a token naming the sequence. Across an
//! isolation boundary it travels as a small JSON envelope over a channel;
//! in-process it can be a plain callback.

use std::{
    collections::HashSet,
    fmt,
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
};

use serde::{Deserialize, Serialize};

use crate::{Result, SequenceError};

pub const COMPLETE_KIND: &str = "sequence-complete";

/// Wire form of a completion message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEnvelope {
    pub kind: String,
    pub token: String,
}

impl CompletionEnvelope {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            kind: COMPLETE_KIND.to_string(),
            token: token.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an envelope, rejecting messages of any other kind.
    pub fn from_json(raw: &str) -> Result<Self> {
        let envelope: Self = serde_json::from_str(raw)?;
        if envelope.kind != COMPLETE_KIND {
            return Err(SequenceError::InvalidInput("not a completion message"));
        }
        Ok(envelope)
    }
}

/// Where a fired signal goes.
pub enum CompletionSink {
    Callback(Box<dyn FnMut(&str)>),
    /// Serialised [`CompletionEnvelope`]s for a host on the other side.
    Channel(Sender<String>),
    /// Nobody listens; firing only updates state.
    Discard,
}

impl CompletionSink {
    pub fn callback(f: impl FnMut(&str) + 'static) -> Self {
        Self::Callback(Box::new(f))
    }

    fn deliver(&mut self, token: &str) -> Result<()> {
        match self {
            Self::Callback(f) => f(token),
            Self::Channel(sender) => {
                let message = CompletionEnvelope::new(token).to_json()?;
                sender
                    .send(message)
                    .map_err(|_| SequenceError::msg("completion receiver has gone away"))?;
            }
            Self::Discard => {}
        }
        Ok(())
    }
}

impl fmt::Debug for CompletionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Callback(_) => "Callback",
            Self::Channel(_) => "Channel",
            Self::Discard => "Discard",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Armed,
    Fired,
    /// Torn down before firing; will never fire.
    Disarmed,
}

/// Fires at most once. After [`disarm`](CompletionSignal::disarm) it never
/// fires.
#[derive(Debug)]
pub struct CompletionSignal {
    token: String,
    sink: CompletionSink,
    state: SignalState,
}

impl CompletionSignal {
    pub fn new(token: impl Into<String>, sink: CompletionSink) -> Self {
        Self {
            token: token.into(),
            sink,
            state: SignalState::Armed,
        }
    }

    pub fn callback(token: impl Into<String>, f: impl FnMut(&str) + 'static) -> Self {
        Self::new(token, CompletionSink::callback(f))
    }

    pub fn channel(token: impl Into<String>, sender: Sender<String>) -> Self {
        Self::new(token, CompletionSink::Channel(sender))
    }

    pub fn discard(token: impl Into<String>) -> Self {
        Self::new(token, CompletionSink::Discard)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    /// Renames the token while the signal is still armed.
    pub fn bind_token(&mut self, token: impl Into<String>) {
        if self.state == SignalState::Armed {
            self.token = token.into();
        }
    }

    pub fn has_fired(&self) -> bool {
        self.state == SignalState::Fired
    }

    /// Delivers the token if the signal is still armed. Returns whether this
    /// call fired it. Delivery failures are logged; the signal still counts
    /// as fired.
    pub fn fire(&mut self) -> bool {
        if self.state != SignalState::Armed {
            return false;
        }
        self.state = SignalState::Fired;
        match self.sink.deliver(&self.token) {
            Ok(()) => tracing::info!(token = %self.token, "sequence complete"),
            Err(err) => tracing::warn!(%err, token = %self.token, "completion not delivered"),
        }
        true
    }

    pub fn disarm(&mut self) {
        if self.state == SignalState::Armed {
            self.state = SignalState::Disarmed;
            tracing::debug!(token = %self.token, "completion disarmed");
        }
    }
}

/// Host end of a completion channel. Each token is acknowledged once no
/// matter how often it arrives.
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: Receiver<String>,
    seen: HashSet<String>,
    acknowledged: Vec<String>,
}

impl CompletionReceiver {
    /// A sender for sequences and the receiver the host polls.
    pub fn pair() -> (Sender<String>, Self) {
        let (tx, rx) = mpsc::channel();
        (
            tx,
            Self {
                rx,
                seen: HashSet::new(),
                acknowledged: Vec::new(),
            },
        )
    }

    /// Drains pending messages and returns tokens seen for the first time.
    /// Malformed messages and messages of other kinds are skipped.
    pub fn poll(&mut self) -> Vec<String> {
        let mut fresh = Vec::new();
        loop {
            let raw = match self.rx.try_recv() {
                Ok(raw) => raw,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            let envelope = match CompletionEnvelope::from_json(&raw) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::debug!(%err, "ignoring message");
                    continue;
                }
            };
            if self.seen.insert(envelope.token.clone()) {
                self.acknowledged.push(envelope.token.clone());
                fresh.push(envelope.token);
            } else {
                tracing::debug!(token = %envelope.token, "duplicate completion ignored");
            }
        }
        fresh
    }

    pub fn acknowledged(&self) -> &[String] {
        &self.acknowledged
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[test]
    fn fires_once() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let mut signal = CompletionSignal::callback("buildup-complete", move |token| {
            sink.borrow_mut().push(token.to_string())
        });

        assert!(signal.fire());
        assert!(!signal.fire());
        signal.disarm();
        assert_eq!(signal.state(), SignalState::Fired);
        assert_eq!(*calls.borrow(), vec!["buildup-complete".to_string()]);
    }

    #[test]
    fn disarmed_signal_never_fires() {
        let calls = Rc::new(RefCell::new(0));
        let sink = calls.clone();
        let mut signal = CompletionSignal::callback("cutscene-complete", move |_| *sink.borrow_mut() += 1);

        signal.disarm();
        assert!(!signal.fire());
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn channel_carries_envelope() {
        let (tx, mut receiver) = CompletionReceiver::pair();
        let mut signal = CompletionSignal::channel("reveal-complete", tx);
        signal.fire();

        assert_eq!(receiver.poll(), vec!["reveal-complete".to_string()]);
        assert!(receiver.poll().is_empty());
    }

    #[test]
    fn receiver_acknowledges_duplicates_once() {
        let (tx, mut receiver) = CompletionReceiver::pair();
        let message = CompletionEnvelope::new("buildup-complete").to_json().unwrap();
        tx.send(message.clone()).unwrap();
        tx.send(message).unwrap();
        tx.send(r#"{"kind":"resize","token":"x"}"#.to_string()).unwrap();
        tx.send("not json".to_string()).unwrap();

        assert_eq!(receiver.poll().len(), 1);
        assert_eq!(receiver.acknowledged(), ["buildup-complete".to_string()]);
    }

    #[test]
    fn envelope_shape() {
        let json = CompletionEnvelope::new("t").to_json().unwrap();
        assert_eq!(json, r#"{"kind":"sequence-complete","token":"t"}"#);
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (tx, receiver) = CompletionReceiver::pair();
        drop(receiver);
        let mut signal = CompletionSignal::channel("orphan", tx);
        assert!(signal.fire());
        assert!(signal.has_fired());
    }
}
