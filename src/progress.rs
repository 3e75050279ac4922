//! The progress sink. The sync engine and the processing stage report everything a user should
//! see through an ordered, unbounded channel so that they never block on whoever is reading.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// How a message should be presented.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Success,
    Heading,
}

serde_plain::derive_display_from_serialize!(Severity);
serde_plain::derive_fromstr_from_deserialize!(Severity);

/// One line of progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub severity: Severity,
}

impl Message {
    /// Write the message to the tracing subscriber at a level matching its severity.
    pub fn log(&self) {
        match self.severity {
            Severity::Debug => debug!("{}", self.text),
            Severity::Info | Severity::Success | Severity::Heading => info!("{}", self.text),
            Severity::Warn => warn!("{}", self.text),
            Severity::Error => error!("{}", self.text),
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity, self.text)
    }
}

/// The sending half of the progress channel. Cloning it is cheap and every clone feeds the same
/// receiver, in order.
#[derive(Debug, Clone)]
pub struct Progress {
    tx: Option<UnboundedSender<Message>>,
}

impl Progress {
    /// Creates a connected sender and receiver.
    pub fn channel() -> (Self, UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn null() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, severity: Severity, text: impl Into<String>) {
        if let Some(tx) = &self.tx {
            // A receiver that has gone away is not our problem.
            let _ = tx.send(Message {
                text: text.into(),
                severity,
            });
        }
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.send(Severity::Debug, text)
    }

    pub fn info(&self, text: impl Into<String>) {
        self.send(Severity::Info, text)
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.send(Severity::Warn, text)
    }

    pub fn error(&self, text: impl Into<String>) {
        self.send(Severity::Error, text)
    }

    pub fn success(&self, text: impl Into<String>) {
        self.send(Severity::Success, text)
    }

    pub fn heading(&self, text: impl Into<String>) {
        self.send(Severity::Heading, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_preserves_order() {
        let (progress, mut rx) = Progress::channel();
        progress.heading("one");
        progress.clone().warn("two");
        progress.info("three");
        drop(progress);

        let mut got = Vec::new();
        while let Ok(m) = rx.try_recv() {
            got.push((m.severity, m.text));
        }
        assert_eq!(
            vec![
                (Severity::Heading, "one".to_string()),
                (Severity::Warn, "two".to_string()),
                (Severity::Info, "three".to_string()),
            ],
            got
        );
    }

    #[test]
    fn test_send_after_receiver_dropped_is_ignored() {
        let (progress, rx) = Progress::channel();
        drop(rx);
        progress.error("nobody is listening");
        Progress::null().info("nor here");
    }

    #[test]
    fn test_severity_display() {
        assert_eq!("warn", Severity::Warn.to_string());
        assert_eq!(
            "[success] done",
            Message {
                text: "done".into(),
                severity: Severity::Success
            }
            .to_string()
        );
    }
}
