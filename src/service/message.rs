// src/service/message.rs

use std::fmt;

use chrono::{SecondsFormat, Utc};

/// Reserved key marking a control message.
pub const CONTROL_KEY: &str = "cmd";
/// Key of the UTC timestamp every message carries.
pub const TIMESTAMP_KEY: &str = "ts";
/// Key carrying the reason of a quit request.
pub const REASON_KEY: &str = "reason";

pub const QUIT: &str = "quit";
pub const HEARTBEAT: &str = "heartbeat";

/// A message for the health-check worker.
///
/// An ordered list of string key/value pairs whose first entry is always the
/// `ts` timestamp (RFC 3339, UTC). Messages with a `cmd` entry are control
/// messages; anything else is domain content the worker logs as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthMessage {
    entries: Vec<(String, String)>,
}

impl HealthMessage {
    /// Timestamped message with the given content. A `ts` entry in `content`
    /// replaces the generated timestamp; later duplicates of a key replace
    /// earlier ones.
    pub fn new<I, K, V>(content: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut msg = Self {
            entries: vec![(TIMESTAMP_KEY.to_string(), now)],
        };
        for (key, value) in content {
            msg.insert(key.into(), value.into());
        }
        msg
    }

    pub fn heartbeat() -> Self {
        Self::new([(CONTROL_KEY, HEARTBEAT)])
    }

    pub fn quit(reason: impl Into<String>) -> Self {
        Self::new([
            (CONTROL_KEY.to_string(), QUIT.to_string()),
            (REASON_KEY.to_string(), reason.into()),
        ])
    }

    fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn timestamp(&self) -> &str {
        self.get(TIMESTAMP_KEY).unwrap_or_default()
    }

    /// Value of the control key, if this is a control message.
    pub fn command(&self) -> Option<&str> {
        self.get(CONTROL_KEY)
    }

    pub fn is_quit(&self) -> bool {
        self.command() == Some(QUIT)
    }

    pub fn is_heartbeat(&self) -> bool {
        self.command() == Some(HEARTBEAT)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for HealthMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value:?}")?;
        }
        f.write_str("}")
    }
}
