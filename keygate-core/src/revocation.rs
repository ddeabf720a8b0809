use std::collections::HashSet;

use parking_lot::RwLock;

/// Consulted before any claim check; a revoked subject is refused even if
/// its token is otherwise valid.
pub trait RevocationCheck: Send + Sync {
    fn is_revoked(&self, subject: &str) -> bool;
}

/// In-memory set of revoked subjects, shared between the gate (reader) and
/// whatever administers revocations (writer).
#[derive(Debug, Default)]
pub struct RevocationRegistry {
    revoked: RwLock<HashSet<String>>,
}

impl RevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the subject was not already revoked.
    pub fn revoke(&self, subject: &str) -> bool {
        tracing::debug!(subject = subject, "revoking subject");
        self.revoked.write().insert(subject.to_string())
    }

    /// Returns `true` if the subject was revoked.
    pub fn reinstate(&self, subject: &str) -> bool {
        tracing::debug!(subject = subject, "reinstating subject");
        self.revoked.write().remove(subject)
    }

    pub fn len(&self) -> usize {
        self.revoked.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.read().is_empty()
    }
}

impl RevocationCheck for RevocationRegistry {
    fn is_revoked(&self, subject: &str) -> bool {
        self.revoked.read().contains(subject)
    }
}

impl<S: Into<String>> FromIterator<S> for RevocationRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(subjects: I) -> Self {
        Self {
            revoked: RwLock::new(subjects.into_iter().map(Into::into).collect()),
        }
    }
}
