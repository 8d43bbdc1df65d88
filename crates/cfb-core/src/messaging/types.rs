/// Limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Longest HTML body one send accepts, in bytes.
    pub max_message_len: usize,
}

/// Why a single delivery attempt failed.
///
/// `permanent` marks failures where retrying on a later tick cannot succeed
/// (bot blocked, chat deleted, user deactivated).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DeliveryFailure {
    pub reason: String,
    pub permanent: bool,
}

impl DeliveryFailure {
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            permanent: true,
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            permanent: false,
        }
    }
}
