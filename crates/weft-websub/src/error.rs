//! Error types for the protocol layer.

use thiserror::Error;

/// Errors produced by hub, publisher, and subscriber operations.
#[derive(Debug, Error)]
pub enum WebsubError {
    /// The underlying HTTP request failed outright.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The hub refused the subscription request.
    #[error("hub denied subscription to {topic:?} (status {status})")]
    SubscriptionDenied {
        /// Topic the subscription targeted.
        topic: String,
        /// HTTP status the hub answered with.
        status: u16,
    },

    /// The hub refused a publish.
    #[error("hub rejected publish on {topic:?} (status {status})")]
    PublishRejected {
        /// Topic the publish targeted.
        topic: String,
        /// HTTP status the hub answered with.
        status: u16,
    },

    /// An unsubscribe referenced a lease this subscriber does not hold.
    #[error("no active subscription with id {id:?}")]
    UnknownSubscription {
        /// Callback id of the missing lease.
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_subscription_denied() {
        let err = WebsubError::SubscriptionDenied {
            topic: "http://x/e/data".into(),
            status: 403,
        };
        assert_eq!(
            err.to_string(),
            "hub denied subscription to \"http://x/e/data\" (status 403)"
        );
    }

    #[test]
    fn display_unknown_subscription() {
        let err = WebsubError::UnknownSubscription { id: "ab12".into() };
        assert_eq!(err.to_string(), "no active subscription with id \"ab12\"");
    }
}
