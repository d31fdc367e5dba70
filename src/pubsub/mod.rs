//! Event publication and subscription over store channels.

pub mod envelope;
pub mod handler;
pub mod publish;
pub mod subscribe;

use std::borrow::Cow;

pub use envelope::Envelope;
pub use handler::{handler_fn, handler_fn0, BoxError, MessageHandler};
pub use publish::{PublishOutcome, Publisher};
pub use subscribe::{DispatchReport, RegistrationError, SubscribeDispatcher, SubscriberRegistry, SubscriptionHandle};

const LOG_PAYLOAD_MAX_CHARS: usize = 5000;

/// Payload text for logs, cut at 5000 characters.
pub(crate) fn log_text(raw: &str) -> Cow<'_, str> {
    match raw.char_indices().nth(LOG_PAYLOAD_MAX_CHARS) {
        None => Cow::Borrowed(raw),
        Some((cut, _)) => Cow::Owned(format!("{}...(trunc)", &raw[..cut])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_text_truncates_on_char_boundary() {
        assert_eq!(log_text("short"), "short");

        let exact = "é".repeat(LOG_PAYLOAD_MAX_CHARS);
        assert_eq!(log_text(&exact), exact.as_str());

        let long = "é".repeat(LOG_PAYLOAD_MAX_CHARS + 3);
        let cut = log_text(&long);
        assert!(cut.ends_with("...(trunc)"));
        assert_eq!(cut.chars().count(), LOG_PAYLOAD_MAX_CHARS + "...(trunc)".len());
    }
}
