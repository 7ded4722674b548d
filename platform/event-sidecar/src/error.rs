use event_bus::{BusError, EnvelopeError};

use crate::config::ConfigError;
use crate::oauth::OAuthError;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("invalid envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("subscription to '{0}' closed")]
    SubscriptionClosed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
