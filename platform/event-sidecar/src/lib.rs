//! Event sidecar
//!
//! Bridges the NATS event bus and plain HTTP services in both directions:
//!
//! - [`Distributor`] subscribes to one topic and POSTs every envelope to a
//!   configured recipient, optionally with an OAuth2 bearer token.
//! - [`Broker`] accepts envelopes over HTTP and publishes each on the subject
//!   named by its `type`.
//!
//! Both sides keep one bus connection per topic in an
//! [`event_bus::ConnectionCache`].

pub mod broker;
pub mod config;
pub mod distributor;
pub mod error;
pub mod middleware;
pub mod oauth;
pub mod routes;
pub mod shutdown;
pub mod telemetry;
pub mod transport;

pub use broker::{router, Broker};
pub use config::{BrokerConfig, ConfigError, DistributorConfig, LogFormat};
pub use distributor::Distributor;
pub use error::SidecarError;
pub use oauth::{OAuthConfig, OAuthError, TokenEndpoint, TokenProvider};
pub use transport::{HttpTransport, TransportError, STRUCTURED_CONTENT_TYPE};
