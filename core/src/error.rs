//! Error types for identity loading and broker operations.

use fe2o3_amqp::connection::OpenError;
use fe2o3_amqp::link::{ReceiverAttachError, RecvError};
use fe2o3_amqp::session::BeginError;
use thiserror::Error;

/// Failure to extract a TLS identity from a PKCS#12 bundle.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The archive could not be decrypted, either because the password is
    /// wrong or because the bytes are not a valid PKCS#12 archive.
    #[error("failed to decrypt PKCS#12 bundle: {0}")]
    Decryption(String),

    /// The bundled private key does not pair with any bundled certificate.
    #[error("private key does not match the bundled certificate")]
    KeyCertMismatch,
}

/// Failure to establish a connection and session with the broker.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// TLS client configuration could not be built.
    #[error("failed to build TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    /// Transport or protocol handshake failure.
    #[error("failed to open connection: {0}")]
    Open(#[from] OpenError),

    /// The connection opened but the AMQP session could not begin.
    #[error("failed to begin session: {0}")]
    Begin(#[from] BeginError),

    /// The configured connect deadline elapsed.
    #[error("connection attempt timed out")]
    Timeout,
}

/// Failure to open a receiver on a queue.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// No broker connection is established.
    #[error("not connected to a broker")]
    NotConnected,

    /// The broker rejected the link attach, e.g. unknown queue.
    #[error("failed to attach receiver: {0}")]
    Attach(#[from] ReceiverAttachError),

    /// Link credit could not be granted on the freshly attached link.
    #[error("failed to grant link credit: {0}")]
    Credit(#[from] fe2o3_amqp::link::IllegalLinkStateError),

    /// The configured attach deadline elapsed.
    #[error("receiver attach timed out")]
    Timeout,
}

/// Failure while pulling a batch of messages.
///
/// Messages pulled before the failure stay in the session's message list.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// No receiver is attached to the session.
    #[error("no receiver is attached")]
    NoReceiver,

    /// An individual receive failed after `pulled` messages were retrieved.
    #[error("receive failed after {pulled} message(s): {source}")]
    Recv {
        /// Messages successfully pulled by this call before the failure.
        pulled: usize,
        /// The underlying link failure.
        #[source]
        source: RecvError,
    },

    /// The per-message receive deadline elapsed after `pulled` messages.
    #[error("receive timed out after {pulled} message(s)")]
    Timeout {
        /// Messages successfully pulled by this call before the timeout.
        pulled: usize,
    },
}

/// Failure to render a message payload as indented JSON.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The message carries no body section.
    #[error("message has no body section")]
    EmptyBody,

    /// The body section is not a data section or a string/binary value.
    #[error("unsupported body section type")]
    UnsupportedBody,
}
