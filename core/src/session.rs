//! Broker session: connect, open receiver, pull messages, settle in bulk.
//!
//! One [`BrokerSession`] owns at most one connection, one AMQP session, and
//! one receiver at a time. Methods take `&mut self`, so a session has at most
//! one operation in flight; embedders that share a session across tasks wrap
//! it in `Arc<tokio::sync::Mutex<_>>`, which also serializes reconnects
//! against in-flight receives.

use std::time::Duration;

use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::link::receiver::CreditMode;
use fe2o3_amqp::link::DispositionError;
use fe2o3_amqp::sasl_profile::SaslProfile;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::messaging::Body;
use fe2o3_amqp::types::primitives::Value;
use fe2o3_amqp::{Connection, Delivery, Receiver, Session};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConnectError, ReceiveError, ReceiverError};
use crate::identity::TlsIdentity;
use crate::message::RetrievedMessage;
use crate::tls;

/// How the client authenticates to the broker.
pub enum Auth {
    /// Mutual TLS with a client certificate extracted from a PKCS#12 bundle.
    Mutual {
        /// The client certificate and key presented during the handshake.
        identity: TlsIdentity,
        /// Skip server certificate verification (self-signed brokers).
        accept_invalid_certs: bool,
    },
    /// SASL-PLAIN over TLS, server certificate verified against webpki roots.
    Plain {
        /// SASL username.
        username: String,
        /// SASL password.
        password: String,
    },
}

/// Configuration for a [`BrokerSession`].
pub struct SessionConfig {
    /// Prefix for container and link names.
    pub container_name: String,
    /// Deadline for connect, session begin, and receiver attach.
    pub connect_timeout: Duration,
    /// Deadline for each individual message pull.
    pub receive_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            container_name: "amqpeek".to_string(),
            connect_timeout: Duration::from_secs(30),
            receive_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the container name prefix.
    pub fn with_container_name<S: Into<String>>(mut self, name: S) -> Self {
        self.container_name = name.into();
        self
    }

    /// Set the connect/attach deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-message receive deadline.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }
}

/// Outcome of a bulk accept or release pass.
///
/// Individual failures do not abort the pass; they are collected here and the
/// message list is drained either way, so each handle is settled at most once.
#[derive(Debug, Default)]
pub struct SettleReport {
    /// Number of delivery handles the pass attempted to settle.
    pub attempted: usize,
    /// Handles that could not be settled.
    pub failures: Vec<SettleFailure>,
}

impl SettleReport {
    /// Whether every handle settled cleanly.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A single delivery handle that failed to settle.
#[derive(Debug)]
pub struct SettleFailure {
    /// Position of the message in the retrieved list.
    pub index: usize,
    /// The underlying disposition failure.
    pub error: DispositionError,
}

enum SettleMode {
    Accept,
    Release,
}

/// A client session against one AMQP 1.0 broker.
pub struct BrokerSession {
    config: SessionConfig,
    connection: Option<ConnectionHandle<()>>,
    session: Option<SessionHandle<()>>,
    receiver: Option<Receiver>,
    messages: Vec<RetrievedMessage>,
    link_seq: u32,
}

impl BrokerSession {
    /// Creates a disconnected session with the given configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            connection: None,
            session: None,
            receiver: None,
            messages: Vec::new(),
            link_seq: 0,
        }
    }

    /// Whether a broker connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Ordered view of the messages retrieved so far.
    pub fn messages(&self) -> &[RetrievedMessage] {
        &self.messages
    }

    /// Connects to `url` and begins an AMQP session.
    ///
    /// Any previous connection is closed first. Never retries internally;
    /// retry policy belongs to the caller.
    pub async fn connect(&mut self, url: &str, auth: Auth) -> Result<(), ConnectError> {
        self.close().await;

        // fe2o3-amqp builds its default TLS connector from the process-level
        // crypto provider; pin it to ring in case several are compiled in.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let container_id = format!("{}-{}", self.config.container_name, Uuid::new_v4());
        let open = async {
            match auth {
                Auth::Mutual {
                    identity,
                    accept_invalid_certs,
                } => {
                    let connector = tls::build_connector(identity, accept_invalid_certs)?;
                    Connection::builder()
                        .container_id(container_id)
                        .tls_connector(connector)
                        .open(url)
                        .await
                        .map_err(ConnectError::from)
                }
                Auth::Plain { username, password } => {
                    Connection::builder()
                        .container_id(container_id)
                        .sasl_profile(SaslProfile::Plain { username, password })
                        .open(url)
                        .await
                        .map_err(ConnectError::from)
                }
            }
        };
        let mut connection = timeout(self.config.connect_timeout, open)
            .await
            .map_err(|_| ConnectError::Timeout)??;

        let session = match timeout(self.config.connect_timeout, Session::begin(&mut connection))
            .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(error)) => {
                let _ = connection.close().await;
                return Err(error.into());
            }
            Err(_) => {
                let _ = connection.close().await;
                return Err(ConnectError::Timeout);
            }
        };

        info!(url, "connected to broker");
        self.connection = Some(connection);
        self.session = Some(session);
        Ok(())
    }

    /// Opens a receiver on `queue` with `max_credit` link credit.
    ///
    /// At most one receiver is active per connection: a previously open
    /// receiver is closed first, and messages retrieved through it are
    /// dropped since their handles can no longer be settled.
    pub async fn open_receiver(&mut self, queue: &str, max_credit: u32) -> Result<(), ReceiverError> {
        if let Some(prev) = self.receiver.take() {
            if !self.messages.is_empty() {
                warn!(
                    dropped = self.messages.len(),
                    "dropping unsettled messages held by the previous receiver"
                );
                self.messages.clear();
            }
            if let Err(error) = prev.close().await {
                debug!(%error, "failed to close previous receiver");
            }
        }

        let session = self.session.as_mut().ok_or(ReceiverError::NotConnected)?;
        self.link_seq += 1;
        let link_name = format!("{}-receiver-{}", self.config.container_name, self.link_seq);

        let attach = Receiver::attach(session, link_name, queue);
        let mut receiver = timeout(self.config.connect_timeout, attach)
            .await
            .map_err(|_| ReceiverError::Timeout)??;

        receiver.set_credit_mode(CreditMode::Auto(max_credit));
        receiver.set_credit(max_credit).await?;

        debug!(queue, max_credit, "receiver attached");
        self.receiver = Some(receiver);
        Ok(())
    }

    /// Pulls up to `count` messages, one at a time, into the session's
    /// message list and returns how many were pulled.
    ///
    /// `count == 0` returns immediately with no broker round trip. A failed
    /// or timed-out pull aborts the remaining pulls but preserves the
    /// messages already retrieved.
    pub async fn receive(&mut self, count: u32) -> Result<usize, ReceiveError> {
        if count == 0 {
            return Ok(0);
        }
        let Self {
            receiver,
            messages,
            config,
            ..
        } = self;
        let receiver = receiver.as_mut().ok_or(ReceiveError::NoReceiver)?;

        let mut pulled = 0usize;
        while pulled < count as usize {
            let delivery: Delivery<Body<Value>> =
                match timeout(config.receive_timeout, receiver.recv()).await {
                    Ok(Ok(delivery)) => delivery,
                    Ok(Err(source)) => return Err(ReceiveError::Recv { pulled, source }),
                    Err(_) => return Err(ReceiveError::Timeout { pulled }),
                };
            messages.push(RetrievedMessage::new(delivery));
            pulled += 1;
        }
        debug!(pulled, "batch retrieved");
        Ok(pulled)
    }

    /// Accepts every retrieved message, removing them from the queue.
    pub async fn acknowledge_all(&mut self) -> SettleReport {
        self.settle_all(SettleMode::Accept).await
    }

    /// Releases every retrieved message back to the queue for redelivery.
    pub async fn release_all(&mut self) -> SettleReport {
        self.settle_all(SettleMode::Release).await
    }

    async fn settle_all(&mut self, mode: SettleMode) -> SettleReport {
        let messages: Vec<RetrievedMessage> = self.messages.drain(..).collect();
        let mut report = SettleReport {
            attempted: messages.len(),
            failures: Vec::new(),
        };

        let receiver = match self.receiver.as_ref() {
            Some(receiver) => receiver,
            None => {
                if !messages.is_empty() {
                    warn!(
                        dropped = messages.len(),
                        "receiver is gone, unsettled messages dropped"
                    );
                }
                return report;
            }
        };

        for (index, message) in messages.iter().enumerate() {
            let result = match mode {
                SettleMode::Accept => receiver.accept(&message.delivery).await,
                SettleMode::Release => receiver.release(&message.delivery).await,
            };
            if let Err(error) = result {
                warn!(index, %error, "failed to settle message");
                report.failures.push(SettleFailure { index, error });
            }
        }
        report
    }

    /// Closes the receiver, the session, and the connection, in that order.
    ///
    /// Tolerates any of them being already closed or never opened. Retrieved
    /// messages are dropped since their handles die with the receiver.
    pub async fn close(&mut self) {
        self.messages.clear();
        if let Some(receiver) = self.receiver.take() {
            if let Err(error) = receiver.close().await {
                debug!(%error, "receiver close");
            }
        }
        if let Some(mut session) = self.session.take() {
            if let Err(error) = session.end().await {
                debug!(%error, "session end");
            }
        }
        if let Some(mut connection) = self.connection.take() {
            if let Err(error) = connection.close().await {
                debug!(%error, "connection close");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn receive_zero_performs_no_round_trip() {
        // No receiver is attached, yet a zero-count pull succeeds.
        let mut session = BrokerSession::new(SessionConfig::default());
        assert_eq!(session.receive(0).await.unwrap(), 0);
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn receive_without_receiver_fails() {
        let mut session = BrokerSession::new(SessionConfig::default());
        assert!(matches!(
            session.receive(1).await,
            Err(ReceiveError::NoReceiver)
        ));
    }

    #[tokio::test]
    async fn open_receiver_requires_connection() {
        let mut session = BrokerSession::new(SessionConfig::default());
        assert!(matches!(
            session.open_receiver("q1", 10).await,
            Err(ReceiverError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn settle_on_empty_session_is_clean() {
        let mut session = BrokerSession::new(SessionConfig::default());
        let report = session.acknowledge_all().await;
        assert_eq!(report.attempted, 0);
        assert!(report.is_complete());
        assert!(session.messages().is_empty());

        let report = session.release_all().await;
        assert_eq!(report.attempted, 0);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn close_tolerates_disconnected_session() {
        let mut session = BrokerSession::new(SessionConfig::default());
        session.close().await;
        session.close().await;
        assert!(!session.is_connected());
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = SessionConfig::new()
            .with_container_name("probe")
            .with_connect_timeout(Duration::from_secs(5))
            .with_receive_timeout(Duration::from_secs(1));
        assert_eq!(config.container_name, "probe");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.receive_timeout, Duration::from_secs(1));
    }
}
