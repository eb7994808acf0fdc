//! AMQP 1.0 Queue Inspection Library
//!
//! This crate connects to an AMQP 1.0 broker over TLS, either with a client
//! certificate extracted from a PKCS#12 bundle (mutual TLS) or with
//! SASL-PLAIN credentials, opens a bounded-credit receiver on a named queue,
//! pulls a bounded number of messages, renders them as indented JSON, and
//! settles them in bulk (accept or release).
//!
//! # Example
//!
//! ```no_run
//! use amqpeek_core::{Auth, BrokerSession, SessionConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = BrokerSession::new(SessionConfig::default());
//! session
//!     .connect(
//!         "amqps://broker.example.com:5671",
//!         Auth::Plain {
//!             username: "guest".to_string(),
//!             password: "guest".to_string(),
//!         },
//!     )
//!     .await?;
//!
//! session.open_receiver("jobs", 10).await?;
//! session.receive(10).await?;
//! for message in session.messages() {
//!     println!("{}", message.format_json()?);
//! }
//!
//! let report = session.release_all().await;
//! println!("released {} message(s)", report.attempted);
//! session.close().await;
//! # Ok(())
//! # }
//! ```

/// Error types for identity loading and broker operations
pub mod error;

/// PKCS#12 identity loading
pub mod identity;

/// Retrieved messages and JSON payload rendering
pub mod message;

/// Broker session lifecycle and message retrieval
pub mod session;

mod tls;

// Re-export commonly used types for convenience
pub use error::{ConnectError, FormatError, IdentityError, ReceiveError, ReceiverError};
pub use identity::TlsIdentity;
pub use message::{format_message, RetrievedMessage};
pub use session::{Auth, BrokerSession, SessionConfig, SettleFailure, SettleReport};
