//! Mail transport capability and message assembly

mod attachments;
mod errors;
mod message;

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use crate::domain::specification::TransportConfig;

pub use attachments::{Attachments, LoadedAttachment};
pub use errors::{BuildError, SendError, SessionError};
pub use message::{MessageBuilder, TransportMessage};

/// Something that can open a delivery session with a mail server
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The session type this transport opens
    type Session: Session;

    /// Opens a session, connecting and authenticating as configured.
    ///
    /// # Arguments
    /// * `config` - The [`TransportConfig`] from the specification.
    ///
    /// # Returns
    /// An open [`Session`], or a [`SessionError`] if the server could not be reached or refused
    /// the login.
    async fn open(&self, config: &TransportConfig) -> Result<Self::Session, SessionError>;
}

/// An open delivery session, reused for a whole batch
#[async_trait]
pub trait Session: Send + 'static {
    /// Sends one message.
    ///
    /// # Returns
    /// - [`Ok`] once the server has accepted the message.
    /// - [`SendError::Rejected`] if the server refused this message only.
    /// - [`SendError::Session`] if the session can no longer be used.
    async fn send(&mut self, message: &TransportMessage) -> Result<(), SendError>;

    /// Closes the session
    async fn close(&mut self) -> Result<(), SessionError>;
}

#[cfg(test)]
mock! {
    pub Transport {}

    #[async_trait]
    impl Transport for Transport {
        type Session = MockSession;

        async fn open(&self, config: &TransportConfig) -> Result<MockSession, SessionError>;
    }
}

#[cfg(test)]
mock! {
    pub Session {}

    #[async_trait]
    impl Session for Session {
        async fn send(&mut self, message: &TransportMessage) -> Result<(), SendError>;
        async fn close(&mut self) -> Result<(), SessionError>;
    }
}
