// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types
//!
//! `AmqpError` covers every failure the access layer reports: local descriptor
//! validation, connection and session establishment, topology declaration,
//! publishing, subscription and delivery acknowledgment. Each variant names the
//! resource involved and keeps the transport cause as text.
//!
//! `OpenError` is the partial-failure shape returned by connectors, which hands
//! a live connection back when only the session could not be opened.

use crate::channel::AmqpConnection;
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use thiserror::Error;

/// Represents errors that can occur during AMQP operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// A descriptor or credential failed local validation
    #[error("invalid {field}: {reason}")]
    InvalidDescriptor { field: &'static str, reason: String },

    /// Error establishing a connection to the broker
    #[error("failure to connect to `{host}`: {cause}")]
    ConnectionError { host: String, cause: String },

    /// Error opening a session on an established connection
    #[error("failure to open a session on `{host}`: {cause}")]
    SessionError { host: String, cause: String },

    /// Error closing a session or a connection
    #[error("failure to close {target}: {cause}")]
    CloseError { target: &'static str, cause: String },

    /// The exchange already exists with different properties
    #[error("exchange `{exchange}` already exists with different properties: {cause}")]
    TopologyConflictError { exchange: String, cause: String },

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{exchange}`: {cause}")]
    DeclareExchangeError { exchange: String, cause: String },

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{queue}`: {cause}")]
    DeclareQueueError { queue: String, cause: String },

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{exchange}` to queue `{queue}`: {cause}")]
    BindingExchangeToQueueError {
        exchange: String,
        queue: String,
        cause: String,
    },

    /// Error publishing a message
    #[error("failure to publish to `{exchange}` with key `{routing_key}`: {cause}")]
    PublishingError {
        exchange: String,
        routing_key: String,
        cause: String,
    },

    /// Error registering a consumer on a queue
    #[error("failure to subscribe to queue `{queue}`: {cause}")]
    SubscriptionError { queue: String, cause: String },

    /// Error acknowledging a message
    #[error("failure to ack message `{delivery_tag}`: {cause}")]
    AckMessageError { delivery_tag: u64, cause: String },

    /// Error negative-acknowledging a message
    #[error("failure to nack message `{delivery_tag}`: {cause}")]
    NackMessageError { delivery_tag: u64, cause: String },

    /// Error rejecting a message
    #[error("failure to reject message `{delivery_tag}`: {cause}")]
    RejectMessageError { delivery_tag: u64, cause: String },
}

/// Failure of [`Connector::open`](crate::channel::Connector::open).
///
/// When the connection itself could not be established nothing is left open.
/// When only the session failed the connection is returned so the caller can
/// retry [`AmqpConnection::open_session`] or close it.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error(transparent)]
    Connection(AmqpError),

    #[error("{error}")]
    Session {
        connection: AmqpConnection,
        error: AmqpError,
    },
}

impl OpenError {
    /// The underlying error, whatever step failed.
    pub fn error(&self) -> &AmqpError {
        match self {
            OpenError::Connection(error) => error,
            OpenError::Session { error, .. } => error,
        }
    }

    /// Takes back the connection left open by a session failure.
    pub fn into_connection(self) -> Option<AmqpConnection> {
        match self {
            OpenError::Connection(_) => None,
            OpenError::Session { connection, .. } => Some(connection),
        }
    }
}

impl From<OpenError> for AmqpError {
    fn from(err: OpenError) -> Self {
        match err {
            OpenError::Connection(error) => error,
            OpenError::Session { error, .. } => error,
        }
    }
}

/// Whether the broker refused a declaration because the resource exists with
/// other properties (reply code 406).
pub(crate) fn is_precondition_failed(err: &lapin::Error) -> bool {
    match err {
        lapin::Error::ProtocolError(amqp) => matches!(
            amqp.kind(),
            AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED)
        ),
        _ => false,
    }
}
