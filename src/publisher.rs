// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! This module provides the message envelope handed to an exchange and the
//! publishing role. Publishing only writes the message to the transport: it
//! does not wait for publisher confirms, does not buffer and does not retry.
//!
//! Routing failures are reported by the broker, not here. A message sent with
//! `mandatory` that cannot be routed comes back as a basic.return, and an
//! undeclared exchange makes the broker close the session, which fails the
//! next call issued on it.

use crate::{channel::Session, errors::AmqpError, otel, validate};
use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties,
};
use opentelemetry::Context;
use std::{collections::BTreeMap, fmt};
use tracing::{debug, error};
use uuid::Uuid;

/// Content type of a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Text,
    Json,
}

impl ContentType {
    /// MIME type sent in the `content-type` property.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text/plain",
            ContentType::Json => "application/json",
        }
    }

    /// Parses a MIME type, ignoring parameters such as `; charset=utf-8`.
    pub fn from_mime(mime: &str) -> Option<ContentType> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("text/plain") {
            Some(ContentType::Text)
        } else if essence.eq_ignore_ascii_case("application/json") {
            Some(ContentType::Json)
        } else {
            None
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message on its way to an exchange.
///
/// Built once per send and consumed by [`Publisher::publish`].
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    exchange: String,
    routing_key: String,
    mandatory: bool,
    immediate: bool,
    content_type: Option<ContentType>,
    message_type: Option<String>,
    headers: BTreeMap<ShortString, AMQPValue>,
    payload: Vec<u8>,
}

impl MessageEnvelope {
    /// Starts an envelope for `exchange`. The empty name targets the broker
    /// default exchange, which routes on the queue name.
    pub fn builder(exchange: impl Into<String>) -> MessageEnvelopeBuilder {
        MessageEnvelopeBuilder {
            envelope: MessageEnvelope {
                exchange: exchange.into(),
                routing_key: String::new(),
                mandatory: false,
                immediate: false,
                content_type: None,
                message_type: None,
                headers: BTreeMap::default(),
                payload: Vec::new(),
            },
        }
    }

    /// Target exchange, empty for the default one.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.content_type
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    /// Caller supplied headers. Trace context is added at publish time and
    /// never shows up here.
    pub fn headers(&self) -> &BTreeMap<ShortString, AMQPValue> {
        &self.headers
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Wire properties of the envelope. `ctx` is injected into the headers
    /// next to the caller supplied ones.
    fn properties(&self, ctx: &Context) -> BasicProperties {
        let mut headers = self.headers.clone();
        otel::inject(ctx, &mut headers);

        let mut properties = BasicProperties::default()
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(FieldTable::from(headers));

        if let Some(content_type) = self.content_type {
            properties = properties.with_content_type(ShortString::from(content_type.as_str()));
        }

        if let Some(message_type) = &self.message_type {
            properties = properties.with_type(ShortString::from(message_type.clone()));
        }

        properties
    }
}

/// Builder for [`MessageEnvelope`].
#[derive(Debug, Clone)]
pub struct MessageEnvelopeBuilder {
    envelope: MessageEnvelope,
}

impl MessageEnvelopeBuilder {
    /// Sets the routing key matched by the exchange.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.envelope.routing_key = key.into();
        self
    }

    /// Asks the broker to return the message when no queue can take it.
    pub fn mandatory(mut self) -> Self {
        self.envelope.mandatory = true;
        self
    }

    /// Asks the broker to return the message when no consumer can take it
    /// right away. RabbitMQ does not implement this flag and closes the
    /// connection when it is set.
    pub fn immediate(mut self) -> Self {
        self.envelope.immediate = true;
        self
    }

    /// Sets the message body and the content type describing it.
    ///
    /// # Parameters
    /// * `content_type` - How the body is encoded
    /// * `payload` - The body bytes
    ///
    /// # Returns
    /// Self for method chaining
    pub fn payload(mut self, content_type: ContentType, payload: impl Into<Vec<u8>>) -> Self {
        self.envelope.content_type = Some(content_type);
        self.envelope.payload = payload.into();
        self
    }

    /// Shorthand for a `text/plain` payload.
    pub fn text(self, payload: impl Into<String>) -> Self {
        self.payload(ContentType::Text, payload.into().into_bytes())
    }

    /// Application defined message type, sent as the `type` property.
    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.envelope.message_type = Some(message_type.into());
        self
    }

    /// Adds an application header. Header exchanges route on these.
    ///
    /// # Parameters
    /// * `key` - The header name
    /// * `value` - The header value
    ///
    /// # Returns
    /// Self for method chaining
    pub fn header(mut self, key: impl Into<ShortString>, value: AMQPValue) -> Self {
        self.envelope.headers.insert(key.into(), value);
        self
    }

    /// # Errors
    /// `AmqpError::InvalidDescriptor` when the exchange name, routing key or
    /// message type do not fit the wire format.
    pub fn build(self) -> Result<MessageEnvelope, AmqpError> {
        validate::short_str("exchange name", &self.envelope.exchange)?;
        validate::short_str("routing key", &self.envelope.routing_key)?;
        if let Some(message_type) = &self.envelope.message_type {
            validate::short_str("message type", message_type)?;
        }
        Ok(self.envelope)
    }
}

/// Hands messages to exchanges.
///
/// This is the publishing role of the access layer. Implementations neither
/// retry nor buffer; a failed publish is reported once to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Hands `envelope` to its exchange.
    ///
    /// # Parameters
    /// * `envelope` - The message, consumed by the call
    ///
    /// # Returns
    /// Ok(()) once the message is written, or `PublishingError` naming the
    /// exchange and routing key
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), AmqpError>;
}

/// [`Publisher`] writing to one session.
#[derive(Debug, Clone)]
pub struct AmqpPublisher {
    session: Session,
}

impl AmqpPublisher {
    /// Creates a publisher writing to `session`.
    pub fn new(session: Session) -> AmqpPublisher {
        AmqpPublisher { session }
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    /// Publishes `envelope`, propagating the current OpenTelemetry context in
    /// its headers. Returns once the transport accepted the frames.
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), AmqpError> {
        let properties = envelope.properties(&Context::current());

        match self
            .session
            .channel()
            .basic_publish(
                envelope.exchange(),
                envelope.routing_key(),
                BasicPublishOptions {
                    mandatory: envelope.is_mandatory(),
                    immediate: envelope.is_immediate(),
                },
                envelope.payload(),
                properties,
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    exchange = envelope.exchange(),
                    routing_key = envelope.routing_key(),
                    "error publishing message"
                );
                Err(AmqpError::PublishingError {
                    exchange: envelope.exchange().to_owned(),
                    routing_key: envelope.routing_key().to_owned(),
                    cause: err.to_string(),
                })
            }
            _ => {
                debug!(exchange = envelope.exchange(), "message published");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::LongString;

    #[test]
    fn content_types_round_trip_through_mime() {
        assert_eq!(ContentType::Text.as_str(), "text/plain");
        assert_eq!(ContentType::Json.as_str(), "application/json");
        assert_eq!(
            ContentType::from_mime("application/json"),
            Some(ContentType::Json)
        );
        assert_eq!(
            ContentType::from_mime("text/plain; charset=utf-8"),
            Some(ContentType::Text)
        );
        assert_eq!(ContentType::from_mime("application/xml"), None);
    }

    #[test]
    fn builder_keeps_flags_and_payload() {
        let envelope = MessageEnvelope::builder("events")
            .routing_key("orders.created")
            .mandatory()
            .payload(ContentType::Json, br#"{"id":1}"#.to_vec())
            .message_type("order-created")
            .build()
            .unwrap();

        assert_eq!(envelope.exchange(), "events");
        assert_eq!(envelope.routing_key(), "orders.created");
        assert!(envelope.is_mandatory());
        assert!(!envelope.is_immediate());
        assert_eq!(envelope.content_type(), Some(ContentType::Json));
        assert_eq!(envelope.message_type(), Some("order-created"));
        assert_eq!(envelope.payload(), br#"{"id":1}"#);
    }

    #[test]
    fn default_exchange_is_allowed() {
        let envelope = MessageEnvelope::builder("")
            .routing_key("events.q")
            .text("hello")
            .build()
            .unwrap();
        assert_eq!(envelope.exchange(), "");
        assert_eq!(envelope.content_type(), Some(ContentType::Text));
    }

    #[test]
    fn oversized_routing_key_is_rejected() {
        let err = MessageEnvelope::builder("events")
            .routing_key("k".repeat(256))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            AmqpError::InvalidDescriptor { field: "routing key", .. }
        ));
    }

    #[test]
    fn properties_carry_content_type_type_and_headers() {
        let envelope = MessageEnvelope::builder("events")
            .text("hello")
            .message_type("greeting")
            .header("tenant", AMQPValue::LongString(LongString::from("acme")))
            .build()
            .unwrap();

        let properties = envelope.properties(&Context::new());

        assert_eq!(
            properties.content_type().as_ref().map(|c| c.as_str()),
            Some("text/plain")
        );
        assert_eq!(
            properties.kind().as_ref().map(|k| k.as_str()),
            Some("greeting")
        );
        let headers = properties.headers().clone().unwrap_or_default();
        assert_eq!(
            headers.inner().get(&ShortString::from("tenant")),
            Some(&AMQPValue::LongString(LongString::from("acme")))
        );
    }

    #[test]
    fn every_publish_gets_a_fresh_message_id() {
        let envelope = MessageEnvelope::builder("events").text("hi").build().unwrap();

        let first = envelope.properties(&Context::new());
        let second = envelope.properties(&Context::new());

        let first = first.message_id().clone().unwrap();
        let second = second.message_id().clone().unwrap();
        assert!(Uuid::parse_str(first.as_str()).is_ok());
        assert_ne!(first, second);
    }

    #[test]
    fn no_content_type_without_payload() {
        let envelope = MessageEnvelope::builder("events").build().unwrap();
        let properties = envelope.properties(&Context::new());
        assert!(properties.content_type().is_none());
        assert!(envelope.payload().is_empty());
    }

    #[tokio::test]
    async fn publisher_double_receives_the_envelope() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|envelope| envelope.exchange() == "events" && envelope.payload() == b"hello")
            .times(1)
            .returning(|_| Ok(()));

        let envelope = MessageEnvelope::builder("events").text("hello").build().unwrap();
        assert_eq!(publisher.publish(envelope).await, Ok(()));
    }
}
