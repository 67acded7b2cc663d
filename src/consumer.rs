// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Consumer
//!
//! This module registers subscriptions on queues and exposes what the broker
//! delivers as a lazy, unbounded [`DeliveryStream`].
//!
//! Registration failures are returned as `SubscriptionError`. Anything that
//! goes wrong afterwards (session or connection closed, broker cancellation)
//! only ends the stream: the caller sees `None` and decides whether to
//! subscribe again. A finished stream never yields again.

use crate::{
    channel::Session,
    errors::AmqpError,
    otel,
    publisher::ContentType,
    queue::SubscriptionDefinition,
};
use async_trait::async_trait;
use futures_util::{
    ready,
    stream::{BoxStream, FusedStream},
    Stream, StreamExt,
};
use lapin::{
    message,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicRejectOptions},
    types::FieldTable,
};
use opentelemetry::Context;
use std::{
    fmt::{self, Display},
    pin::Pin,
    task::{Context as TaskContext, Poll},
};
use tracing::{debug, error, warn};

/// Subscribes to queues.
///
/// This is the consuming role of the access layer. A subscription lives as
/// long as its session; resubscribing means calling `consume` again.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Registers a subscription on an already declared queue.
    ///
    /// # Parameters
    /// * `def` - Queue, consumer tag and acknowledgment mode
    ///
    /// # Returns
    /// The stream of deliveries, or `SubscriptionError` when the broker
    /// refused the registration
    async fn consume(&self, def: &SubscriptionDefinition) -> Result<DeliveryStream, AmqpError>;
}

/// [`Consumer`] registering subscriptions on one session.
#[derive(Debug, Clone)]
pub struct AmqpConsumer {
    session: Session,
}

impl AmqpConsumer {
    /// Creates a consumer registering its subscriptions on `session`.
    pub fn new(session: Session) -> AmqpConsumer {
        AmqpConsumer { session }
    }
}

#[async_trait]
impl Consumer for AmqpConsumer {
    async fn consume(&self, def: &SubscriptionDefinition) -> Result<DeliveryStream, AmqpError> {
        debug!(
            queue = def.queue(),
            tag = def.consumer_tag(),
            "registering consumer"
        );

        let consumer = self
            .session
            .channel()
            .basic_consume(
                def.queue(),
                def.consumer_tag(),
                BasicConsumeOptions {
                    no_local: def.is_no_local(),
                    no_ack: def.is_auto_ack(),
                    exclusive: def.is_exclusive(),
                    nowait: def.is_no_wait(),
                },
                FieldTable::from(def.arguments().clone()),
            )
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    queue = def.queue(),
                    "error to create the consumer"
                );
                AmqpError::SubscriptionError {
                    queue: def.queue().to_owned(),
                    cause: err.to_string(),
                }
            })?;

        debug!(queue = def.queue(), "consumer registered");

        Ok(DeliveryStream::new(def.queue(), consumer.boxed()))
    }
}

/// Deliveries of one subscription, in broker order.
pub struct DeliveryStream {
    queue: String,
    inner: UntilError<BoxStream<'static, Result<message::Delivery, lapin::Error>>>,
}

impl DeliveryStream {
    pub(crate) fn new(
        queue: &str,
        inner: BoxStream<'static, Result<message::Delivery, lapin::Error>>,
    ) -> DeliveryStream {
        DeliveryStream {
            queue: queue.to_owned(),
            inner: UntilError::new(inner),
        }
    }

    /// Queue the stream is subscribed to.
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl Stream for DeliveryStream {
    type Item = Delivery;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Delivery>> {
        let this = self.get_mut();
        let next = ready!(this.inner.poll_next_unpin(cx));
        if next.is_none() {
            debug!(queue = this.queue, "delivery stream ended");
        }
        Poll::Ready(next.map(|inner| Delivery { inner }))
    }
}

impl FusedStream for DeliveryStream {
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

impl fmt::Debug for DeliveryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryStream")
            .field("queue", &self.queue)
            .field("terminated", &self.inner.is_terminated())
            .finish()
    }
}

/// Yields the `Ok` items of a fallible stream and ends at the first error.
pub(crate) struct UntilError<S> {
    inner: S,
    terminated: bool,
}

impl<S> UntilError<S> {
    pub(crate) fn new(inner: S) -> Self {
        UntilError {
            inner,
            terminated: false,
        }
    }
}

impl<S, T, E> Stream for UntilError<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: Display,
{
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        match ready!(this.inner.poll_next_unpin(cx)) {
            Some(Ok(item)) => Poll::Ready(Some(item)),
            Some(Err(err)) => {
                warn!(error = err.to_string(), "subscription failed, ending stream");
                this.terminated = true;
                Poll::Ready(None)
            }
            None => {
                this.terminated = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<S, T, E> FusedStream for UntilError<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: Display,
{
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// One message handed to a subscriber.
///
/// Without `auto_ack` the message stays unacknowledged on the broker until
/// one of [`ack`](Delivery::ack), [`nack`](Delivery::nack) or
/// [`reject`](Delivery::reject) is called.
pub struct Delivery {
    inner: message::Delivery,
}

impl Delivery {
    /// Message body.
    pub fn payload(&self) -> &[u8] {
        &self.inner.data
    }

    /// Exchange the message was published to, empty for the default one.
    pub fn exchange(&self) -> &str {
        self.inner.exchange.as_str()
    }

    pub fn routing_key(&self) -> &str {
        self.inner.routing_key.as_str()
    }

    /// Session-scoped tag identifying this delivery in acknowledgments.
    pub fn delivery_tag(&self) -> u64 {
        self.inner.delivery_tag
    }

    /// Whether the broker delivered this message before.
    pub fn redelivered(&self) -> bool {
        self.inner.redelivered
    }

    /// The content type when it is one this crate knows about.
    pub fn content_type(&self) -> Option<ContentType> {
        self.inner
            .properties
            .content_type()
            .as_ref()
            .and_then(|mime| ContentType::from_mime(mime.as_str()))
    }

    /// Application defined message type, from the `type` property.
    pub fn message_type(&self) -> Option<&str> {
        self.inner.properties.kind().as_ref().map(|kind| kind.as_str())
    }

    pub fn headers(&self) -> Option<&FieldTable> {
        self.inner.properties.headers().as_ref()
    }

    /// Trace context propagated by the publisher.
    pub fn context(&self) -> Context {
        otel::extract(&self.inner.properties)
    }

    /// Acknowledges the message, removing it from the queue.
    ///
    /// # Returns
    /// Ok(()) on success or `AckMessageError` with the delivery tag and cause
    pub async fn ack(&self) -> Result<(), AmqpError> {
        self.inner
            .ack(BasicAckOptions { multiple: false })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    delivery_tag = self.delivery_tag(),
                    "error whiling ack msg"
                );
                AmqpError::AckMessageError {
                    delivery_tag: self.delivery_tag(),
                    cause: err.to_string(),
                }
            })
    }

    /// Negative acknowledgment; with `requeue` the broker delivers the message
    /// again, otherwise it is dropped or dead-lettered.
    pub async fn nack(&self, requeue: bool) -> Result<(), AmqpError> {
        self.inner
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    delivery_tag = self.delivery_tag(),
                    "error whiling nack msg"
                );
                AmqpError::NackMessageError {
                    delivery_tag: self.delivery_tag(),
                    cause: err.to_string(),
                }
            })
    }

    /// Rejects the message; with `requeue` the broker delivers it again.
    pub async fn reject(&self, requeue: bool) -> Result<(), AmqpError> {
        self.inner
            .reject(BasicRejectOptions { requeue })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    delivery_tag = self.delivery_tag(),
                    "error whiling reject msg"
                );
                AmqpError::RejectMessageError {
                    delivery_tag: self.delivery_tag(),
                    cause: err.to_string(),
                }
            })
    }

    /// Gives back the transport delivery.
    pub fn into_inner(self) -> message::Delivery {
        self.inner
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag())
            .field("exchange", &self.exchange())
            .field("routing_key", &self.routing_key())
            .field("redelivered", &self.redelivered())
            .field("size", &self.inner.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn yields_items_in_order_until_the_source_ends() {
        let source = stream::iter(vec![Ok::<_, String>(1), Ok(2), Ok(3)]);
        let items: Vec<i32> = UntilError::new(source).collect().await;
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn an_error_ends_the_stream_for_good() {
        let source = stream::iter(vec![Ok(1), Ok(2), Err("channel closed"), Ok(3)]);
        let mut until = UntilError::new(source);

        assert_eq!(until.next().await, Some(1));
        assert_eq!(until.next().await, Some(2));
        assert!(!until.is_terminated());
        assert_eq!(until.next().await, None);
        assert!(until.is_terminated());
        assert_eq!(until.next().await, None);
    }

    #[tokio::test]
    async fn end_of_source_is_terminal() {
        let source = stream::iter(Vec::<Result<u8, String>>::new());
        let mut until = UntilError::new(source);
        assert_eq!(until.next().await, None);
        assert!(until.is_terminated());
    }

    #[tokio::test]
    async fn delivery_stream_over_a_failed_source_ends_without_items() {
        let source = stream::iter(vec![Err::<message::Delivery, _>(
            lapin::Error::ChannelsLimitReached,
        )])
        .boxed();
        let mut deliveries = DeliveryStream::new("events.q", source);

        assert_eq!(deliveries.queue(), "events.q");
        assert!(deliveries.next().await.is_none());
        assert!(deliveries.is_terminated());
    }

    #[tokio::test]
    async fn missing_queue_surfaces_as_subscription_error() {
        let mut consumer = MockConsumer::new();
        consumer
            .expect_consume()
            .withf(|def| def.queue() == "missing.q")
            .times(1)
            .returning(|def| {
                Err(AmqpError::SubscriptionError {
                    queue: def.queue().to_owned(),
                    cause: "NOT_FOUND - no queue 'missing.q'".to_owned(),
                })
            });

        let def = SubscriptionDefinition::builder("missing.q").build().unwrap();
        assert!(matches!(
            consumer.consume(&def).await,
            Err(AmqpError::SubscriptionError { .. })
        ));
    }
}
