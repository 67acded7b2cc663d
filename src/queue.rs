// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! Builders for the queue side of a topology: queue declarations, queue to
//! exchange bindings and subscriptions consumed by a [`Consumer`].
//!
//! [`Consumer`]: crate::consumer::Consumer

use crate::{errors::AmqpError, validate};
use lapin::types::{AMQPValue, LongInt, ShortString};
use std::collections::BTreeMap;

/// Argument holding the message TTL, in milliseconds
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Argument holding the maximum number of messages in the queue
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Argument holding the maximum size of the queue in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// Definition of a queue to declare.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueDefinition {
    name: String,
    durable: bool,
    auto_delete: bool,
    exclusive: bool,
    passive: bool,
    no_wait: bool,
    arguments: BTreeMap<ShortString, AMQPValue>,
}

impl QueueDefinition {
    /// Starts a definition for the queue `name` with standard settings
    /// (non-durable, shared, kept until deleted).
    pub fn builder(name: impl Into<String>) -> QueueDefinitionBuilder {
        QueueDefinitionBuilder {
            def: QueueDefinition {
                name: name.into(),
                durable: false,
                auto_delete: false,
                exclusive: false,
                passive: false,
                no_wait: false,
                arguments: BTreeMap::default(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// Whether the queue is private to the session that declared it.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_passive(&self) -> bool {
        self.passive
    }

    pub fn is_no_wait(&self) -> bool {
        self.no_wait
    }

    pub fn arguments(&self) -> &BTreeMap<ShortString, AMQPValue> {
        &self.arguments
    }
}

/// Builder for [`QueueDefinition`].
#[derive(Debug, Clone)]
pub struct QueueDefinitionBuilder {
    def: QueueDefinition,
}

impl QueueDefinitionBuilder {
    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.def.durable = true;
        self
    }

    /// Deletes the queue once its last consumer is gone.
    pub fn auto_delete(mut self) -> Self {
        self.def.auto_delete = true;
        self
    }

    /// Makes the queue exclusive to the declaring connection.
    ///
    /// Exclusive queues are deleted when the connection closes.
    pub fn exclusive(mut self) -> Self {
        self.def.exclusive = true;
        self
    }

    /// Only checks that the queue exists, never creates it.
    pub fn passive(mut self) -> Self {
        self.def.passive = true;
        self
    }

    /// Does not wait for the broker to confirm the declaration.
    pub fn no_wait(mut self) -> Self {
        self.def.no_wait = true;
        self
    }

    /// Sets the message Time-To-Live (TTL) for the queue, in milliseconds.
    pub fn ttl(self, ttl: i32) -> Self {
        self.argument(AMQP_HEADERS_MESSAGE_TTL, AMQPValue::LongInt(LongInt::from(ttl)))
    }

    /// Sets the maximum number of messages the queue can hold.
    pub fn max_length(self, max: i32) -> Self {
        self.argument(AMQP_HEADERS_MAX_LENGTH, AMQPValue::LongInt(LongInt::from(max)))
    }

    /// Sets the maximum size in bytes the queue can hold.
    pub fn max_length_bytes(self, max_bytes: i32) -> Self {
        self.argument(
            AMQP_HEADERS_MAX_LENGTH_BYTES,
            AMQPValue::LongInt(LongInt::from(max_bytes)),
        )
    }

    /// Adds a broker-defined queue argument.
    ///
    /// # Parameters
    /// * `key` - The argument name, e.g. `x-queue-type`
    /// * `value` - The argument value
    ///
    /// # Returns
    /// Self for method chaining
    pub fn argument(mut self, key: impl Into<ShortString>, value: AMQPValue) -> Self {
        self.def.arguments.insert(key.into(), value);
        self
    }

    /// # Errors
    /// `AmqpError::InvalidDescriptor` when the name is empty or too long.
    pub fn build(self) -> Result<QueueDefinition, AmqpError> {
        validate::name("queue name", &self.def.name)?;
        Ok(self.def)
    }
}

/// Binding of a queue to an exchange.
///
/// Header exchanges ignore the routing key and match on the binding
/// arguments instead (`x-match` plus the expected header values).
#[derive(Debug, Clone, PartialEq)]
pub struct QueueBinding {
    queue: String,
    exchange: String,
    routing_key: String,
    arguments: BTreeMap<ShortString, AMQPValue>,
}

impl QueueBinding {
    /// Starts a binding of `queue` to `exchange` with an empty routing key
    /// and no arguments.
    ///
    /// # Parameters
    /// * `queue` - The name of the queue to bind
    /// * `exchange` - The name of the exchange feeding it
    pub fn builder(queue: impl Into<String>, exchange: impl Into<String>) -> QueueBindingBuilder {
        QueueBindingBuilder {
            binding: QueueBinding {
                queue: queue.into(),
                exchange: exchange.into(),
                routing_key: String::new(),
                arguments: BTreeMap::default(),
            },
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn arguments(&self) -> &BTreeMap<ShortString, AMQPValue> {
        &self.arguments
    }
}

/// Builder for [`QueueBinding`].
#[derive(Debug, Clone)]
pub struct QueueBindingBuilder {
    binding: QueueBinding,
}

impl QueueBindingBuilder {
    /// Sets the routing key, or pattern for topic exchanges.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.binding.routing_key = key.into();
        self
    }

    /// Adds a binding argument. Header exchanges read `x-match` and the
    /// expected header values from here.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn argument(mut self, key: impl Into<ShortString>, value: AMQPValue) -> Self {
        self.binding.arguments.insert(key.into(), value);
        self
    }

    /// # Errors
    /// `AmqpError::InvalidDescriptor` when either name is empty or too long,
    /// or the routing key is too long.
    pub fn build(self) -> Result<QueueBinding, AmqpError> {
        validate::name("queue name", &self.binding.queue)?;
        validate::name("exchange name", &self.binding.exchange)?;
        validate::short_str("routing key", &self.binding.routing_key)?;
        Ok(self.binding)
    }
}

/// Subscription to an already declared queue.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionDefinition {
    queue: String,
    consumer_tag: String,
    auto_ack: bool,
    exclusive: bool,
    no_local: bool,
    no_wait: bool,
    arguments: BTreeMap<ShortString, AMQPValue>,
}

impl SubscriptionDefinition {
    /// Starts a subscription to `queue` with manual acknowledgment and a
    /// broker-generated consumer tag.
    pub fn builder(queue: impl Into<String>) -> SubscriptionDefinitionBuilder {
        SubscriptionDefinitionBuilder {
            def: SubscriptionDefinition {
                queue: queue.into(),
                consumer_tag: String::new(),
                auto_ack: false,
                exclusive: false,
                no_local: false,
                no_wait: false,
                arguments: BTreeMap::default(),
            },
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn is_auto_ack(&self) -> bool {
        self.auto_ack
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_no_local(&self) -> bool {
        self.no_local
    }

    pub fn is_no_wait(&self) -> bool {
        self.no_wait
    }

    pub fn arguments(&self) -> &BTreeMap<ShortString, AMQPValue> {
        &self.arguments
    }
}

/// Builder for [`SubscriptionDefinition`].
#[derive(Debug, Clone)]
pub struct SubscriptionDefinitionBuilder {
    def: SubscriptionDefinition,
}

impl SubscriptionDefinitionBuilder {
    /// Sets the consumer tag identifying the subscription on its session.
    ///
    /// Left empty, the broker generates one when the subscription is
    /// registered.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.def.consumer_tag = tag.into();
        self
    }

    /// The broker considers deliveries acknowledged as soon as they are sent.
    pub fn auto_ack(mut self) -> Self {
        self.def.auto_ack = true;
        self
    }

    /// Requests to be the only consumer of the queue.
    pub fn exclusive(mut self) -> Self {
        self.def.exclusive = true;
        self
    }

    /// Skips messages published on the same connection.
    pub fn no_local(mut self) -> Self {
        self.def.no_local = true;
        self
    }

    /// Does not wait for the broker to confirm the subscription.
    ///
    /// Requires an explicit [`consumer_tag`](Self::consumer_tag).
    pub fn no_wait(mut self) -> Self {
        self.def.no_wait = true;
        self
    }

    /// Adds a broker-defined consume argument, such as `x-priority`.
    ///
    /// # Parameters
    /// * `key` - The argument name
    /// * `value` - The argument value
    ///
    /// # Returns
    /// Self for method chaining
    pub fn argument(mut self, key: impl Into<ShortString>, value: AMQPValue) -> Self {
        self.def.arguments.insert(key.into(), value);
        self
    }

    /// # Errors
    /// `AmqpError::InvalidDescriptor` when the queue name is empty or too
    /// long, the consumer tag is too long, or `no_wait` is set without a
    /// consumer tag.
    pub fn build(self) -> Result<SubscriptionDefinition, AmqpError> {
        validate::name("queue name", &self.def.queue)?;
        validate::short_str("consumer tag", &self.def.consumer_tag)?;

        // Without a reply the broker-generated tag is never learnt, and
        // deliveries carrying it could not be routed to the stream.
        if self.def.no_wait && self.def.consumer_tag.is_empty() {
            return Err(AmqpError::InvalidDescriptor {
                field: "consumer tag",
                reason: "must be set when no_wait is requested".to_owned(),
            });
        }

        Ok(self.def)
    }
}
