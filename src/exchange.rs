// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! This module provides the routing kinds an exchange can be declared with and
//! a validating builder for exchange definitions. Definitions are immutable
//! once built; the kind is chosen when the exchange is declared.

use crate::{errors::AmqpError, validate};
use lapin::types::{AMQPValue, ShortString};
use std::{collections::BTreeMap, fmt};

/// Routing semantics of an exchange.
///
/// - Direct: exact match of the routing key
/// - Fanout: every bound queue, routing key ignored
/// - Headers: match on message header values, routing key ignored
/// - Topic: wildcard pattern match of the routing key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Headers,
    Topic,
}

impl ExchangeKind {
    /// Name of the kind on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Headers => "headers",
            ExchangeKind::Topic => "topic",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

/// Definition of an exchange, without its kind.
///
/// Two declarations of the same name must carry the same flags and
/// arguments, otherwise the broker refuses the second one.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDefinition {
    name: String,
    durable: bool,
    auto_delete: bool,
    internal: bool,
    no_wait: bool,
    passive: bool,
    arguments: BTreeMap<ShortString, AMQPValue>,
}

impl ExchangeDefinition {
    /// Starts a definition for the exchange `name`, non-durable and kept
    /// until deleted.
    pub fn builder(name: impl Into<String>) -> ExchangeDefinitionBuilder {
        ExchangeDefinitionBuilder {
            def: ExchangeDefinition {
                name: name.into(),
                durable: false,
                auto_delete: false,
                internal: false,
                no_wait: false,
                passive: false,
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

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn is_no_wait(&self) -> bool {
        self.no_wait
    }

    /// Whether the declaration only checks that the exchange exists.
    pub fn is_passive(&self) -> bool {
        self.passive
    }

    /// Extra arguments sent with the declaration, e.g. `alternate-exchange`.
    pub fn arguments(&self) -> &BTreeMap<ShortString, AMQPValue> {
        &self.arguments
    }
}

/// Builder for [`ExchangeDefinition`].
#[derive(Debug, Clone)]
pub struct ExchangeDefinitionBuilder {
    def: ExchangeDefinition,
}

impl ExchangeDefinitionBuilder {
    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.def.durable = true;
        self
    }

    /// Deletes the exchange once its last binding is removed.
    pub fn auto_delete(mut self) -> Self {
        self.def.auto_delete = true;
        self
    }

    /// Makes the exchange internal, preventing direct publishing.
    pub fn internal(mut self) -> Self {
        self.def.internal = true;
        self
    }

    /// Does not wait for the broker to confirm the declaration.
    pub fn no_wait(mut self) -> Self {
        self.def.no_wait = true;
        self
    }

    /// Only checks that the exchange exists, never creates it.
    pub fn passive(mut self) -> Self {
        self.def.passive = true;
        self
    }

    /// Adds a single broker-defined argument.
    pub fn argument(mut self, key: impl Into<ShortString>, value: AMQPValue) -> Self {
        self.def.arguments.insert(key.into(), value);
        self
    }

    /// Replaces every argument.
    pub fn arguments(mut self, arguments: BTreeMap<ShortString, AMQPValue>) -> Self {
        self.def.arguments = arguments;
        self
    }

    /// # Errors
    /// `AmqpError::InvalidDescriptor` when the name is empty or longer than
    /// 255 bytes.
    pub fn build(self) -> Result<ExchangeDefinition, AmqpError> {
        validate::name("exchange name", &self.def.name)?;
        Ok(self.def)
    }
}
