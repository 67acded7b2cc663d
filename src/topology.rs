// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Declaration
//!
//! This module declares exchanges, queues and bindings on the broker.
//!
//! The main components are:
//! - `Declarator` trait: the declaration role, substitutable in tests
//! - `AmqpDeclarator`: implementation issuing the declarations on a session
//! - `Topology`: an ordered plan of declarations installed through any
//!   `Declarator`
//!
//! Declarations are idempotent on the broker side: declaring the same name
//! with the same properties again is a no-op. Declaring an existing exchange
//! with other properties is refused with `TopologyConflictError` and the
//! broker closes the session; nothing here tries to reconcile the two.

use crate::{
    channel::Session,
    errors::{is_precondition_failed, AmqpError},
    exchange::{ExchangeDefinition, ExchangeKind},
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
};
use tracing::{debug, error};

/// Declares broker-side routing entities.
///
/// This is the topology role of the access layer. Every declaration is
/// idempotent for identical properties and fails for conflicting ones; no
/// implementation tries to reconcile an existing entity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Declarator: Send + Sync {
    /// Declares the exchange described by `def` with the routing semantics of
    /// `kind`.
    ///
    /// # Parameters
    /// * `def` - Name, flags and arguments of the exchange
    /// * `kind` - Routing semantics requested from the broker
    ///
    /// # Returns
    /// Ok(()) on success, `TopologyConflictError` when the exchange exists with
    /// other properties, or `DeclareExchangeError` for any other failure
    async fn declare_exchange(
        &self,
        def: &ExchangeDefinition,
        kind: ExchangeKind,
    ) -> Result<(), AmqpError>;

    /// Declares the queue described by `def`.
    ///
    /// # Returns
    /// Ok(()) on success or `DeclareQueueError` naming the queue
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    /// Binds a queue to an exchange.
    ///
    /// # Returns
    /// Ok(()) on success or `BindingExchangeToQueueError` naming both ends
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;
}

/// [`Declarator`] issuing declarations on one session.
#[derive(Debug, Clone)]
pub struct AmqpDeclarator {
    session: Session,
}

impl AmqpDeclarator {
    /// Creates a declarator issuing its declarations on `session`.
    pub fn new(session: Session) -> AmqpDeclarator {
        AmqpDeclarator { session }
    }
}

#[async_trait]
impl Declarator for AmqpDeclarator {
    async fn declare_exchange(
        &self,
        def: &ExchangeDefinition,
        kind: ExchangeKind,
    ) -> Result<(), AmqpError> {
        debug!(name = def.name(), kind = kind.as_str(), "declaring exchange");

        match self
            .session
            .channel()
            .exchange_declare(
                def.name(),
                kind.into(),
                ExchangeDeclareOptions {
                    passive: def.is_passive(),
                    durable: def.is_durable(),
                    auto_delete: def.is_auto_delete(),
                    internal: def.is_internal(),
                    nowait: def.is_no_wait(),
                },
                FieldTable::from(def.arguments().clone()),
            )
            .await
        {
            Err(err) if is_precondition_failed(&err) => {
                error!(
                    error = err.to_string(),
                    name = def.name(),
                    "exchange exists with different properties"
                );
                Err(AmqpError::TopologyConflictError {
                    exchange: def.name().to_owned(),
                    cause: err.to_string(),
                })
            }
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name(),
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError {
                    exchange: def.name().to_owned(),
                    cause: err.to_string(),
                })
            }
            _ => {
                debug!("exchange: {} was declared", def.name());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        debug!(name = def.name(), "declaring queue");

        match self
            .session
            .channel()
            .queue_declare(
                def.name(),
                QueueDeclareOptions {
                    passive: def.is_passive(),
                    durable: def.is_durable(),
                    exclusive: def.is_exclusive(),
                    auto_delete: def.is_auto_delete(),
                    nowait: def.is_no_wait(),
                },
                FieldTable::from(def.arguments().clone()),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name(),
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError {
                    queue: def.name().to_owned(),
                    cause: err.to_string(),
                })
            }
            _ => {
                debug!("queue: {} was declared", def.name());
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            binding.queue(),
            binding.exchange(),
            binding.routing_key()
        );

        self.session
            .channel()
            .queue_bind(
                binding.queue(),
                binding.exchange(),
                binding.routing_key(),
                QueueBindOptions { nowait: false },
                FieldTable::from(binding.arguments().clone()),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to bind queue to exchange");
                AmqpError::BindingExchangeToQueueError {
                    exchange: binding.exchange().to_owned(),
                    queue: binding.queue().to_owned(),
                    cause: err.to_string(),
                }
            })
    }
}

/// An ordered plan of declarations.
///
/// `install` declares every exchange, then every queue, then every binding,
/// each group in insertion order, and stops at the first failure.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    exchanges: Vec<(ExchangeDefinition, ExchangeKind)>,
    queues: Vec<QueueDefinition>,
    bindings: Vec<QueueBinding>,
}

impl Topology {
    /// Creates an empty plan.
    pub fn new() -> Topology {
        Topology::default()
    }

    /// Adds an exchange declaration to the plan.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exchange(mut self, def: ExchangeDefinition, kind: ExchangeKind) -> Self {
        self.exchanges.push((def, kind));
        self
    }

    /// Adds a queue declaration to the plan.
    pub fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    /// Adds a queue-to-exchange binding to the plan.
    pub fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Installs the plan through `declarator`.
    ///
    /// # Returns
    /// Ok(()) once everything is declared, or the first error met
    pub async fn install<D>(&self, declarator: &D) -> Result<(), AmqpError>
    where
        D: Declarator + ?Sized,
    {
        for (def, kind) in &self.exchanges {
            declarator.declare_exchange(def, *kind).await?;
        }

        for def in &self.queues {
            declarator.declare_queue(def).await?;
        }

        for binding in &self.bindings {
            declarator.bind_queue(binding).await?;
        }

        debug!(
            exchanges = self.exchanges.len(),
            queues = self.queues.len(),
            bindings = self.bindings.len(),
            "topology installed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{predicate::eq, Sequence};

    fn events() -> ExchangeDefinition {
        ExchangeDefinition::builder("events").build().unwrap()
    }

    fn events_queue() -> QueueDefinition {
        QueueDefinition::builder("events.q").build().unwrap()
    }

    fn events_binding() -> QueueBinding {
        QueueBinding::builder("events.q", "events").build().unwrap()
    }

    #[tokio::test]
    async fn installs_exchanges_then_queues_then_bindings() {
        let mut declarator = MockDeclarator::new();
        let mut seq = Sequence::new();

        declarator
            .expect_declare_exchange()
            .withf(|def, kind| def.name() == "events" && *kind == ExchangeKind::Fanout)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        declarator
            .expect_declare_exchange()
            .withf(|def, kind| def.name() == "audit" && *kind == ExchangeKind::Headers)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        declarator
            .expect_declare_queue()
            .with(eq(events_queue()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        declarator
            .expect_bind_queue()
            .with(eq(events_binding()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let topology = Topology::new()
            .queue(events_queue())
            .queue_binding(events_binding())
            .exchange(events(), ExchangeKind::Fanout)
            .exchange(
                ExchangeDefinition::builder("audit").build().unwrap(),
                ExchangeKind::Headers,
            );

        assert_eq!(topology.install(&declarator).await, Ok(()));
    }

    #[tokio::test]
    async fn stops_at_the_first_conflict() {
        let mut declarator = MockDeclarator::new();

        declarator.expect_declare_exchange().times(1).returning(|def, _| {
            Err(AmqpError::TopologyConflictError {
                exchange: def.name().to_owned(),
                cause: "PRECONDITION_FAILED".to_owned(),
            })
        });
        declarator.expect_declare_queue().never();
        declarator.expect_bind_queue().never();

        let topology = Topology::new()
            .exchange(events(), ExchangeKind::Direct)
            .exchange(
                ExchangeDefinition::builder("other").build().unwrap(),
                ExchangeKind::Topic,
            )
            .queue(events_queue())
            .queue_binding(events_binding());

        let err = topology.install(&declarator).await.unwrap_err();
        assert_eq!(
            err,
            AmqpError::TopologyConflictError {
                exchange: "events".to_owned(),
                cause: "PRECONDITION_FAILED".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn binding_failure_is_propagated() {
        let mut declarator = MockDeclarator::new();
        declarator.expect_declare_queue().returning(|_| Ok(()));
        declarator.expect_bind_queue().returning(|b| {
            Err(AmqpError::BindingExchangeToQueueError {
                exchange: b.exchange().to_owned(),
                queue: b.queue().to_owned(),
                cause: "NOT_FOUND".to_owned(),
            })
        });

        let topology = Topology::new()
            .queue(events_queue())
            .queue_binding(events_binding());

        assert!(matches!(
            topology.install(&declarator).await,
            Err(AmqpError::BindingExchangeToQueueError { .. })
        ));
    }

    #[tokio::test]
    async fn empty_topology_declares_nothing() {
        let declarator = MockDeclarator::new();
        assert_eq!(Topology::new().install(&declarator).await, Ok(()));
    }

    #[tokio::test]
    async fn installs_through_a_trait_object() {
        let mut declarator = MockDeclarator::new();
        declarator
            .expect_declare_exchange()
            .times(1)
            .returning(|_, _| Ok(()));

        let declarator: Box<dyn Declarator> = Box::new(declarator);
        let topology = Topology::new().exchange(events(), ExchangeKind::Topic);

        assert_eq!(topology.install(declarator.as_ref()).await, Ok(()));
    }
}
