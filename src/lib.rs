// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Client-side access layer for AMQP 0-9-1 brokers.
//!
//! The crate is split by role: [`channel`] opens connections and sessions,
//! [`topology`] declares exchanges (and the queues they feed), [`publisher`]
//! hands messages to exchanges and [`consumer`] subscribes to queues.

mod otel;
mod validate;

pub mod channel;
pub mod consumer;
pub mod errors;
pub mod exchange;
pub mod publisher;
pub mod queue;
pub mod topology;
