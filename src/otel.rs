// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Context Propagation
//!
//! Trace context travels in AMQP message headers: the publisher injects the
//! current context, deliveries extract it back. Both sides go through the
//! globally registered text map propagator, so nothing is propagated until the
//! application installs one.

use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, ShortString},
};
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use std::collections::BTreeMap;
use tracing::error;

/// An adapter for injecting and extracting OpenTelemetry context from AMQP
/// headers.
///
/// This struct implements the OpenTelemetry `Injector` and `Extractor` traits,
/// allowing trace context to be propagated through message headers.
pub(crate) struct HeadersCarrier<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> HeadersCarrier<'a> {
    /// Creates a new HeadersCarrier.
    ///
    /// # Parameters
    /// * `headers` - A mutable reference to the BTreeMap containing AMQP headers
    ///
    /// # Returns
    /// A new HeadersCarrier instance
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for HeadersCarrier<'_> {
    /// Sets a trace context key-value pair in the message headers.
    ///
    /// This method is called by OpenTelemetry when injecting trace context
    /// into outgoing messages. Keys are lowercased and values are stored as
    /// long strings.
    ///
    /// # Parameters
    /// * `key` - The header key
    /// * `value` - The header value
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

impl Extractor for HeadersCarrier<'_> {
    /// Gets a trace context value from the message headers.
    ///
    /// This method is called by OpenTelemetry when extracting trace context
    /// from incoming messages. Only long string headers are considered.
    ///
    /// # Parameters
    /// * `key` - The header key to retrieve
    ///
    /// # Returns
    /// The header value as a string slice, or None if not found
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("Error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    /// Gets all keys in the message headers.
    ///
    /// # Returns
    /// A vector of header keys as string slices
    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Writes `ctx` into `headers`.
pub(crate) fn inject(ctx: &Context, headers: &mut BTreeMap<ShortString, AMQPValue>) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut HeadersCarrier::new(headers))
    });
}

/// Reads the context carried by a delivery's headers.
pub(crate) fn extract(props: &AMQPProperties) -> Context {
    let mut headers = props
        .headers()
        .clone()
        .unwrap_or_default()
        .inner()
        .clone();

    global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeadersCarrier::new(&mut headers))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::LongString;

    #[test]
    fn injected_keys_are_lowercased_long_strings() {
        let mut headers = BTreeMap::new();
        HeadersCarrier::new(&mut headers).set("TraceParent", "00-abc-def-01".to_owned());

        assert_eq!(
            headers.get(&ShortString::from("traceparent")),
            Some(&AMQPValue::LongString(LongString::from("00-abc-def-01")))
        );
    }

    #[test]
    fn extractor_reads_only_long_strings() {
        let mut headers = BTreeMap::new();
        headers.insert(
            ShortString::from("traceparent"),
            AMQPValue::LongString(LongString::from("00-abc-def-01")),
        );
        headers.insert(ShortString::from("retries"), AMQPValue::LongInt(3));

        let carrier = HeadersCarrier::new(&mut headers);
        assert_eq!(carrier.get("traceparent"), Some("00-abc-def-01"));
        assert_eq!(carrier.get("retries"), None);
        assert_eq!(carrier.get("missing"), None);
        assert_eq!(carrier.keys().len(), 2);
    }
}
