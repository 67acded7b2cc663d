// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::errors::AmqpError;

/// Longest value an AMQP `shortstr` field can carry.
pub(crate) const SHORT_STR_MAX: usize = 255;

pub(crate) fn non_empty(field: &'static str, value: &str) -> Result<(), AmqpError> {
    if value.is_empty() {
        return Err(AmqpError::InvalidDescriptor {
            field,
            reason: "must not be empty".to_owned(),
        });
    }

    Ok(())
}

pub(crate) fn short_str(field: &'static str, value: &str) -> Result<(), AmqpError> {
    if value.len() > SHORT_STR_MAX {
        return Err(AmqpError::InvalidDescriptor {
            field,
            reason: format!(
                "{} bytes exceeds the {} bytes limit",
                value.len(),
                SHORT_STR_MAX
            ),
        });
    }

    Ok(())
}

/// Names of broker resources: non-empty and short enough for the wire.
pub(crate) fn name(field: &'static str, value: &str) -> Result<(), AmqpError> {
    non_empty(field, value)?;
    short_str(field, value)
}
