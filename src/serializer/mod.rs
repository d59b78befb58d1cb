// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Attribute serializer.
//!
//! Turns call arguments and return values into the JSON strings stored in the
//! `arguments` and `result` span attributes. Values describe themselves via
//! `serde::Serialize`; the walk is bounded by [`SerializerLimits`] and the
//! rendered text is capped at `max_output_len`.
//!
//! [`AttributeSerializer::serialize`] never fails and never panics: errors
//! returned by a `Serialize` impl, and panics raised inside one, both become a
//! `<unserializable: ...>` placeholder.

mod value;

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, InstrumentationError, SerializationError};

pub use value::{DEPTH_MARKER, STRING_ELLIPSIS, TRUNCATED_KEY};

/// Suffix appended when the rendered output is cut at `max_output_len`.
pub const OUTPUT_TRUNCATED: &str = "...[truncated]";

/// Bounds applied while serializing a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerializerLimits {
    /// Containers nested deeper than this are replaced by [`DEPTH_MARKER`].
    pub max_depth: usize,

    /// Elements kept per sequence or map.
    pub max_items: usize,

    /// Characters kept per string.
    pub max_string_len: usize,

    /// Bytes kept of the final rendered text. Also the walk budget: once
    /// this many elements and string bytes are visited, the rest is omitted.
    pub max_output_len: usize,
}

impl Default for SerializerLimits {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_items: 64,
            max_string_len: 1024,
            max_output_len: 8192,
        }
    }
}

impl SerializerLimits {
    /// Reject limits that would make every attribute useless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::invalid("serializer.maxDepth", "must be at least 1"));
        }
        if self.max_items == 0 {
            return Err(ConfigError::invalid("serializer.maxItems", "must be at least 1"));
        }
        if self.max_output_len < 64 {
            return Err(ConfigError::invalid(
                "serializer.maxOutputLen",
                "must be at least 64",
            ));
        }
        Ok(())
    }
}

/// Serializes arbitrary values into span-attribute strings.
#[derive(Debug, Clone, Default)]
pub struct AttributeSerializer {
    limits: SerializerLimits,
}

impl AttributeSerializer {
    /// Create a serializer with the given limits.
    pub fn new(limits: SerializerLimits) -> Self {
        Self { limits }
    }

    /// Limits in effect.
    pub fn limits(&self) -> &SerializerLimits {
        &self.limits
    }

    /// Serialize `value`, degrading to a placeholder on any failure.
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> String {
        self.serialize_guarded(value).unwrap_or_else(|err| {
            debug!(target: "endpoint_tracer", error = %err, "Falling back to placeholder attribute");
            self.placeholder(&err)
        })
    }

    /// Serialize `value`, turning panics inside its `Serialize` impl into errors.
    pub fn serialize_guarded<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<String, InstrumentationError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.try_serialize(value)))
            .map_err(|payload| InstrumentationError::from_panic(payload.as_ref()))?
            .map_err(InstrumentationError::from)
    }

    /// Serialize `value` without a panic guard.
    pub fn try_serialize<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<String, SerializationError> {
        let budget = Cell::new(self.limits.max_output_len);
        let tree = value.serialize(value::ValueSerializer::new(&self.limits, &budget))?;
        let text = serde_json::to_string(&tree)?;
        Ok(self.cap_output(text))
    }

    /// Attribute text used when serialization failed.
    pub fn placeholder(&self, err: &InstrumentationError) -> String {
        let reason = err.to_string();
        match value::truncate_chars(&reason, self.limits.max_string_len) {
            serde_json::Value::String(reason) => format!("<unserializable: {}>", reason),
            _ => "<unserializable>".to_string(),
        }
    }

    fn cap_output(&self, mut text: String) -> String {
        let max = self.limits.max_output_len;
        if text.len() <= max {
            return text;
        }
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str(OUTPUT_TRUNCATED);
        text
    }
}
