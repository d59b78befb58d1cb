// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bounded `serde::Serializer` producing a `serde_json::Value`.
//!
//! The shape mirrors `serde_json::to_value`, with limits applied while
//! walking the value: nesting depth, items per container and characters per
//! string. One budget is shared by the whole walk; every admitted element and
//! every string byte spends from it. Anything past a limit is replaced by a
//! marker and never visited, so the work done is bounded even for
//! self-referential `Serialize` impls.
//!
//! Nesting counts every level a `Serialize` impl can recurse through,
//! including `Option` and newtype wrappers.

use std::cell::Cell;

use serde::ser::{self, Serialize};
use serde_json::{Map, Number, Value};

use super::SerializerLimits;
use crate::error::SerializationError;

/// Replaces a container nested deeper than `max_depth`.
pub const DEPTH_MARKER: &str = "<max depth reached>";

/// Key under which a map reports entries dropped by `max_items`.
pub const TRUNCATED_KEY: &str = "<truncated>";

/// Suffix appended to strings cut at `max_string_len`.
pub const STRING_ELLIPSIS: &str = "...";

type Result<T> = std::result::Result<T, SerializationError>;

pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> Value {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => Value::String(format!("{}{}", &s[..cut], STRING_ELLIPSIS)),
        None => Value::String(s.to_string()),
    }
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[derive(Clone, Copy)]
pub(crate) struct ValueSerializer<'a> {
    limits: &'a SerializerLimits,
    budget: &'a Cell<usize>,
    depth: usize,
}

impl<'a> ValueSerializer<'a> {
    /// `budget` is spent by the walk and shared by every nested serializer.
    pub(crate) fn new(limits: &'a SerializerLimits, budget: &'a Cell<usize>) -> Self {
        Self {
            limits,
            budget,
            depth: 0,
        }
    }

    fn child(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..*self
        }
    }

    fn too_deep(&self) -> bool {
        self.depth >= self.limits.max_depth
    }

    /// Take `cost` from the budget. False once it is spent.
    fn spend(&self, cost: usize) -> bool {
        let left = self.budget.get();
        if left == 0 {
            return false;
        }
        self.budget.set(left.saturating_sub(cost));
        true
    }

    fn forward<T: ?Sized + Serialize>(self, value: &T) -> Result<Value> {
        if self.too_deep() {
            return Ok(Value::String(DEPTH_MARKER.to_string()));
        }
        value.serialize(self.child())
    }
}

pub(crate) struct SeqBuilder<'a> {
    serializer: ValueSerializer<'a>,
    items: Vec<Value>,
    omitted: usize,
}

impl<'a> SeqBuilder<'a> {
    fn new(serializer: ValueSerializer<'a>, len: Option<usize>) -> Self {
        let capacity = len.unwrap_or(0).min(serializer.limits.max_items);
        Self {
            serializer,
            items: Vec::with_capacity(if serializer.too_deep() { 0 } else { capacity }),
            omitted: 0,
        }
    }

    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        if self.serializer.too_deep() {
            return Ok(());
        }
        if self.items.len() >= self.serializer.limits.max_items || !self.serializer.spend(1) {
            self.omitted += 1;
            return Ok(());
        }
        let item = value.serialize(self.serializer.child())?;
        self.items.push(item);
        Ok(())
    }

    fn finish(mut self) -> Value {
        if self.serializer.too_deep() {
            return Value::String(DEPTH_MARKER.to_string());
        }
        if self.omitted > 0 {
            self.items
                .push(Value::String(format!("<{} more items>", self.omitted)));
        }
        Value::Array(self.items)
    }
}

pub(crate) struct MapBuilder<'a> {
    serializer: ValueSerializer<'a>,
    entries: Map<String, Value>,
    pending_key: Option<String>,
    skipping_value: bool,
    omitted: usize,
}

impl<'a> MapBuilder<'a> {
    fn new(serializer: ValueSerializer<'a>) -> Self {
        Self {
            serializer,
            entries: Map::new(),
            pending_key: None,
            skipping_value: false,
            omitted: 0,
        }
    }

    /// Returns false when the entry must be dropped.
    fn admit(&mut self) -> bool {
        if self.serializer.too_deep() {
            return false;
        }
        if self.entries.len() >= self.serializer.limits.max_items || !self.serializer.spend(1) {
            self.omitted += 1;
            return false;
        }
        true
    }

    fn key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        if !self.admit() {
            self.skipping_value = true;
            return Ok(());
        }
        let key = key.serialize(self.serializer.child())?;
        self.pending_key = Some(key_string(key));
        Ok(())
    }

    fn value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        if std::mem::take(&mut self.skipping_value) {
            return Ok(());
        }
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| <SerializationError as ser::Error>::custom("map value without key"))?;
        let value = value.serialize(self.serializer.child())?;
        self.entries.insert(key, value);
        Ok(())
    }

    fn field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        if !self.admit() {
            return Ok(());
        }
        let value = value.serialize(self.serializer.child())?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn finish(mut self) -> Value {
        if self.serializer.too_deep() {
            return Value::String(DEPTH_MARKER.to_string());
        }
        if self.omitted > 0 {
            self.entries.insert(
                TRUNCATED_KEY.to_string(),
                Value::String(format!("{} more entries", self.omitted)),
            );
        }
        Value::Object(self.entries)
    }
}

/// Externally tagged enum variant: `{ "Variant": <inner> }`.
pub(crate) struct VariantBuilder<B> {
    variant: &'static str,
    inner: B,
}

impl<B> VariantBuilder<B> {
    fn wrap(variant: &'static str, inner: Value) -> Value {
        let mut object = Map::new();
        object.insert(variant.to_string(), inner);
        Value::Object(object)
    }
}

impl<'a> ser::Serializer for ValueSerializer<'a> {
    type Ok = Value;
    type Error = SerializationError;

    type SerializeSeq = SeqBuilder<'a>;
    type SerializeTuple = SeqBuilder<'a>;
    type SerializeTupleStruct = SeqBuilder<'a>;
    type SerializeTupleVariant = VariantBuilder<SeqBuilder<'a>>;
    type SerializeMap = MapBuilder<'a>;
    type SerializeStruct = MapBuilder<'a>;
    type SerializeStructVariant = VariantBuilder<MapBuilder<'a>>;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i128(self, v: i128) -> Result<Value> {
        match i64::try_from(v) {
            Ok(small) => self.serialize_i64(small),
            Err(_) => Ok(Value::String(v.to_string())),
        }
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u128(self, v: u128) -> Result<Value> {
        match u64::try_from(v) {
            Ok(small) => self.serialize_u64(small),
            Err(_) => Ok(Value::String(v.to_string())),
        }
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        Ok(Number::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        let value = truncate_chars(v, self.limits.max_string_len);
        if let Value::String(s) = &value {
            self.spend(s.len());
        }
        Ok(value)
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        let mut seq = SeqBuilder::new(self, Some(v.len()));
        for byte in v {
            seq.push(byte)?;
        }
        Ok(seq.finish())
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value> {
        self.forward(value)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value> {
        self.forward(value)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value> {
        if self.too_deep() {
            return Ok(Value::String(DEPTH_MARKER.to_string()));
        }
        let inner = value.serialize(self.child())?;
        Ok(VariantBuilder::<()>::wrap(variant, inner))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder<'a>> {
        Ok(SeqBuilder::new(self, len))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder<'a>> {
        Ok(SeqBuilder::new(self, Some(len)))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqBuilder<'a>> {
        Ok(SeqBuilder::new(self, Some(len)))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantBuilder<SeqBuilder<'a>>> {
        Ok(VariantBuilder {
            variant,
            inner: SeqBuilder::new(self, Some(len)),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder<'a>> {
        Ok(MapBuilder::new(self))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<MapBuilder<'a>> {
        Ok(MapBuilder::new(self))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantBuilder<MapBuilder<'a>>> {
        Ok(VariantBuilder {
            variant,
            inner: MapBuilder::new(self),
        })
    }
}

impl ser::SerializeSeq for SeqBuilder<'_> {
    type Ok = Value;
    type Error = SerializationError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqBuilder<'_> {
    type Ok = Value;
    type Error = SerializationError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqBuilder<'_> {
    type Ok = Value;
    type Error = SerializationError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleVariant for VariantBuilder<SeqBuilder<'_>> {
    type Ok = Value;
    type Error = SerializationError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.inner.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(Self::wrap(self.variant, self.inner.finish()))
    }
}

impl ser::SerializeMap for MapBuilder<'_> {
    type Ok = Value;
    type Error = SerializationError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        self.key(key)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.value(value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for MapBuilder<'_> {
    type Ok = Value;
    type Error = SerializationError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<Value> {
        Ok(self.finish())
    }
}

impl ser::SerializeStructVariant for VariantBuilder<MapBuilder<'_>> {
    type Ok = Value;
    type Error = SerializationError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.inner.field(key, value)
    }

    fn end(self) -> Result<Value> {
        Ok(Self::wrap(self.variant, self.inner.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap;

    fn to_value<T: Serialize>(value: &T, limits: &SerializerLimits) -> Value {
        let budget = Cell::new(limits.max_output_len);
        value.serialize(ValueSerializer::new(limits, &budget)).unwrap()
    }

    #[derive(Serialize)]
    enum Shape {
        Empty,
        Circle(f64),
        Rect(u32, u32),
        Named { label: String },
    }

    #[test]
    fn test_matches_serde_json_for_plain_values() {
        let limits = SerializerLimits::default();
        let mut map = BTreeMap::new();
        map.insert("b", vec![1, 2]);
        map.insert("a", vec![]);

        assert_eq!(to_value(&map, &limits), serde_json::to_value(&map).unwrap());
        assert_eq!(to_value(&Shape::Empty, &limits), serde_json::json!("Empty"));
        assert_eq!(
            to_value(&Shape::Circle(1.5), &limits),
            serde_json::json!({"Circle": 1.5})
        );
        assert_eq!(
            to_value(&Shape::Rect(2, 3), &limits),
            serde_json::json!({"Rect": [2, 3]})
        );
        assert_eq!(
            to_value(&Shape::Named { label: "x".into() }, &limits),
            serde_json::json!({"Named": {"label": "x"}})
        );
    }

    #[test]
    fn test_non_finite_float_is_null() {
        let limits = SerializerLimits::default();
        assert_eq!(to_value(&f64::NAN, &limits), Value::Null);
    }

    #[test]
    fn test_wide_integers_fall_back_to_strings() {
        let limits = SerializerLimits::default();
        assert_eq!(to_value(&7i128, &limits), serde_json::json!(7));
        assert_eq!(
            to_value(&u128::MAX, &limits),
            Value::String(u128::MAX.to_string())
        );
    }

    #[test]
    fn test_non_string_map_keys() {
        let limits = SerializerLimits::default();
        let mut map = BTreeMap::new();
        map.insert(1u32, "one");
        assert_eq!(to_value(&map, &limits), serde_json::json!({"1": "one"}));
    }

    #[test]
    fn test_map_item_limit() {
        let limits = SerializerLimits {
            max_items: 2,
            ..Default::default()
        };
        let map: BTreeMap<u32, u32> = (0..5).map(|i| (i, i)).collect();
        let value = to_value(&map, &limits);
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(object[TRUNCATED_KEY], serde_json::json!("3 more entries"));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), Value::String("hé...".into()));
        assert_eq!(truncate_chars("hi", 2), Value::String("hi".into()));
    }

    #[test]
    fn test_variant_below_depth_limit_is_marked() {
        let limits = SerializerLimits {
            max_depth: 1,
            ..Default::default()
        };
        let value = to_value(&vec![Shape::Circle(1.0)], &limits);
        assert_eq!(value, serde_json::json!([DEPTH_MARKER]));
    }

    #[derive(Serialize)]
    struct Meters(u32);

    #[test]
    fn test_wrappers_count_toward_depth() {
        let limits = SerializerLimits {
            max_depth: 2,
            ..Default::default()
        };
        assert_eq!(to_value(&Some(Meters(5)), &limits), serde_json::json!(5));
        assert_eq!(
            to_value(&Some(Some(Meters(5))), &limits),
            serde_json::json!(DEPTH_MARKER)
        );
    }

    #[test]
    fn test_spent_budget_omits_remaining_items() {
        let limits = SerializerLimits {
            max_output_len: 3,
            ..Default::default()
        };
        let value = to_value(&vec![1, 2, 3, 4, 5], &limits);
        assert_eq!(value, serde_json::json!([1, 2, 3, "<2 more items>"]));
    }

    #[test]
    fn test_strings_spend_budget() {
        let limits = SerializerLimits {
            max_output_len: 4,
            ..Default::default()
        };
        // "abcd" spends what is left after its own slot
        let value = to_value(&vec!["abcd", "e", "f"], &limits);
        assert_eq!(value, serde_json::json!(["abcd", "<2 more items>"]));
    }
}
