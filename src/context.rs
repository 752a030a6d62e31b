//! Context normalization.
//!
//! Any `Serialize` input becomes a [`Context`]. Maps keep their keys, records
//! (structs) have their field names lower-cased, options collapse to their
//! payload or `Null`. Shapes that cannot act as a lookup tree normalize to an
//! empty context; the failure surfaces later, when a placeholder actually
//! dereferences a missing key.
//!
//! A nested value that cannot be represented (a `u64` above `i64::MAX`, a
//! custom serializer error) becomes `Null` for that entry alone, with a
//! `warn!`; its siblings are kept.

use serde::ser::{self, Serialize};

use crate::error::{MapperError, MapperResult};
use crate::value::{Context, Value};

/// Normalize a caller value into a lookup tree.
pub fn normalize<T: Serialize + ?Sized>(value: &T) -> Context {
    match to_value(value) {
        Ok(Value::Tree(ctx)) => ctx,
        Ok(other) => {
            tracing::trace!(kind = other.kind(), "input is not a map or record; using empty context");
            Context::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "input could not be normalized; using empty context");
            Context::new()
        }
    }
}

/// Convert any serializable value into a [`Value`].
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> MapperResult<Value> {
    value.serialize(ValueSerializer)
}

/// Convert a nested entry, mapping an unrepresentable one to `Null`.
fn entry<T: Serialize + ?Sized>(value: &T) -> Value {
    to_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "input value cannot be represented; using null");
        Value::Null
    })
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = MapperError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantBuilder<SeqBuilder>;
    type SerializeMap = MapBuilder;
    type SerializeStruct = RecordBuilder;
    type SerializeStructVariant = VariantBuilder<RecordBuilder>;

    fn serialize_bool(self, v: bool) -> MapperResult<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> MapperResult<Value> {
        Ok(Value::Int(v as i64))
    }

    fn serialize_i16(self, v: i16) -> MapperResult<Value> {
        Ok(Value::Int(v as i64))
    }

    fn serialize_i32(self, v: i32) -> MapperResult<Value> {
        Ok(Value::Int(v as i64))
    }

    fn serialize_i64(self, v: i64) -> MapperResult<Value> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(self, v: u8) -> MapperResult<Value> {
        Ok(Value::Int(v as i64))
    }

    fn serialize_u16(self, v: u16) -> MapperResult<Value> {
        Ok(Value::Int(v as i64))
    }

    fn serialize_u32(self, v: u32) -> MapperResult<Value> {
        Ok(Value::Int(v as i64))
    }

    fn serialize_u64(self, v: u64) -> MapperResult<Value> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| MapperError::Type(format!("integer {} does not fit in i64", v)))
    }

    fn serialize_f32(self, v: f32) -> MapperResult<Value> {
        Ok(Value::Float(v as f64))
    }

    fn serialize_f64(self, v: f64) -> MapperResult<Value> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> MapperResult<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> MapperResult<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> MapperResult<Value> {
        Ok(Value::List(v.iter().map(|b| Value::Int(*b as i64)).collect()))
    }

    fn serialize_none(self) -> MapperResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> MapperResult<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> MapperResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> MapperResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> MapperResult<Value> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> MapperResult<Value> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> MapperResult<Value> {
        value.serialize(self)
    }

    fn serialize_seq(self, len: Option<usize>) -> MapperResult<SeqBuilder> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> MapperResult<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> MapperResult<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> MapperResult<VariantBuilder<SeqBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> MapperResult<MapBuilder> {
        Ok(MapBuilder {
            ctx: Context::new(),
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> MapperResult<RecordBuilder> {
        Ok(RecordBuilder { ctx: Context::new() })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> MapperResult<VariantBuilder<RecordBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: RecordBuilder { ctx: Context::new() },
        })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = MapperError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> MapperResult<()> {
        self.items.push(entry(value));
        Ok(())
    }

    fn end(self) -> MapperResult<Value> {
        Ok(Value::List(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = MapperError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> MapperResult<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> MapperResult<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = MapperError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> MapperResult<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> MapperResult<Value> {
        ser::SerializeSeq::end(self)
    }
}

struct MapBuilder {
    ctx: Context,
    key: Option<String>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = MapperError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> MapperResult<()> {
        // Non-string keys cannot be addressed by a dotted path; the entry is dropped.
        self.key = match to_value(key) {
            Ok(Value::String(s)) => Some(s),
            _ => None,
        };
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> MapperResult<()> {
        if let Some(key) = self.key.take() {
            self.ctx.insert(key, entry(value));
        }
        Ok(())
    }

    fn end(self) -> MapperResult<Value> {
        Ok(Value::Tree(self.ctx))
    }
}

struct RecordBuilder {
    ctx: Context,
}

impl ser::SerializeStruct for RecordBuilder {
    type Ok = Value;
    type Error = MapperError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> MapperResult<()> {
        self.ctx.insert(key.to_lowercase(), entry(value));
        Ok(())
    }

    fn end(self) -> MapperResult<Value> {
        Ok(Value::Tree(self.ctx))
    }
}

struct VariantBuilder<B> {
    variant: &'static str,
    inner: B,
}

impl ser::SerializeTupleVariant for VariantBuilder<SeqBuilder> {
    type Ok = Value;
    type Error = MapperError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> MapperResult<()> {
        ser::SerializeSeq::serialize_element(&mut self.inner, value)
    }

    fn end(self) -> MapperResult<Value> {
        let inner = ser::SerializeSeq::end(self.inner)?;
        Ok(Value::Tree(Context::new().with(self.variant, inner)))
    }
}

impl ser::SerializeStructVariant for VariantBuilder<RecordBuilder> {
    type Ok = Value;
    type Error = MapperError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> MapperResult<()> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> MapperResult<Value> {
        let inner = ser::SerializeStruct::end(self.inner)?;
        Ok(Value::Tree(Context::new().with(self.variant, inner)))
    }
}
