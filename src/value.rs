use serde::ser::{
    Error as _, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant,
    SerializeTuple, SerializeTupleStruct, SerializeTupleVariant,
};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Typed value of a structured log field.
///
/// Values are kept in their native form until the writer thread encodes
/// them; building one never produces JSON text.
#[derive(Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Array(Vec<FieldValue>),
    /// Nested object; key order is preserved on output.
    Object(Vec<(String, FieldValue)>),
    /// Arbitrary `Serialize` value, encoded lazily on the writer thread.
    Structured(Arc<dyn StructuredValue>),
}

/// A value that knows how to turn itself into JSON on demand.
///
/// Implemented for every `Serialize + Debug` type through
/// [`FieldValue::structured`]. The `Debug` representation is what ends up
/// in the output when encoding fails.
pub trait StructuredValue: fmt::Debug + Send + Sync + 'static {
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;
}

struct Structured<T>(T);

impl<T> fmt::Debug for Structured<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl<T> StructuredValue for Structured<T>
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        // serde_json maps NaN and infinities to null without complaint.
        self.0.serialize(FiniteCheck)?;
        serde_json::to_value(&self.0)
    }
}

fn non_finite(v: f64) -> serde_json::Error {
    serde_json::Error::custom(format!("non-finite float {v} has no JSON representation"))
}

/// Serializer that produces nothing and fails on the first non-finite
/// float anywhere inside the value.
struct FiniteCheck;

type Checked = Result<(), serde_json::Error>;

macro_rules! accept {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(fn $method(self, _v: $ty) -> Checked {
            Ok(())
        })*
    };
}

impl Serializer for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    accept!(
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_struct(&'static str),
    );

    fn serialize_f32(self, v: f32) -> Checked {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Checked {
        if v.is_finite() {
            Ok(())
        } else {
            Err(non_finite(v))
        }
    }

    fn serialize_none(self) -> Checked {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Checked {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Checked {
        Ok(())
    }

    fn serialize_unit_variant(self, _name: &'static str, _index: u32, _variant: &'static str) -> Checked {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, value: &T) -> Checked {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
}

impl SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Checked {
        key.serialize(FiniteCheck)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _key: &'static str, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _key: &'static str, value: &T) -> Checked {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl FieldValue {
    /// Capture an arbitrary serializable value without encoding it.
    pub fn structured<T>(value: T) -> Self
    where
        T: Serialize + fmt::Debug + Send + Sync + 'static,
    {
        FieldValue::Structured(Arc::new(Structured(value)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v:?}"),
            FieldValue::Str(v) => write!(f, "{v:?}"),
            FieldValue::Array(items) => f.debug_list().entries(items).finish(),
            FieldValue::Object(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            FieldValue::Structured(v) => fmt::Debug::fmt(v, f),
        }
    }
}

/// Strict JSON encoding: non-finite floats and failing structured values
/// are reported as errors instead of being silently coerced.
impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(v) => serializer.serialize_bool(*v),
            FieldValue::Int(v) => serializer.serialize_i64(*v),
            FieldValue::UInt(v) => serializer.serialize_u64(*v),
            FieldValue::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            FieldValue::Float(v) => Err(S::Error::custom(format!(
                "non-finite float {v} has no JSON representation"
            ))),
            FieldValue::Str(v) => serializer.serialize_str(v),
            FieldValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FieldValue::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            FieldValue::Structured(v) => v
                .to_json()
                .map_err(S::Error::custom)?
                .serialize(serializer),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Structured(a), Structured(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::Int(v as i64)
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::UInt(v as u64)
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64, isize);
from_unsigned!(u8, u16, u32, u64, usize);

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<()> for FieldValue {
    fn from(_: ()) -> Self {
        FieldValue::Null
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        FieldValue::Str(v.clone())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        FieldValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::UInt(u)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => FieldValue::Str(s),
            Value::Array(items) => FieldValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                FieldValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Build an ordered list of `(name, FieldValue)` pairs.
///
/// ```
/// use rapidlog::fields;
/// let f = fields!["user_id" => 123, "action" => "login"];
/// assert_eq!(f[0].0, "user_id");
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        ::std::vec::Vec::<(::std::string::String, $crate::FieldValue)>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        ::std::vec![$((::std::string::String::from($key), $crate::FieldValue::from($value))),+]
    };
}
