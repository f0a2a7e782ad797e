use ng_da_error::DaError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

/// Tag of a [`Variant`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(i16)]
pub enum VariantType {
    Null = 0,
    Boolean = 1,
    Int32 = 2,
    Int64 = 3,
    Double = 4,
    String = 5,
}

impl VariantType {
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            VariantType::Int32 | VariantType::Int64 | VariantType::Double
        )
    }
}

/// Error returned when converting a `Variant` into a concrete Rust primitive
/// or into another variant type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariantCastError {
    /// The value is `Variant::Null`.
    #[error("value is null")]
    Null,
    /// Numeric value is NaN/Inf and cannot be represented in target type.
    #[error("numeric value is not finite")]
    NotFinite,
    /// Numeric value is out of the representable range of the target type.
    #[error("numeric value out of range for {target}")]
    OutOfRange { target: &'static str },
    /// String value cannot be parsed into the target type.
    #[error("failed to parse {target} from string: {value}")]
    ParseError { target: &'static str, value: String },
    /// No conversion rule exists between the two tags.
    #[error("type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        expected: VariantType,
        actual: VariantType,
    },
}

impl From<VariantCastError> for DaError {
    fn from(e: VariantCastError) -> Self {
        match e {
            VariantCastError::Null => DaError::NullValue,
            other => DaError::NotConvertible(other.to_string()),
        }
    }
}

/// A self-describing process value.
///
/// Strings use shared storage (`Arc<str>`) so that publishing the same value
/// to many subscribers never copies the payload.
///
/// # Equality
/// Two variants are equal when they carry the same tag and equal payloads.
/// Values of different tags are never equal (`Int32(5) != Int64(5)`).
/// Two NaN doubles compare equal so that re-applying the same raw value
/// is recognised as a no-op.
#[derive(Clone, Debug, Default)]
pub enum Variant {
    #[default]
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(Arc<str>),
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Null, Variant::Null) => true,
            (Variant::Boolean(a), Variant::Boolean(b)) => a == b,
            (Variant::Int32(a), Variant::Int32(b)) => a == b,
            (Variant::Int64(a), Variant::Int64(b)) => a == b,
            (Variant::Double(a), Variant::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Variant::String(a), Variant::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Variant {
    #[inline]
    pub fn variant_type(&self) -> VariantType {
        match self {
            Variant::Null => VariantType::Null,
            Variant::Boolean(_) => VariantType::Boolean,
            Variant::Int32(_) => VariantType::Int32,
            Variant::Int64(_) => VariantType::Int64,
            Variant::Double(_) => VariantType::Double,
            Variant::String(_) => VariantType::String,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.variant_type().is_numeric()
    }

    pub fn as_bool(&self) -> Result<bool, VariantCastError> {
        match self {
            Variant::Null => Err(VariantCastError::Null),
            Variant::Boolean(b) => Ok(*b),
            Variant::Int32(n) => Ok(*n != 0),
            Variant::Int64(n) => Ok(*n != 0),
            Variant::Double(n) => Ok(*n != 0.0),
            Variant::String(s) => {
                if let Some(b) = parse_bool_from_str(s) {
                    return Ok(b);
                }
                parse_f64_from_str("bool", s).map(|n| n != 0.0)
            }
        }
    }

    pub fn as_i64(&self) -> Result<i64, VariantCastError> {
        match self {
            Variant::Null => Err(VariantCastError::Null),
            Variant::Boolean(b) => Ok(i64::from(*b)),
            Variant::Int32(n) => Ok(i64::from(*n)),
            Variant::Int64(n) => Ok(*n),
            Variant::Double(n) => f64_to_i64(*n),
            Variant::String(s) => {
                let st = s.trim();
                match st.parse::<i64>() {
                    Ok(n) => Ok(n),
                    Err(_) => f64_to_i64(parse_f64_from_str("i64", st)?),
                }
            }
        }
    }

    pub fn as_i32(&self) -> Result<i32, VariantCastError> {
        let n = self.as_i64()?;
        i32::try_from(n).map_err(|_| VariantCastError::OutOfRange { target: "i32" })
    }

    pub fn as_f64(&self) -> Result<f64, VariantCastError> {
        match self {
            Variant::Null => Err(VariantCastError::Null),
            Variant::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Variant::Int32(n) => Ok(f64::from(*n)),
            Variant::Int64(n) => Ok(*n as f64),
            Variant::Double(n) => Ok(*n),
            Variant::String(s) => parse_f64_from_str("f64", s),
        }
    }

    pub fn as_string(&self) -> Result<String, VariantCastError> {
        match self {
            Variant::Null => Err(VariantCastError::Null),
            other => Ok(other.to_string()),
        }
    }

    /// Convert this value into the given variant type.
    ///
    /// `Null` only coerces into `Null`; no non-null value coerces into `Null`.
    pub fn coerce(&self, target: VariantType) -> Result<Variant, VariantCastError> {
        if self.variant_type() == target {
            return Ok(self.clone());
        }
        match target {
            VariantType::Null => Err(VariantCastError::TypeMismatch {
                expected: target,
                actual: self.variant_type(),
            }),
            VariantType::Boolean => self.as_bool().map(Variant::Boolean),
            VariantType::Int32 => self.as_i32().map(Variant::Int32),
            VariantType::Int64 => self.as_i64().map(Variant::Int64),
            VariantType::Double => self.as_f64().map(Variant::Double),
            VariantType::String => self.as_string().map(Variant::from),
        }
    }

    /// Convert into a JSON scalar for transport collaborators.
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            Variant::Null => serde_json::Value::Null,
            Variant::Boolean(b) => serde_json::Value::Bool(*b),
            Variant::Int32(n) => serde_json::Value::Number((*n as i64).into()),
            Variant::Int64(n) => serde_json::Value::Number((*n).into()),
            Variant::Double(n) => {
                serde_json::Number::from_f64(*n).map_or(serde_json::Value::Null, Into::into)
            }
            Variant::String(s) => serde_json::Value::String(s.to_string()),
        }
    }

    /// Build a variant from a JSON scalar.
    ///
    /// Integers become `Int64` (or `Double` beyond `i64`), arrays and objects
    /// are rejected.
    pub fn try_from_json_scalar(v: &serde_json::Value) -> Option<Self> {
        match v {
            serde_json::Value::Null => Some(Variant::Null),
            serde_json::Value::Bool(b) => Some(Variant::Boolean(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Variant::Int64(i))
                } else {
                    n.as_f64().map(Variant::Double)
                }
            }
            serde_json::Value::String(s) => Some(Variant::from(s.as_str())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

#[inline]
fn parse_bool_from_str(s: &str) -> Option<bool> {
    let st = s.trim().to_ascii_lowercase();
    match st.as_str() {
        "true" | "on" | "yes" | "y" | "t" => Some(true),
        "false" | "off" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

#[inline]
fn parse_f64_from_str(target: &'static str, s: &str) -> Result<f64, VariantCastError> {
    let st = s.trim();
    st.parse::<f64>().map_err(|_| VariantCastError::ParseError {
        target,
        value: st.to_string(),
    })
}

#[inline]
fn f64_to_i64(n: f64) -> Result<i64, VariantCastError> {
    if !n.is_finite() {
        return Err(VariantCastError::NotFinite);
    }
    let r = n.round();
    if r < i64::MIN as f64 || r >= i64::MAX as f64 {
        return Err(VariantCastError::OutOfRange { target: "i64" });
    }
    Ok(r as i64)
}

impl Display for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => f.write_str("null"),
            Variant::Boolean(b) => write!(f, "{b}"),
            Variant::Int32(n) => write!(f, "{n}"),
            Variant::Int64(n) => write!(f, "{n}"),
            Variant::Double(n) => write!(f, "{n}"),
            Variant::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Variant {
    #[inline]
    fn from(v: bool) -> Self {
        Variant::Boolean(v)
    }
}

impl From<i32> for Variant {
    #[inline]
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<i64> for Variant {
    #[inline]
    fn from(v: i64) -> Self {
        Variant::Int64(v)
    }
}

impl From<f64> for Variant {
    #[inline]
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    #[inline]
    fn from(v: &str) -> Self {
        Variant::String(Arc::from(v))
    }
}

impl From<String> for Variant {
    #[inline]
    fn from(v: String) -> Self {
        Variant::String(Arc::from(v))
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    #[inline]
    fn from(v: Option<T>) -> Self {
        v.map_or(Variant::Null, Into::into)
    }
}

impl Serialize for Variant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Variant {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        Variant::try_from_json_scalar(&v).ok_or_else(|| {
            de::Error::custom("array/object cannot be converted to Variant")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_tag_sensitive() {
        assert_eq!(Variant::Int32(5), Variant::Int32(5));
        assert_ne!(Variant::Int32(5), Variant::Int64(5));
        assert_ne!(Variant::Null, Variant::Boolean(false));
        assert_eq!(Variant::from("a"), Variant::String(Arc::from("a")));
    }

    #[test]
    fn test_nan_equals_nan() {
        assert_eq!(Variant::Double(f64::NAN), Variant::Double(f64::NAN));
        assert_ne!(Variant::Double(f64::NAN), Variant::Double(0.0));
    }

    #[test]
    fn test_numeric_casts() {
        assert_eq!(Variant::Double(2.6).as_i64(), Ok(3));
        assert_eq!(Variant::Boolean(true).as_f64(), Ok(1.0));
        assert_eq!(Variant::from(" 42 ").as_i32(), Ok(42));
        assert_eq!(Variant::from("1.5").as_f64(), Ok(1.5));
        assert_eq!(
            Variant::Int64(i64::MAX).as_i32(),
            Err(VariantCastError::OutOfRange { target: "i32" })
        );
        assert_eq!(
            Variant::Double(f64::INFINITY).as_i64(),
            Err(VariantCastError::NotFinite)
        );
        assert_eq!(Variant::Null.as_f64(), Err(VariantCastError::Null));
    }

    #[test]
    fn test_bool_casts() {
        assert_eq!(Variant::from("on").as_bool(), Ok(true));
        assert_eq!(Variant::from("0").as_bool(), Ok(false));
        assert_eq!(Variant::Int32(7).as_bool(), Ok(true));
        assert!(matches!(
            Variant::from("maybe").as_bool(),
            Err(VariantCastError::ParseError { .. })
        ));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            Variant::from("12").coerce(VariantType::Int32),
            Ok(Variant::Int32(12))
        );
        assert_eq!(
            Variant::Int32(1).coerce(VariantType::String),
            Ok(Variant::from("1"))
        );
        assert_eq!(
            Variant::Null.coerce(VariantType::Null),
            Ok(Variant::Null)
        );
        assert_eq!(
            Variant::Null.coerce(VariantType::Double),
            Err(VariantCastError::Null)
        );
        assert!(Variant::Int32(1).coerce(VariantType::Null).is_err());
    }

    #[test]
    fn test_cast_error_maps_to_contract_errors() {
        assert_eq!(DaError::from(VariantCastError::Null), DaError::NullValue);
        assert!(matches!(
            DaError::from(VariantCastError::NotFinite),
            DaError::NotConvertible(_)
        ));
    }

    #[test]
    fn test_json_scalars() {
        let v: Variant = serde_json::from_str("12").unwrap();
        assert_eq!(v, Variant::Int64(12));
        let v: Variant = serde_json::from_str("null").unwrap();
        assert!(v.is_null());
        assert!(serde_json::from_str::<Variant>("[1]").is_err());
        assert_eq!(
            serde_json::to_string(&Variant::from("x")).unwrap(),
            "\"x\""
        );
    }
}
