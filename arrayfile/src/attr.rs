use core::fmt::{Display, Formatter};

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Float(x) => write!(f, "{}", x),
            AttrValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<i32> for AttrValue {
    fn from(i: i32) -> Self {
        AttrValue::Int(i.into())
    }
}

impl From<f64> for AttrValue {
    fn from(x: f64) -> Self {
        AttrValue::Float(x)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

/// JSON encoding used by the Zarr adapter. Non-finite floats have no JSON
/// number form and are written as `{"float": "NaN" | "Infinity" | "-Infinity"}`.
#[cfg(feature = "zarr")]
pub(crate) mod json {
    use super::AttrValue;
    use serde_json::{json, Value};

    const FLOAT_TAG: &str = "float";

    pub(crate) fn to_json(value: &AttrValue) -> Value {
        match value {
            AttrValue::Bool(b) => Value::Bool(*b),
            AttrValue::Int(i) => Value::from(*i),
            AttrValue::Float(x) if x.is_finite() => Value::from(*x),
            AttrValue::Float(x) => {
                let repr = if x.is_nan() {
                    "NaN"
                } else if *x > 0.0 {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                json!({ FLOAT_TAG: repr })
            }
            AttrValue::Str(s) => Value::String(s.clone()),
        }
    }

    pub(crate) fn from_json(value: &Value) -> Option<AttrValue> {
        match value {
            Value::Bool(b) => Some(AttrValue::Bool(*b)),
            Value::Number(n) if n.is_f64() => n.as_f64().map(AttrValue::Float),
            Value::Number(n) => n
                .as_i64()
                .map(AttrValue::Int)
                .or_else(|| n.as_f64().map(AttrValue::Float)),
            Value::String(s) => Some(AttrValue::Str(s.clone())),
            Value::Object(map) if map.len() == 1 => {
                let x = match map.get(FLOAT_TAG)?.as_str()? {
                    "NaN" => f64::NAN,
                    "Infinity" => f64::INFINITY,
                    "-Infinity" => f64::NEG_INFINITY,
                    _ => return None,
                };
                Some(AttrValue::Float(x))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let v: AttrValue = "Pa".into();
        assert_eq!(v.as_str(), Some("Pa"));
        assert_eq!(v.as_i64(), None);
        assert_eq!(AttrValue::from(3).as_i64(), Some(3));
        assert_eq!(AttrValue::from(true).to_string(), "true");
    }

    #[cfg(feature = "zarr")]
    #[test]
    fn test_json() {
        use super::json::{from_json, to_json};

        let values = [
            AttrValue::Bool(false),
            AttrValue::Int(-7),
            AttrValue::Int(i64::MAX),
            AttrValue::Float(1.0),
            AttrValue::Float(-0.25),
            AttrValue::Float(f64::INFINITY),
            AttrValue::Float(f64::NEG_INFINITY),
            AttrValue::Str("Pa".to_string()),
        ];
        for v in values {
            assert_eq!(from_json(&to_json(&v)), Some(v));
        }

        match from_json(&to_json(&AttrValue::Float(f64::NAN))) {
            Some(AttrValue::Float(x)) => assert!(x.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(from_json(&serde_json::json!([1, 2])), None);
    }
}
