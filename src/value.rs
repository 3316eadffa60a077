//! The closed set of values carried by notation-built patterns.

use crate::fraction::Fraction;
use crate::pattern::{app_left, pure, Pattern};
use std::collections::BTreeMap;
use std::fmt;

/// Key used when a bare value is merged into a control map.
pub const DEFAULT_CONTROL: &str = "value";

/// A hap payload: a number, a word, a map of control parameters, or a
/// nested pattern.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Map(BTreeMap<String, Value>),
    Pattern(Pattern<Value>),
}

impl Value {
    /// A one-entry control map, e.g. `{ s: "bd" }`.
    pub fn control(name: &str, value: impl Into<Value>) -> Value {
        let mut map = BTreeMap::new();
        map.insert(name.to_string(), value.into());
        Value::Map(map)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a control parameter in a map value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(name),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// The value as exact time. Floats go through the bounded
    /// continued-fraction conversion.
    pub fn to_fraction(&self) -> Option<Fraction> {
        match self {
            Value::Int(i) => Some(Fraction::from_integer(*i)),
            Value::Float(f) if f.is_finite() => Some(Fraction::from(*f)),
            _ => None,
        }
    }

    /// Merge control parameters: entries from `other` win. A non-map side
    /// is treated as `{ value: .. }`.
    pub fn merge(self, other: Value) -> Value {
        let mut map = self.into_map();
        map.extend(other.into_map());
        Value::Map(map)
    }

    fn into_map(self) -> BTreeMap<String, Value> {
        match self {
            Value::Map(map) => map,
            other => {
                let mut map = BTreeMap::new();
                map.insert(DEFAULT_CONTROL.to_string(), other);
                map
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Pattern(a), Value::Pattern(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Pattern(_) => f.write_str("Pattern(..)"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Pattern(_) => f.write_str("<pattern>"),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Pattern<Value>> for Value {
    fn from(p: Pattern<Value>) -> Self {
        Value::Pattern(p)
    }
}

impl Pattern<Value> {
    /// Wrap every value as the control parameter `name`.
    pub fn as_control(self, name: &str) -> Self {
        let name = name.to_string();
        self.fmap(move |v| Value::control(&name, v))
    }

    /// Add the control parameter `name`, taking its values from `values`.
    /// Event structure comes from `self`.
    pub fn with_control(self, name: &str, values: Pattern<Value>) -> Self {
        let name = name.to_string();
        let funcs = self.fmap(move |left: Value| {
            let name = name.clone();
            move |right: Value| left.clone().merge(Value::control(&name, right))
        });
        app_left(funcs, values)
    }

    /// Replace nested-pattern values by squeezing each sub-pattern into the
    /// event that carries it.
    pub fn flatten(self) -> Self {
        self.squeeze_bind(|v| match v {
            Value::Pattern(p) => p.flatten(),
            other => pure(other),
        })
    }
}
