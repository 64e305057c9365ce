//! Validator families used by context contracts.
//!
//! Every family answers the same two questions for a field: is this value
//! valid (and what is its normalized form), and how should the field be
//! described in diagnostics. Contracts only ever talk to the [`Spec`] trait.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::short_type_name;

/// Validator family of a schema. Only schemas of the same family combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Family {
    /// Declared field kinds, see [`Schema`].
    Schema,
    /// Serde round-trip into Rust types, see [`TypedSchema`].
    Typed,
    /// Name to function map, see [`RawSchema`].
    Raw,
}

/// Messages explaining why a value was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation(pub Vec<String>);

impl Violation {
    /// A violation with one message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(vec![message.into()])
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("\n"))
    }
}

/// A schema declaring context fields.
pub trait Spec: Send + Sync + 'static {
    /// Validator family.
    fn family(&self) -> Family;

    /// Schema name, used in diagnostics.
    fn name(&self) -> &str;

    /// Declared fields, in declaration order.
    fn fields(&self) -> Vec<String>;

    /// Validate one field, returning the normalized value.
    fn validate(&self, field: &str, value: &Value) -> Result<Value, Violation>;

    /// Short type description of one field.
    fn describe(&self, field: &str) -> String;
}

/// One field of a shared schema.
#[derive(Clone)]
pub struct FieldValidator {
    spec: Arc<dyn Spec>,
    field: String,
}

impl FieldValidator {
    pub(crate) fn new(spec: Arc<dyn Spec>, field: impl Into<String>) -> Self {
        Self {
            spec,
            field: field.into(),
        }
    }

    /// Validate a value for this field.
    pub fn validate(&self, value: &Value) -> Result<Value, Violation> {
        self.spec.validate(&self.field, value)
    }

    /// Type description of this field.
    pub fn describe(&self) -> String {
        self.spec.describe(&self.field)
    }
}

impl fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.spec.name(), self.field, self.describe())
    }
}

/// Whether two handles point at the same schema object.
pub(crate) fn same_spec(a: &Arc<dyn Spec>, b: &Arc<dyn Spec>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ============================================================================
// Schema
// ============================================================================

/// Kind of a [`Schema`] field. Values are coerced where the conversion is lossless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Any value except nothing is checked.
    Any,
    /// `true`/`false`, also from `"true"`, `"yes"`, `"1"` and friends.
    Boolean,
    /// Whole number, also from numeric strings and integral floats.
    Integer,
    /// Number, also from numeric strings.
    Float,
    /// Text.
    String,
    /// Array whose items all have the given kind.
    List(Box<Kind>),
    /// JSON object.
    Map,
}

impl Kind {
    /// Check and normalize a value.
    pub fn coerce(&self, value: &Value) -> Result<Value, Violation> {
        if value.is_null() && *self != Self::Any {
            return Err(Violation::new("none is not an allowed value"));
        }
        match self {
            Self::Any => Ok(value.clone()),
            Self::Boolean => coerce_boolean(value),
            Self::Integer => coerce_integer(value),
            Self::Float => coerce_float(value),
            Self::String => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err(Violation::new("str type expected")),
            },
            Self::List(item) => {
                let Value::Array(items) = value else {
                    return Err(Violation::new("value is not a valid list"));
                };
                let mut normalized = Vec::with_capacity(items.len());
                let mut messages = Vec::new();
                for (index, element) in items.iter().enumerate() {
                    match item.coerce(element) {
                        Ok(element) => normalized.push(element),
                        Err(Violation(errors)) => messages
                            .extend(errors.into_iter().map(|error| format!("{index}: {error}"))),
                    }
                }
                if messages.is_empty() {
                    Ok(Value::Array(normalized))
                } else {
                    Err(Violation(messages))
                }
            }
            Self::Map => match value {
                Value::Object(_) => Ok(value.clone()),
                _ => Err(Violation::new("value is not a valid dict")),
            },
        }
    }
}

fn coerce_boolean(value: &Value) -> Result<Value, Violation> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(Value::Bool)
        .ok_or_else(|| Violation::new("value could not be parsed to a boolean"))
}

fn coerce_integer(value: &Value) -> Result<Value, Violation> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f))
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .map(Value::from)
        .ok_or_else(|| Violation::new("value is not a valid integer"))
}

fn coerce_float(value: &Value) -> Result<Value, Violation> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| Violation::new("value is not a valid float"))
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Boolean => f.write_str("boolean"),
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::String => f.write_str("string"),
            Self::List(item) => write!(f, "list[{item}]"),
            Self::Map => f.write_str("map"),
        }
    }
}

type Check = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

struct SchemaField {
    kind: Kind,
    check: Option<Check>,
}

/// Schema of declared field kinds with optional extra checks.
///
/// ```
/// use fabula::{Kind, Schema};
///
/// let schema = Schema::new("Order")
///     .field("order_id", Kind::Integer)
///     .field_with("total", Kind::Float, |value| match value.as_f64() {
///         Some(total) if total >= 0.0 => Ok(()),
///         _ => Err("total can not be negative".into()),
///     });
/// # let _ = schema;
/// ```
pub struct Schema {
    name: String,
    fields: IndexMap<String, SchemaField>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Declare a field of the given kind.
    pub fn field(mut self, name: impl Into<String>, kind: Kind) -> Self {
        self.fields
            .insert(name.into(), SchemaField { kind, check: None });
        self
    }

    /// Declare a field with a check run on the coerced value.
    pub fn field_with<F>(mut self, name: impl Into<String>, kind: Kind, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.fields.insert(
            name.into(),
            SchemaField {
                kind,
                check: Some(Arc::new(check)),
            },
        );
        self
    }
}

impl Spec for Schema {
    fn family(&self) -> Family {
        Family::Schema
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn validate(&self, field: &str, value: &Value) -> Result<Value, Violation> {
        let Some(declared) = self.fields.get(field) else {
            return Err(Violation::new(format!("field {field:?} is not declared")));
        };
        let normalized = declared.kind.coerce(value)?;
        if let Some(check) = &declared.check {
            check(&normalized).map_err(Violation::new)?;
        }
        Ok(normalized)
    }

    fn describe(&self, field: &str) -> String {
        self.fields
            .get(field)
            .map_or_else(String::new, |declared| declared.kind.to_string())
    }
}

// ============================================================================
// Typed Schema
// ============================================================================

type Convert = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

struct TypedField {
    type_name: String,
    convert: Convert,
}

/// Schema validating each field by a serde round-trip through a Rust type.
pub struct TypedSchema {
    name: String,
    fields: IndexMap<String, TypedField>,
}

impl TypedSchema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Declare a field holding a `T`.
    pub fn field<T>(mut self, name: impl Into<String>) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let convert: Convert = Arc::new(|value: &Value| {
            let typed: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
            serde_json::to_value(typed).map_err(|e| e.to_string())
        });
        self.fields.insert(
            name.into(),
            TypedField {
                type_name: short_type_name::<T>(),
                convert,
            },
        );
        self
    }
}

impl Spec for TypedSchema {
    fn family(&self) -> Family {
        Family::Typed
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn validate(&self, field: &str, value: &Value) -> Result<Value, Violation> {
        let Some(declared) = self.fields.get(field) else {
            return Err(Violation::new(format!("field {field:?} is not declared")));
        };
        (declared.convert)(value).map_err(Violation::new)
    }

    fn describe(&self, field: &str) -> String {
        self.fields
            .get(field)
            .map_or_else(String::new, |declared| declared.type_name.clone())
    }
}

// ============================================================================
// Raw Schema
// ============================================================================

struct RawField {
    label: String,
    convert: Convert,
}

/// Schema made of plain validation functions.
pub struct RawSchema {
    name: String,
    fields: IndexMap<String, RawField>,
}

impl RawSchema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Declare a field validated by `f`; `label` describes it in diagnostics.
    pub fn field<F>(mut self, name: impl Into<String>, label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.fields.insert(
            name.into(),
            RawField {
                label: label.into(),
                convert: Arc::new(f),
            },
        );
        self
    }
}

impl Spec for RawSchema {
    fn family(&self) -> Family {
        Family::Raw
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn validate(&self, field: &str, value: &Value) -> Result<Value, Violation> {
        let Some(declared) = self.fields.get(field) else {
            return Err(Violation::new(format!("field {field:?} is not declared")));
        };
        (declared.convert)(value).map_err(Violation::new)
    }

    fn describe(&self, field: &str) -> String {
        self.fields
            .get(field)
            .map_or_else(String::new, |declared| declared.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn integer_coercion() {
        let kind = Kind::Integer;
        assert_eq!(kind.coerce(&json!(7)), Ok(json!(7)));
        assert_eq!(kind.coerce(&json!("7")), Ok(json!(7)));
        assert_eq!(kind.coerce(&json!(7.0)), Ok(json!(7)));
        assert!(kind.coerce(&json!(7.5)).is_err());
        assert!(kind.coerce(&json!(1e20)).is_err());
        assert!(kind.coerce(&json!(-1e30)).is_err());
        assert!(kind.coerce(&json!("x")).is_err());
        assert!(kind.coerce(&Value::Null).is_err());
    }

    #[test]
    fn boolean_and_list_coercion() {
        assert_eq!(Kind::Boolean.coerce(&json!("yes")), Ok(json!(true)));
        assert_eq!(Kind::Boolean.coerce(&json!(0)), Ok(json!(false)));

        let kind = Kind::List(Box::new(Kind::Integer));
        assert_eq!(kind.coerce(&json!(["1", 2])), Ok(json!([1, 2])));
        assert_eq!(
            kind.coerce(&json!([1, "x"])),
            Err(Violation(vec!["1: value is not a valid integer".into()]))
        );
        assert_eq!(kind.to_string(), "list[integer]");
    }

    #[test]
    fn schema_runs_checks_after_coercion() {
        let schema = Schema::new("Contract").field_with("bar", Kind::Integer, |value| {
            match value.as_i64() {
                Some(v) if v >= 0 => Ok(()),
                _ => Err("must be positive".into()),
            }
        });
        assert_eq!(schema.validate("bar", &json!("3")), Ok(json!(3)));
        assert_eq!(
            schema.validate("bar", &json!(-3)),
            Err(Violation::new("must be positive"))
        );
        assert!(schema.validate("foo", &json!(1)).is_err());
        assert_eq!(schema.describe("bar"), "integer");
    }

    #[derive(Serialize, Deserialize)]
    struct Money {
        amount: u32,
    }

    #[test]
    fn typed_schema_round_trip() {
        let schema = TypedSchema::new("Contract")
            .field::<u32>("count")
            .field::<Money>("price");
        assert_eq!(schema.validate("count", &json!(3)), Ok(json!(3)));
        assert!(schema.validate("count", &json!(-3)).is_err());
        assert_eq!(
            schema.validate("price", &json!({"amount": 5, "extra": true})),
            Ok(json!({"amount": 5}))
        );
        assert_eq!(schema.describe("price"), "Money");
        assert_eq!(schema.fields(), vec!["count".to_string(), "price".to_string()]);
    }

    #[test]
    fn raw_schema_uses_label() {
        let schema = RawSchema::new("Contract").field("foo", "even", |value| {
            match value.as_i64() {
                Some(v) if v % 2 == 0 => Ok(value.clone()),
                _ => Err("odd".into()),
            }
        });
        assert_eq!(schema.family(), Family::Raw);
        assert!(schema.validate("foo", &json!(3)).is_err());
        assert_eq!(schema.describe("foo"), "even");
    }

    #[test]
    fn same_spec_compares_identity() {
        let a: Arc<dyn Spec> = Arc::new(Schema::new("A"));
        let b: Arc<dyn Spec> = Arc::new(Schema::new("A"));
        assert!(same_spec(&a, &a.clone()));
        assert!(!same_spec(&a, &b));
    }
}
