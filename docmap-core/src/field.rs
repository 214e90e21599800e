//! Typed, validating, defaultable field descriptors.
//!
//! A [`Field`] describes one attribute of a schema: its kind, default,
//! required flag, allowed choices, and custom validators. Validation follows
//! a fixed order: type coercion first, then required/choices checks, then
//! custom validators. Kind-specific checks (bounds, lengths, regex) run as
//! part of coercion.
//!
//! Validation is pure with respect to the owning document: a field never
//! mutates the document it belongs to. The document's set path stores the
//! coerced value. The only side effect permitted here is attaching a
//! non-owning parent back-reference to document-typed items the first time
//! they are validated under a given owner.

use bson::{Bson, oid::ObjectId};
use chrono::{DateTime as ChronoDateTime, Utc};
use regex::Regex;
use std::{fmt, sync::Arc};

use crate::{
    document::ParentRef,
    error::{DocmapError, DocmapResult},
    schema::SchemaRegistry,
    value::Value,
};

/// A side-effect-only value check registered on a field.
pub type ValidatorFn = Arc<dyn Fn(&Value) -> DocmapResult<()> + Send + Sync>;

/// A zero-argument default factory.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// The default of a field, distinguishable from "no default".
#[derive(Clone)]
pub enum FieldDefault {
    /// No default configured; reads of an unset field yield nothing.
    None,
    /// A fixed default value.
    Value(Bson),
    /// A factory invoked on every defaulted read.
    Factory(DefaultFn),
}

/// The concrete kind of a field, with kind-specific configuration.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// UTF-8 string with optional pattern and length constraints.
    String {
        regex: Option<Regex>,
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    /// Signed integer with optional inclusive bounds.
    Integer { min: Option<i64>, max: Option<i64> },
    /// Double-precision float with optional inclusive bounds.
    Float { min: Option<f64>, max: Option<f64> },
    /// Boolean accepting the literals `0`, `1`, `true`, `false`, `"on"`,
    /// `"off"`.
    Boolean,
    /// UTC timestamp. `auto_now` always reads as the current time;
    /// `auto_created` is stamped once on first read. The two are mutually
    /// exclusive.
    Timestamp { auto_now: bool, auto_created: bool },
    /// Homogeneous list; each item is coerced through the item kind.
    List { item: Option<Box<FieldKind>> },
    /// Keyed map with an optional homogeneous value kind.
    Map { value: Option<Box<FieldKind>> },
    /// An embedded instance of the named schema. Non-conforming input is
    /// coerced through that schema's `create`.
    Embedded { schema: String },
    /// Opaque stored identifier (ObjectId).
    Id,
}

impl FieldKind {
    fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String { .. } => "string",
            FieldKind::Integer { .. } => "integer",
            FieldKind::Float { .. } => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Timestamp { .. } => "timestamp",
            FieldKind::List { .. } => "list",
            FieldKind::Map { .. } => "map",
            FieldKind::Embedded { .. } => "embedded document",
            FieldKind::Id => "object id",
        }
    }
}

/// A typed, validating, defaultable attribute descriptor.
///
/// Fields are declared with a kind constructor and configured with chainable
/// setters:
///
/// ```ignore
/// use docmap_core::field::Field;
///
/// let title = Field::string().max_length(120).required();
/// let status = Field::string().choices(["draft", "published"]);
/// let created = Field::timestamp().auto_created();
/// ```
#[derive(Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    default: FieldDefault,
    required: bool,
    choices: Option<Vec<Bson>>,
    validators: Vec<ValidatorFn>,
}

impl Field {
    fn with_kind(kind: FieldKind) -> Self {
        Self {
            name: String::new(),
            kind,
            default: FieldDefault::None,
            required: false,
            choices: None,
            validators: Vec::new(),
        }
    }

    /// A string field.
    pub fn string() -> Self {
        Self::with_kind(FieldKind::String { regex: None, min_length: None, max_length: None })
    }

    /// A signed integer field.
    pub fn integer() -> Self {
        Self::with_kind(FieldKind::Integer { min: None, max: None })
    }

    /// A double-precision float field.
    pub fn float() -> Self {
        Self::with_kind(FieldKind::Float { min: None, max: None })
    }

    /// A boolean field accepting boolean-ish literals.
    pub fn boolean() -> Self {
        Self::with_kind(FieldKind::Boolean)
    }

    /// A UTC timestamp field.
    pub fn timestamp() -> Self {
        Self::with_kind(FieldKind::Timestamp { auto_now: false, auto_created: false })
    }

    /// An untyped list field; items are stored as-is.
    pub fn list() -> Self {
        Self::with_kind(FieldKind::List { item: None })
    }

    /// A homogeneous list field; every item is coerced through `item`.
    pub fn list_of(item: FieldKind) -> Self {
        Self::with_kind(FieldKind::List { item: Some(Box::new(item)) })
    }

    /// An untyped keyed-map field.
    pub fn map() -> Self {
        Self::with_kind(FieldKind::Map { value: None })
    }

    /// A keyed-map field whose values are coerced through `value`.
    pub fn map_of(value: FieldKind) -> Self {
        Self::with_kind(FieldKind::Map { value: Some(Box::new(value)) })
    }

    /// An embedded document field holding an instance of the named schema.
    ///
    /// The schema is resolved by name at validation time, so forward
    /// references to schemas registered later are fine.
    pub fn embedded(schema: impl Into<String>) -> Self {
        Self::with_kind(FieldKind::Embedded { schema: schema.into() })
    }

    /// An opaque identifier field.
    pub fn id() -> Self {
        Self::with_kind(FieldKind::Id)
    }

    /// Overrides the public name. When unset, the name is assigned from the
    /// attribute name at schema-registration time.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Marks the field required: empty values fail validation.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restricts the field to the given set of allowed values.
    pub fn choices(mut self, choices: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Sets a fixed default value.
    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    /// Sets a zero-argument default factory, invoked on each defaulted read.
    pub fn default_with(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = FieldDefault::Factory(Arc::new(factory));
        self
    }

    /// Appends a custom validator. Validators run in registration order,
    /// after coercion and required/choices checks.
    pub fn validator(
        mut self,
        check: impl Fn(&Value) -> DocmapResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.validators.push(Arc::new(check));
        self
    }

    /// Requires string values to match `regex`. Applies to string fields.
    pub fn matches(mut self, pattern: Regex) -> Self {
        if let FieldKind::String { regex, .. } = &mut self.kind {
            *regex = Some(pattern);
        }
        self
    }

    /// Sets the minimum string length. Applies to string fields.
    pub fn min_length(mut self, length: usize) -> Self {
        if let FieldKind::String { min_length, .. } = &mut self.kind {
            *min_length = Some(length);
        }
        self
    }

    /// Sets the maximum string length. Applies to string fields.
    pub fn max_length(mut self, length: usize) -> Self {
        if let FieldKind::String { max_length, .. } = &mut self.kind {
            *max_length = Some(length);
        }
        self
    }

    /// Sets the inclusive lower bound. Applies to integer fields.
    pub fn min_int(mut self, bound: i64) -> Self {
        if let FieldKind::Integer { min, .. } = &mut self.kind {
            *min = Some(bound);
        }
        self
    }

    /// Sets the inclusive upper bound. Applies to integer fields.
    pub fn max_int(mut self, bound: i64) -> Self {
        if let FieldKind::Integer { max, .. } = &mut self.kind {
            *max = Some(bound);
        }
        self
    }

    /// Sets the inclusive lower bound. Applies to float fields.
    pub fn min_float(mut self, bound: f64) -> Self {
        if let FieldKind::Float { min, .. } = &mut self.kind {
            *min = Some(bound);
        }
        self
    }

    /// Sets the inclusive upper bound. Applies to float fields.
    pub fn max_float(mut self, bound: f64) -> Self {
        if let FieldKind::Float { max, .. } = &mut self.kind {
            *max = Some(bound);
        }
        self
    }

    /// Makes reads always return the current UTC time. Applies to timestamp
    /// fields; mutually exclusive with [`auto_created`](Self::auto_created).
    pub fn auto_now(mut self) -> Self {
        if let FieldKind::Timestamp { auto_now, .. } = &mut self.kind {
            *auto_now = true;
        }
        self
    }

    /// Stamps the current UTC time once, lazily, on the first read of an
    /// unset value. Applies to timestamp fields; mutually exclusive with
    /// [`auto_now`](Self::auto_now).
    pub fn auto_created(mut self) -> Self {
        if let FieldKind::Timestamp { auto_created, .. } = &mut self.kind {
            *auto_created = true;
        }
        self
    }

    /// The public name of this field.
    pub fn field_name(&self) -> &str {
        &self.name
    }

    /// The kind descriptor of this field.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether this field must hold a non-empty value.
    pub fn is_required(&self) -> bool {
        self.required
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        if self.name.is_empty() {
            self.name = name.to_string();
        }
    }

    /// Computes the default for an unset read, invoking the factory if one
    /// is configured. Returns `None` when no default exists.
    pub(crate) fn default_value_instance(&self) -> Option<Value> {
        match &self.default {
            FieldDefault::None => None,
            FieldDefault::Value(bson) => Some(Value::Bson(bson.clone())),
            FieldDefault::Factory(factory) => Some(factory()),
        }
    }

    /// Rejects invalid kind configuration at schema-definition time.
    pub(crate) fn check_config(&self) -> DocmapResult<()> {
        if let FieldKind::Timestamp { auto_now: true, auto_created: true } = self.kind {
            return Err(DocmapError::Definition(format!(
                "field \"{}\": auto_now and auto_created are mutually exclusive",
                self.name
            )));
        }
        Ok(())
    }

    /// Validates and coerces `value`.
    ///
    /// Check order is fixed: type coercion (with kind checks) first, then
    /// required/choices, then custom validators. `owner` identifies the
    /// document the value is being assigned into; document-typed items are
    /// given a back-reference to it.
    pub fn validate(
        &self,
        value: Value,
        registry: &SchemaRegistry,
        owner: Option<&ParentRef>,
    ) -> DocmapResult<Value> {
        let value = if value.is_empty() {
            value
        } else {
            coerce_kind(&self.kind, &self.name, value, registry, owner)?
        };

        if !value.is_empty() {
            if let Some(choices) = &self.choices {
                let allowed = value
                    .as_bson()
                    .map(|bson| choices.contains(bson))
                    .unwrap_or(false);
                if !allowed {
                    return Err(DocmapError::Validation(format!(
                        "field \"{}\" is {:?}; must be one of {:?}",
                        self.name, value, choices
                    )));
                }
            }
        } else if self.required {
            return Err(DocmapError::Validation(format!(
                "field \"{}\" is required, but got an empty value",
                self.name
            )));
        }

        for check in &self.validators {
            check(&value)?;
        }

        Ok(value)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("choices", &self.choices)
            .finish_non_exhaustive()
    }
}

fn type_error(name: &str, kind: &FieldKind, value: &Value) -> DocmapError {
    DocmapError::Validation(format!(
        "field \"{}\" must be {}, not {:?}",
        name,
        kind.type_name(),
        value
    ))
}

/// Attaches a parent back-reference to document-typed values.
///
/// The reference is set the first time an item without one is validated
/// under an owner; revalidation under the same owner leaves it untouched.
/// Reassignment under a different owner replaces the stale reference.
fn adopt(value: Value, owner: Option<&ParentRef>) -> Value {
    match (value, owner) {
        (Value::Document(mut doc), Some(parent)) => {
            doc.adopt(parent.clone());
            Value::Document(doc)
        }
        (value, _) => value,
    }
}

/// Coerces `value` into the shape `kind` expects, running kind checks.
pub(crate) fn coerce_kind(
    kind: &FieldKind,
    name: &str,
    value: Value,
    registry: &SchemaRegistry,
    owner: Option<&ParentRef>,
) -> DocmapResult<Value> {
    match kind {
        FieldKind::String { regex, min_length, max_length } => {
            // Most values could be stringified, so only accept real strings
            // to avoid implicit conversion.
            let text = match value {
                Value::Bson(Bson::String(text)) => text,
                other => return Err(type_error(name, kind, &other)),
            };
            if let Some(max) = max_length {
                if text.chars().count() > *max {
                    return Err(DocmapError::Validation(format!(
                        "string value of \"{name}\" field is too long"
                    )));
                }
            }
            if let Some(min) = min_length {
                if text.chars().count() < *min {
                    return Err(DocmapError::Validation(format!(
                        "string value of \"{name}\" field is too short"
                    )));
                }
            }
            if let Some(pattern) = regex {
                if !pattern.is_match(&text) {
                    return Err(DocmapError::Validation(format!(
                        "string value of \"{name}\" field did not match regex"
                    )));
                }
            }
            Ok(Value::Bson(Bson::String(text)))
        }

        FieldKind::Integer { min, max } => {
            let number = match &value {
                Value::Bson(Bson::Int32(n)) => *n as i64,
                Value::Bson(Bson::Int64(n)) => *n,
                Value::Bson(Bson::Double(n)) if n.fract() == 0.0 => *n as i64,
                // Numeric strings are accepted for compatibility with raw
                // query results.
                Value::Bson(Bson::String(text)) => text
                    .parse::<i64>()
                    .map_err(|_| type_error(name, kind, &value))?,
                _ => return Err(type_error(name, kind, &value)),
            };
            if let Some(bound) = min {
                if number < *bound {
                    return Err(DocmapError::Validation(format!(
                        "value of \"{name}\" field cannot be less than {bound}"
                    )));
                }
            }
            if let Some(bound) = max {
                if number > *bound {
                    return Err(DocmapError::Validation(format!(
                        "value of \"{name}\" field cannot be greater than {bound}"
                    )));
                }
            }
            Ok(Value::Bson(Bson::Int64(number)))
        }

        FieldKind::Float { min, max } => {
            let number = match &value {
                Value::Bson(Bson::Double(n)) => *n,
                Value::Bson(Bson::Int32(n)) => *n as f64,
                Value::Bson(Bson::Int64(n)) => *n as f64,
                Value::Bson(Bson::String(text)) => text
                    .parse::<f64>()
                    .map_err(|_| type_error(name, kind, &value))?,
                _ => return Err(type_error(name, kind, &value)),
            };
            if let Some(bound) = min {
                if number < *bound {
                    return Err(DocmapError::Validation(format!(
                        "value of \"{name}\" field cannot be less than {bound}"
                    )));
                }
            }
            if let Some(bound) = max {
                if number > *bound {
                    return Err(DocmapError::Validation(format!(
                        "value of \"{name}\" field cannot be greater than {bound}"
                    )));
                }
            }
            Ok(Value::Bson(Bson::Double(number)))
        }

        FieldKind::Boolean => {
            let flag = match &value {
                Value::Bson(Bson::Boolean(flag)) => *flag,
                Value::Bson(Bson::Int32(0)) | Value::Bson(Bson::Int64(0)) => false,
                Value::Bson(Bson::Int32(1)) | Value::Bson(Bson::Int64(1)) => true,
                Value::Bson(Bson::String(text)) if text == "on" => true,
                Value::Bson(Bson::String(text)) if text == "off" => false,
                _ => return Err(type_error(name, kind, &value)),
            };
            Ok(Value::Bson(Bson::Boolean(flag)))
        }

        FieldKind::Timestamp { .. } => match &value {
            Value::Bson(Bson::DateTime(_)) => Ok(value),
            Value::Bson(Bson::String(text)) => {
                let parsed = ChronoDateTime::parse_from_rfc3339(text)
                    .map_err(|_| type_error(name, kind, &value))?;
                Ok(Value::Bson(Bson::DateTime(bson::DateTime::from_chrono(
                    parsed.with_timezone(&Utc),
                ))))
            }
            _ => Err(type_error(name, kind, &value)),
        },

        FieldKind::List { item } => {
            let items = match value {
                Value::List(items) => items,
                Value::Bson(Bson::Array(array)) => {
                    array.into_iter().map(Value::Bson).collect()
                }
                other => return Err(type_error(name, kind, &other)),
            };
            let Some(item_kind) = item else {
                return Ok(Value::List(items));
            };
            let coerced = items
                .into_iter()
                .map(|item| {
                    coerce_kind(item_kind, name, item, registry, owner)
                        .map(|item| adopt(item, owner))
                        .map_err(|_| {
                            DocmapError::Validation(format!(
                                "list item for \"{}\" field must be {}",
                                name,
                                item_kind.type_name()
                            ))
                        })
                })
                .collect::<DocmapResult<Vec<Value>>>()?;
            Ok(Value::List(coerced))
        }

        FieldKind::Map { value: value_kind } => {
            let entries: Vec<(String, Value)> = match value {
                Value::Map(entries) => entries.into_iter().collect(),
                Value::Bson(Bson::Document(doc)) => {
                    doc.into_iter().map(|(k, v)| (k, Value::Bson(v))).collect()
                }
                other => return Err(type_error(name, kind, &other)),
            };
            let Some(value_kind) = value_kind else {
                return Ok(Value::Map(entries.into_iter().collect()));
            };
            let coerced = entries
                .into_iter()
                .map(|(key, item)| {
                    let item = coerce_kind(value_kind, name, item, registry, owner)
                        .map(|item| adopt(item, owner))
                        .map_err(|_| {
                            DocmapError::Validation(format!(
                                "map value for \"{}\" field must be {}",
                                name,
                                value_kind.type_name()
                            ))
                        })?;
                    Ok((key, item))
                })
                .collect::<DocmapResult<std::collections::BTreeMap<String, Value>>>()?;
            Ok(Value::Map(coerced))
        }

        FieldKind::Embedded { schema } => {
            let target = registry.get(schema).ok_or_else(|| {
                DocmapError::Definition(format!(
                    "embedded schema \"{schema}\" for field \"{name}\" is not registered"
                ))
            })?;
            let doc = match value {
                Value::Document(doc) if doc.schema_name() == schema => doc,
                // Non-conforming input goes through the target schema's
                // factory, including instances of a different schema.
                Value::Document(mut other) => target.create(other.to_document()?)?,
                Value::Bson(Bson::Document(raw)) => target.create(raw)?,
                other => return Err(type_error(name, kind, &other)),
            };
            Ok(adopt(Value::Document(doc), owner))
        }

        FieldKind::Id => match &value {
            Value::Bson(Bson::ObjectId(_)) => Ok(value),
            Value::Bson(Bson::String(text)) => {
                let oid = ObjectId::parse_str(text)
                    .map_err(|_| type_error(name, kind, &value))?;
                Ok(Value::Bson(Bson::ObjectId(oid)))
            }
            _ => Err(type_error(name, kind, &value)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    fn validate(field: Field, value: impl Into<Value>) -> DocmapResult<Value> {
        let registry = SchemaRegistry::new();
        field.name("probe").validate(value.into(), &registry, None)
    }

    #[test]
    fn boolean_accepts_boolean_ish_literals() {
        for (raw, expected) in [
            (Value::from(1i32), true),
            (Value::from(0i32), false),
            (Value::from(true), true),
            (Value::from(false), false),
            (Value::from("on"), true),
            (Value::from("off"), false),
        ] {
            let coerced = validate(Field::boolean(), raw).unwrap();
            assert_eq!(coerced, Value::from(expected));
        }
    }

    #[test]
    fn boolean_rejects_other_values() {
        assert!(validate(Field::boolean(), "yes").is_err());
        assert!(validate(Field::boolean(), 2i32).is_err());
    }

    #[test]
    fn integer_coerces_and_checks_bounds() {
        assert_eq!(
            validate(Field::integer(), "42").unwrap(),
            Value::from(42i64)
        );
        assert_eq!(
            validate(Field::integer(), 7i32).unwrap(),
            Value::from(7i64)
        );
        assert!(validate(Field::integer().min_int(10), 5i64).is_err());
        assert!(validate(Field::integer().max_int(10), 15i64).is_err());
        assert!(validate(Field::integer(), 1.5f64).is_err());
    }

    #[test]
    fn string_rejects_implicit_conversion() {
        assert!(validate(Field::string(), 42i64).is_err());
    }

    #[test]
    fn string_checks_lengths_and_regex() {
        assert!(validate(Field::string().max_length(3), "long").is_err());
        assert!(validate(Field::string().min_length(3), "ab").is_err());
        let pattern = Regex::new(r"^[a-z]+$").unwrap();
        assert!(validate(Field::string().matches(pattern.clone()), "ok").is_ok());
        assert!(validate(Field::string().matches(pattern), "NO").is_err());
    }

    #[test]
    fn choices_restrict_values() {
        let field = || Field::string().choices(["draft", "published"]);
        assert!(validate(field(), "draft").is_ok());
        assert!(validate(field(), "deleted").is_err());
    }

    #[test]
    fn required_rejects_empty() {
        assert!(validate(Field::string().required(), Value::Bson(Bson::Null)).is_err());
        assert!(validate(Field::string(), Value::Bson(Bson::Null)).is_ok());
    }

    #[test]
    fn custom_validators_run_after_coercion() {
        let field = Field::integer().validator(|value| {
            match value.as_bson() {
                Some(Bson::Int64(n)) if n % 2 == 0 => Ok(()),
                _ => Err(DocmapError::Validation("must be even".into())),
            }
        });
        assert!(validate(field.clone(), "4").is_ok());
        assert!(validate(field, 3i64).is_err());
    }

    #[test]
    fn timestamp_parses_rfc3339() {
        let coerced = validate(Field::timestamp(), "2024-03-01T10:30:00Z").unwrap();
        assert!(matches!(coerced, Value::Bson(Bson::DateTime(_))));
        assert!(validate(Field::timestamp(), "not a time").is_err());
    }

    #[test]
    fn id_parses_hex_strings() {
        let coerced = validate(Field::id(), "507f1f77bcf86cd799439011").unwrap();
        assert!(matches!(coerced, Value::Bson(Bson::ObjectId(_))));
        assert!(validate(Field::id(), "nope").is_err());
    }

    #[test]
    fn conflicting_auto_modes_fail_config_check() {
        let field = Field::timestamp().auto_now().auto_created();
        assert!(field.check_config().is_err());
    }

    #[test]
    fn untyped_list_keeps_items() {
        let coerced = validate(
            Field::list(),
            Value::Bson(Bson::Array(vec![Bson::Int32(1), Bson::String("a".into())])),
        )
        .unwrap();
        assert_eq!(coerced.as_list().unwrap().len(), 2);
    }

    #[test]
    fn typed_list_coerces_every_item() {
        let field = Field::list_of(FieldKind::Integer { min: None, max: None });
        let coerced = validate(
            field.clone(),
            Value::Bson(Bson::Array(vec![Bson::String("1".into()), Bson::Int32(2)])),
        )
        .unwrap();
        assert_eq!(
            coerced.as_list().unwrap(),
            &[Value::from(1i64), Value::from(2i64)]
        );
        assert!(validate(
            field,
            Value::Bson(Bson::Array(vec![Bson::String("x".into())]))
        )
        .is_err());
    }
}
