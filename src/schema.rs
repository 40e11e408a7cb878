//! Explicit field schema tables consulted at the request boundary.
//!
//! Each path declares a `&'static [FieldSchema]`. [`FieldData::parse`] checks raw request data
//! against it (types, required fields, defaults, validators) and yields typed values before any
//! business logic runs.

// self
use crate::{_prelude::*, error::UserError};

/// Raw request payload as decoded from the wire.
pub type RawData = serde_json::Map<String, serde_json::Value>;

/// Validator hook run against a parsed field value.
pub type Validator = fn(&FieldValue) -> Result<(), UserError>;

/// Wire shape of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
	/// A single string; numbers and booleans are accepted and stringified.
	String,
	/// A list of strings, given as a JSON array or as one comma-separated string.
	CommaStringSlice,
}

/// One row of a schema table.
#[derive(Clone, Copy, Debug)]
pub struct FieldSchema {
	/// Field name on the wire.
	pub name: &'static str,
	/// Expected shape.
	pub kind: FieldKind,
	/// Rejects requests that omit the field.
	pub required: bool,
	/// Raw value used when the field is omitted.
	pub default: Option<&'static str>,
	/// Extra semantic check.
	pub validator: Option<Validator>,
	/// Operator-facing description.
	pub description: &'static str,
}
impl FieldSchema {
	/// Optional string field without default.
	pub const fn string(name: &'static str, description: &'static str) -> Self {
		Self {
			name,
			kind: FieldKind::String,
			required: false,
			default: None,
			validator: None,
			description,
		}
	}

	/// Optional comma-separated list field.
	pub const fn strings(name: &'static str, description: &'static str) -> Self {
		Self { kind: FieldKind::CommaStringSlice, ..Self::string(name, description) }
	}

	/// Marks the field as required.
	pub const fn required(mut self) -> Self {
		self.required = true;

		self
	}

	/// Sets the raw default used when the field is omitted.
	pub const fn with_default(mut self, default: &'static str) -> Self {
		self.default = Some(default);

		self
	}

	/// Attaches a validator.
	pub const fn with_validator(mut self, validator: Validator) -> Self {
		self.validator = Some(validator);

		self
	}

	fn decode(&self, raw: &serde_json::Value) -> Result<FieldValue, UserError> {
		use serde_json::Value;

		let invalid =
			|reason: &str| UserError::InvalidField { field: self.name, reason: reason.into() };

		match (self.kind, raw) {
			(FieldKind::String, Value::String(s)) => Ok(FieldValue::String(s.clone())),
			(FieldKind::String, Value::Number(n)) => Ok(FieldValue::String(n.to_string())),
			(FieldKind::String, Value::Bool(b)) => Ok(FieldValue::String(b.to_string())),
			(FieldKind::String, Value::Null) => Ok(FieldValue::String(String::new())),
			(FieldKind::String, _) => Err(invalid("expected a string")),
			(FieldKind::CommaStringSlice, Value::String(s)) =>
				Ok(FieldValue::Strings(split_comma(s))),
			(FieldKind::CommaStringSlice, Value::Array(items)) => items
				.iter()
				.map(|item| match item {
					Value::String(s) => Ok(s.trim().to_owned()),
					Value::Number(n) => Ok(n.to_string()),
					_ => Err(invalid("expected a list of strings")),
				})
				.filter(|item| !matches!(item, Ok(s) if s.is_empty()))
				.collect::<Result<Vec<_>, _>>()
				.map(FieldValue::Strings),
			(FieldKind::CommaStringSlice, Value::Null) => Ok(FieldValue::Strings(Vec::new())),
			(FieldKind::CommaStringSlice, _) => Err(invalid("expected a list of strings")),
		}
	}

	fn empty(&self) -> FieldValue {
		match self.kind {
			FieldKind::String => FieldValue::String(String::new()),
			FieldKind::CommaStringSlice => FieldValue::Strings(Vec::new()),
		}
	}
}

/// Typed value produced by the schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
	/// Value of a [`FieldKind::String`] field.
	String(String),
	/// Value of a [`FieldKind::CommaStringSlice`] field.
	Strings(Vec<String>),
}

/// Request data checked against a schema table.
#[derive(Clone, Debug)]
pub struct FieldData {
	values: BTreeMap<&'static str, FieldValue>,
}
impl FieldData {
	/// Validates `raw` against `schema`.
	///
	/// Fields absent from the schema are ignored.
	pub fn parse(schema: &[FieldSchema], raw: &RawData) -> Result<Self, UserError> {
		let mut values = BTreeMap::new();

		for field in schema {
			let value = match (raw.get(field.name), field.default) {
				(Some(value), _) => field.decode(value)?,
				(None, Some(default)) => field.decode(&serde_json::Value::from(default))?,
				(None, None) if field.required =>
					return Err(UserError::MissingField { field: field.name }),
				(None, None) => field.empty(),
			};

			if let Some(validator) = field.validator {
				validator(&value)?;
			}

			values.insert(field.name, value);
		}

		Ok(Self { values })
	}

	/// String value of `name`; empty when the field is unknown or not a string.
	pub fn string(&self, name: &str) -> String {
		match self.values.get(name) {
			Some(FieldValue::String(s)) => s.clone(),
			_ => String::new(),
		}
	}

	/// List value of `name`; empty when the field is unknown or not a list.
	pub fn strings(&self, name: &str) -> Vec<String> {
		match self.values.get(name) {
			Some(FieldValue::Strings(items)) => items.clone(),
			_ => Vec::new(),
		}
	}
}

fn split_comma(raw: &str) -> Vec<String> {
	raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect()
}
