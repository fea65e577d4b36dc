//! Annotation field definitions for a dataset.
//!
//! A [`Schema`] maps stable field ids to [`AnnotationField`] definitions in
//! the order the editor submitted them. Field labels are mutable but double
//! as the keys of stored annotation values, so they must be unique within
//! one schema.
//!
//! Wire format (also the persisted blob):
//!
//! ```text
//! {
//!   "f1": { "label": "Topic", "type": "dropdown",
//!           "options": [ { "o1": "Politics" }, { "o2": "Sports" } ] },
//!   "f2": { "label": "Notes", "type": "textarea" }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// The input kind of an annotation field.
///
/// Kinds the engine has no special handling for are kept verbatim in
/// [`FieldType::Other`]; they only ever take part in equality checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Textarea,
    Dropdown,
    Checkbox,
    Other(String),
}

impl FieldType {
    /// Return the type as the string used on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Dropdown => "dropdown",
            Self::Checkbox => "checkbox",
            Self::Other(s) => s,
        }
    }

    /// Parse a wire type string. Never fails; unknown kinds become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "text" => Self::Text,
            "textarea" => Self::Textarea,
            "dropdown" => Self::Dropdown,
            "checkbox" => Self::Checkbox,
            other => Self::Other(other.to_string()),
        }
    }

    /// Free-text kinds. Values survive a change between two of these.
    pub fn is_text_like(&self) -> bool {
        matches!(self, Self::Text | Self::Textarea)
    }

    /// Kinds whose values are option labels.
    pub fn is_option_bearing(&self) -> bool {
        matches!(self, Self::Dropdown | Self::Checkbox)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// One selectable value of a dropdown or checkbox field.
///
/// Serialized as a single-entry object `{ "<id>": "<label>" }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOption {
    pub id: String,
    pub label: String,
}

impl FieldOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

impl Serialize for FieldOption {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.id, &self.label)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldOption {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OptionVisitor;

        impl<'de> Visitor<'de> for OptionVisitor {
            type Value = FieldOption;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an option object with exactly one {id: label} entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FieldOption, A::Error> {
                let (id, label): (String, String) = map
                    .next_entry()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                if map.next_key::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(2, &self));
                }
                Ok(FieldOption { id, label })
            }
        }

        deserializer.deserialize_map(OptionVisitor)
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// One annotation input. Its id is the key it is stored under in [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationField {
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FieldOption>>,
}

impl AnnotationField {
    pub fn new(label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            label: label.into(),
            field_type,
            options: None,
        }
    }

    /// Builder-style helper attaching `(id, label)` options.
    pub fn with_options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options = Some(
            options
                .into_iter()
                .map(|(id, label)| FieldOption::new(id, label))
                .collect(),
        );
        self
    }

    /// Find an option by its stable id.
    pub fn option_by_id(&self, option_id: &str) -> Option<&FieldOption> {
        self.options
            .as_deref()
            .and_then(|opts| opts.iter().find(|o| o.id == option_id))
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// The ordered set of annotation fields of one dataset, keyed by field id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    fields: IndexMap<String, AnnotationField>,
}

/// Deserializes like a map but refuses a field id that appears twice
/// instead of silently keeping the last definition.
impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = Schema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping field ids to annotation fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Schema, A::Error> {
                let mut fields = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((id, field)) = map.next_entry::<String, AnnotationField>()? {
                    if fields.contains_key(&id) {
                        return Err(de::Error::custom(format!(
                            "annotation field id '{id}' appears more than once"
                        )));
                    }
                    fields.insert(id, field);
                }
                Ok(Schema { fields })
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for fixtures.
    pub fn with_field(mut self, id: impl Into<String>, field: AnnotationField) -> Self {
        self.fields.insert(id.into(), field);
        self
    }

    pub fn get(&self, id: &str) -> Option<&AnnotationField> {
        self.fields.get(id)
    }

    /// Iterate `(field_id, field)` pairs in submitted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnnotationField)> {
        self.fields.iter().map(|(id, f)| (id.as_str(), f))
    }

    /// Field labels in submitted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.values().map(|f| f.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reject schemas the reconciliation cannot handle unambiguously.
    ///
    /// Ids are unique by construction (map keys). Labels are storage keys,
    /// so they must be non-empty and unique. Options of dropdown/checkbox
    /// fields must have unique ids and unique, non-empty labels because the
    /// stored values are option labels.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen_labels: HashMap<&str, &str> = HashMap::with_capacity(self.fields.len());

        for (id, field) in &self.fields {
            if id.trim().is_empty() {
                return Err(CoreError::Validation(
                    "annotation field ids must not be empty".to_string(),
                ));
            }
            if field.label.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "annotation field '{id}' has an empty label"
                )));
            }
            if field.field_type.as_str().trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "annotation field '{id}' has an empty type"
                )));
            }
            if let Some(other) = seen_labels.insert(field.label.as_str(), id.as_str()) {
                return Err(CoreError::Validation(format!(
                    "annotation fields '{other}' and '{id}' share the label '{}'",
                    field.label
                )));
            }

            if field.field_type.is_option_bearing() {
                validate_options(id, field.options.as_deref().unwrap_or_default())?;
            }
        }

        Ok(())
    }

    /// Decode a persisted schema blob.
    pub fn decode(blob: &str) -> Result<Self, CoreError> {
        serde_json::from_str(blob).map_err(|e| {
            CoreError::Internal(format!("stored annotation fields do not decode: {e}"))
        })
    }

    /// Encode the schema as its persisted blob.
    pub fn encode(&self) -> Result<String, CoreError> {
        serde_json::to_string(self)
            .map_err(|e| CoreError::Internal(format!("annotation fields do not encode: {e}")))
    }
}

fn validate_options(field_id: &str, options: &[FieldOption]) -> Result<(), CoreError> {
    let mut ids: HashSet<&str> = HashSet::with_capacity(options.len());
    let mut labels: HashSet<&str> = HashSet::with_capacity(options.len());

    for option in options {
        if option.id.trim().is_empty() || option.label.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "annotation field '{field_id}' has an option with an empty id or label"
            )));
        }
        if !ids.insert(option.id.as_str()) {
            return Err(CoreError::Validation(format!(
                "annotation field '{field_id}' repeats option id '{}'",
                option.id
            )));
        }
        if !labels.insert(option.label.as_str()) {
            return Err(CoreError::Validation(format!(
                "annotation field '{field_id}' repeats option label '{}'",
                option.label
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
