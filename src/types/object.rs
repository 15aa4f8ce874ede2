//! The typed record: one Planhat entity as a kind-tagged JSON map.
//!
//! Planhat responses are only partially schematized, so a record keeps its
//! fields as a JSON object map and exposes typed accessors over the handful
//! of fields the client logic relies on. Mutation goes through [`Object::set`],
//! which converts temporal values to their ISO-8601 wire form and rejects
//! values JSON cannot carry.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{PlanhatError, Result};
use crate::transport::Response;
use crate::types::kind::{IdKind, ObjectKind};
use crate::types::list::ObjectList;

// ============================================================================
// Field values
// ============================================================================

/// Conversion into a JSON field value.
///
/// This is the wire-format seam: dates, datetimes and times become ISO-8601
/// text, durations become seconds, and non-finite floats are rejected here
/// so an encoded payload can never contain NaN or Infinity.
pub trait IntoFieldValue {
  fn into_field_value(self) -> Result<Value>;
}

impl IntoFieldValue for Value {
  fn into_field_value(self) -> Result<Value> {
    Ok(self)
  }
}

impl IntoFieldValue for Map<String, Value> {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::Object(self))
  }
}

impl IntoFieldValue for String {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::String(self))
  }
}

impl IntoFieldValue for &str {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::String(self.to_string()))
  }
}

impl IntoFieldValue for bool {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::Bool(self))
  }
}

impl IntoFieldValue for i32 {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::from(self))
  }
}

impl IntoFieldValue for i64 {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::from(self))
  }
}

impl IntoFieldValue for u64 {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::from(self))
  }
}

impl IntoFieldValue for usize {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::from(self))
  }
}

impl IntoFieldValue for f64 {
  fn into_field_value(self) -> Result<Value> {
    serde_json::Number::from_f64(self)
      .map(Value::Number)
      .ok_or_else(|| {
        PlanhatError::InvalidPayload(format!("non-finite float {self} is not valid JSON"))
      })
  }
}

impl IntoFieldValue for f32 {
  fn into_field_value(self) -> Result<Value> {
    (self as f64).into_field_value()
  }
}

impl IntoFieldValue for DateTime<Utc> {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::String(self.to_rfc3339()))
  }
}

impl IntoFieldValue for DateTime<FixedOffset> {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::String(self.to_rfc3339()))
  }
}

impl IntoFieldValue for NaiveDateTime {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::String(self.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
  }
}

impl IntoFieldValue for NaiveDate {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::String(self.format("%Y-%m-%d").to_string()))
  }
}

impl IntoFieldValue for NaiveTime {
  fn into_field_value(self) -> Result<Value> {
    Ok(Value::String(self.format("%H:%M:%S%.f").to_string()))
  }
}

impl IntoFieldValue for chrono::Duration {
  fn into_field_value(self) -> Result<Value> {
    // Durations travel as total seconds
    (self.num_milliseconds() as f64 / 1000.0).into_field_value()
  }
}

impl<T: IntoFieldValue> IntoFieldValue for Option<T> {
  fn into_field_value(self) -> Result<Value> {
    match self {
      Some(value) => value.into_field_value(),
      None => Ok(Value::Null),
    }
  }
}

impl<T: IntoFieldValue> IntoFieldValue for Vec<T> {
  fn into_field_value(self) -> Result<Value> {
    let values = self
      .into_iter()
      .map(IntoFieldValue::into_field_value)
      .collect::<Result<Vec<_>>>()?;
    Ok(Value::Array(values))
  }
}

// ============================================================================
// Object
// ============================================================================

/// One Planhat entity: a kind tag plus its JSON fields.
#[derive(Debug, Clone)]
pub struct Object {
  kind: ObjectKind,
  fields: Map<String, Value>,
}

impl Object {
  /// Create an empty record of the given kind.
  pub fn new(kind: ObjectKind) -> Self {
    Self {
      kind,
      fields: Map::new(),
    }
  }

  /// Create a record from an existing field map.
  pub fn from_map(kind: ObjectKind, fields: Map<String, Value>) -> Self {
    Self { kind, fields }
  }

  /// Create a record from a JSON value, which must be an object.
  pub fn from_value(kind: ObjectKind, value: Value) -> Result<Self> {
    match value {
      Value::Object(fields) => Ok(Self { kind, fields }),
      other => Err(PlanhatError::InvalidPayload(format!(
        "expected a JSON object for {kind}, got {other}"
      ))),
    }
  }

  /// Create a collection from a list of JSON objects.
  pub fn from_list(kind: ObjectKind, values: Vec<Value>) -> Result<ObjectList> {
    let mut list = ObjectList::for_kind(kind);
    for value in values {
      list.push(Self::from_value(kind, value)?)?;
    }
    Ok(list)
  }

  /// Decode a response body into a record or a collection, resolving the
  /// concrete kind from the request URL path.
  pub fn from_response(response: &Response) -> Result<Decoded> {
    let url = Url::parse(&response.url)
      .map_err(|e| PlanhatError::Resolution(format!("unparseable response URL {}: {e}", response.url)))?;
    let kind = ObjectKind::from_path(url.path())?;
    Self::from_response_as(kind, response)
  }

  /// Decode a response body into a record or collection of a known kind.
  pub fn from_response_as(kind: ObjectKind, response: &Response) -> Result<Decoded> {
    match &response.body {
      Value::Object(fields) => Ok(Decoded::Object(Self {
        kind,
        fields: fields.clone(),
      })),
      Value::Array(values) => {
        Self::from_list(kind, values.clone()).map(Decoded::List)
      }
      other => Err(PlanhatError::InvalidPayload(format!(
        "response body is neither an object nor a list: {other}"
      ))),
    }
  }

  /// The record's kind.
  pub fn kind(&self) -> ObjectKind {
    self.kind
  }

  // ==========================================================================
  // Identifier accessors
  // ==========================================================================

  fn str_field(&self, key: &str) -> &str {
    self.fields.get(key).and_then(Value::as_str).unwrap_or("")
  }

  /// The Planhat-assigned id (`_id`), or `""` when absent.
  pub fn id(&self) -> &str {
    self.str_field("_id")
  }

  /// The source CRM id (`sourceId`), or `""` when absent.
  pub fn source_id(&self) -> &str {
    self.str_field("sourceId")
  }

  /// The caller's own system id (`externalId`), or `""` when absent.
  pub fn external_id(&self) -> &str {
    self.str_field("externalId")
  }

  /// The identifier for the given scheme.
  pub fn id_of_kind(&self, id_kind: IdKind) -> &str {
    match id_kind {
      IdKind::Native => self.id(),
      IdKind::Source => self.source_id(),
      IdKind::External => self.external_id(),
    }
  }

  /// Whether `other` refers to the same Planhat object, determined by
  /// comparing the identifier triple: any pair that is non-empty on both
  /// sides and equal makes the records the same object.
  pub fn is_same_object(&self, other: &Object) -> bool {
    [IdKind::Native, IdKind::Source, IdKind::External]
      .iter()
      .any(|&id_kind| {
        let (a, b) = (self.id_of_kind(id_kind), other.id_of_kind(id_kind));
        !a.is_empty() && !b.is_empty() && a == b
      })
  }

  // ==========================================================================
  // Common field accessors
  // ==========================================================================

  /// The record's name, or `""` when absent.
  pub fn name(&self) -> &str {
    self.str_field("name")
  }

  /// The record's custom-field map, if any.
  pub fn custom(&self) -> Option<&Map<String, Value>> {
    self.fields.get("custom").and_then(Value::as_object)
  }

  /// The owning company id, read from `companyId` with `cId` as alias.
  pub fn company_id(&self) -> &str {
    let id = self.str_field("companyId");
    if id.is_empty() {
      self.str_field("cId")
    } else {
      id
    }
  }

  /// The owning company name, read from `companyName` with `cName` as alias.
  pub fn company_name(&self) -> &str {
    let name = self.str_field("companyName");
    if name.is_empty() {
      self.str_field("cName")
    } else {
      name
    }
  }

  /// Email address (endusers, users and tickets).
  pub fn email(&self) -> &str {
    self.str_field("email")
  }

  /// First name (users).
  pub fn first_name(&self) -> &str {
    self.str_field("firstName")
  }

  /// Last name (users).
  pub fn last_name(&self) -> &str {
    self.str_field("lastName")
  }

  /// Task type, `task` or `event` (tasks).
  pub fn task_type(&self) -> &str {
    self.str_field("type")
  }

  /// The singular name of the model owning a custom field.
  pub fn parent(&self) -> &str {
    self.str_field("parent")
  }

  /// The campaign this NPS record belongs to.
  pub fn campaign_id(&self) -> &str {
    self.str_field("campaignId")
  }

  fn str_list_field(&self, key: &str) -> Vec<&str> {
    self
      .fields
      .get(key)
      .and_then(Value::as_array)
      .map(|values| values.iter().filter_map(Value::as_str).collect())
      .unwrap_or_default()
  }

  /// Ids of the companies an issue is linked to.
  pub fn company_ids(&self) -> Vec<&str> {
    self.str_list_field("companyIds")
  }

  /// Names of the companies an issue is linked to.
  pub fn company_names(&self) -> Vec<&str> {
    self.str_list_field("companies")
  }

  /// Ids of the endusers an issue is linked to.
  pub fn enduser_ids(&self) -> Vec<&str> {
    self.str_list_field("enduserIds")
  }

  /// Names of the endusers an issue is linked to.
  pub fn enduser_names(&self) -> Vec<&str> {
    self.str_list_field("endusers")
  }

  // ==========================================================================
  // Metric accessors
  // ==========================================================================

  /// The metric's dimension id.
  pub fn dimension_id(&self) -> &str {
    self.str_field("dimensionId")
  }

  /// The metric's numeric value.
  pub fn value(&self) -> Option<f64> {
    self.fields.get("value").and_then(Value::as_f64)
  }

  /// The type-tag of the model object this metric describes
  /// (`Company`, `Asset`, ...).
  pub fn model(&self) -> &str {
    self.str_field("model")
  }

  /// Resolve the model type-tag to an object kind.
  pub fn model_kind(&self) -> Result<ObjectKind> {
    ObjectKind::from_name(self.model())
  }

  /// Id of the model object this metric describes.
  pub fn parent_id(&self) -> &str {
    self.str_field("parentId")
  }

  /// The metric day as days since 1970-01-01.
  pub fn day(&self) -> Option<i64> {
    self.fields.get("day").and_then(Value::as_i64)
  }

  fn datetime_field(&self, key: &str) -> Option<DateTime<Utc>> {
    let text = self.fields.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(text)
      .ok()
      .map(|dt| dt.with_timezone(&Utc))
  }

  /// The metric's time of record.
  pub fn time(&self) -> Option<DateTime<Utc>> {
    self.datetime_field("time")
  }

  /// The metric's calendar date.
  pub fn date(&self) -> Option<NaiveDate> {
    let text = self.fields.get("date")?.as_str()?;
    DateTime::parse_from_rfc3339(text)
      .map(|dt| dt.date_naive())
      .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
      .ok()
  }

  /// The Planhat-assigned ingestion timestamp (`timestamp.value`).
  pub fn timestamp(&self) -> Option<DateTime<Utc>> {
    let text = self.fields.get("timestamp")?.get("value")?.as_str()?;
    DateTime::parse_from_rfc3339(text)
      .ok()
      .map(|dt| dt.with_timezone(&Utc))
  }

  // ==========================================================================
  // Mutation
  // ==========================================================================

  /// Look up a raw field value.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.fields.get(key)
  }

  /// Set a field. Temporal values are converted to their ISO-8601 wire
  /// form; non-finite floats are rejected.
  pub fn set(&mut self, key: impl Into<String>, value: impl IntoFieldValue) -> Result<()> {
    self.fields.insert(key.into(), value.into_field_value()?);
    Ok(())
  }

  /// Remove a field, returning its previous value.
  pub fn remove_field(&mut self, key: &str) -> Option<Value> {
    self.fields.remove(key)
  }

  /// Copy every field of `other` into this record, overwriting existing
  /// values. This is the cache merge-on-write primitive.
  pub fn merge_fields(&mut self, other: &Object) {
    for (key, value) in &other.fields {
      self.fields.insert(key.clone(), value.clone());
    }
  }

  /// Borrow the underlying field map.
  pub fn fields(&self) -> &Map<String, Value> {
    &self.fields
  }

  // Infallible string-field builders for the common construction paths.

  /// Set the Planhat id and return the record.
  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.fields.insert("_id".to_string(), Value::String(id.into()));
    self
  }

  /// Set the source id and return the record.
  pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
    self
      .fields
      .insert("sourceId".to_string(), Value::String(source_id.into()));
    self
  }

  /// Set the external id and return the record.
  pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
    self
      .fields
      .insert("externalId".to_string(), Value::String(external_id.into()));
    self
  }

  /// Set the name and return the record.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.fields.insert("name".to_string(), Value::String(name.into()));
    self
  }

  /// Set the owning company id and return the record.
  pub fn with_company_id(mut self, company_id: impl Into<String>) -> Self {
    self
      .fields
      .insert("companyId".to_string(), Value::String(company_id.into()));
    self
  }

  /// Set the owning company name and return the record.
  pub fn with_company_name(mut self, company_name: impl Into<String>) -> Self {
    self
      .fields
      .insert("companyName".to_string(), Value::String(company_name.into()));
    self
  }

  /// Set the email address and return the record.
  pub fn with_email(mut self, email: impl Into<String>) -> Self {
    self.fields.insert("email".to_string(), Value::String(email.into()));
    self
  }

  // ==========================================================================
  // Wire form
  // ==========================================================================

  /// The URL path addressing this record, using the preferred id scheme if
  /// that id is present, else falling back native → source → external.
  pub fn get_urlpath(&self, id_kind: IdKind) -> Result<String> {
    let id = self.id_of_kind(id_kind);
    if !id.is_empty() {
      return Ok(format!(
        "/{}/{}{}",
        self.kind.api_name(),
        id_kind.prefix(),
        id
      ));
    }
    self.any_urlpath()
  }

  fn any_urlpath(&self) -> Result<String> {
    for id_kind in [IdKind::Native, IdKind::Source, IdKind::External] {
      if !self.id_of_kind(id_kind).is_empty() {
        return self.get_urlpath(id_kind);
      }
    }
    Err(PlanhatError::InvalidPayload(format!(
      "unable to determine an id for {self}"
    )))
  }

  /// The `/{collection}` path for this record's kind.
  pub fn type_urlpath(&self) -> String {
    self.kind.type_urlpath()
  }

  /// The record's fields as an owned JSON value.
  pub fn to_json(&self) -> Value {
    Value::Object(self.fields.clone())
  }

  /// Encode the record as a JSON byte payload for request bodies.
  pub fn encode(&self) -> Result<Vec<u8>> {
    serde_json::to_vec(&self.fields).map_err(|e| PlanhatError::InvalidPayload(e.to_string()))
  }
}

/// Equality is identifier-based (`is_same_object`), never a full-field
/// comparison.
impl PartialEq for Object {
  fn eq(&self, other: &Self) -> bool {
    self.is_same_object(other)
  }
}

impl fmt::Display for Object {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.kind.has_name() {
      write!(
        f,
        "{}(name={}, id={}, source_id={}, external_id={})",
        self.kind,
        self.name(),
        self.id(),
        self.source_id(),
        self.external_id()
      )
    } else {
      write!(
        f,
        "{}(id={}, source_id={}, external_id={})",
        self.kind,
        self.id(),
        self.source_id(),
        self.external_id()
      )
    }
  }
}

// ============================================================================
// Decoded response bodies
// ============================================================================

/// A decoded response body: a single record or a collection.
#[derive(Debug, Clone)]
pub enum Decoded {
  Object(Object),
  List(ObjectList),
}

impl Decoded {
  /// The single record, or a kind-mismatch error if the body was a list.
  pub fn into_object(self) -> Result<Object> {
    match self {
      Decoded::Object(obj) => Ok(obj),
      Decoded::List(list) => Err(PlanhatError::TypeMismatch(format!(
        "expected a single object, got a list of {}",
        list.len()
      ))),
    }
  }

  /// The collection; a single record is wrapped into a one-element list.
  pub fn into_list(self) -> ObjectList {
    match self {
      Decoded::Object(obj) => ObjectList::singleton(obj),
      Decoded::List(list) => list,
    }
  }
}
