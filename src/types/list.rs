//! Homogeneous, lazily-indexed collections of typed records.
//!
//! An [`ObjectList`] holds records of exactly one kind. The kind is fixed at
//! construction or inferred from the first record inserted, and every
//! mutation re-validates it. Identifier lookups go through lazily built
//! indexes guarded by a version counter: any mutation bumps the counter and
//! the next lookup rebuilds from scratch, so in-place replacement can never
//! serve stale results.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use serde_json::Value;

use crate::error::{PlanhatError, Result};
use crate::types::kind::{IdKind, ObjectKind};
use crate::types::object::Object;

#[derive(Debug, Default)]
struct Indexes {
  /// List version these indexes were built against.
  version: u64,
  by_id: Option<HashMap<String, usize>>,
  by_source_id: Option<HashMap<String, usize>>,
  by_external_id: Option<HashMap<String, usize>>,
  by_company_id: Option<HashMap<String, Vec<usize>>>,
  by_parent_id: Option<HashMap<String, Vec<usize>>>,
}

/// An ordered, kind-homogeneous collection of records.
///
/// Lookups cache their index interiorly, so the list is deliberately not
/// `Sync`; the crate's contract is single-threaded use.
#[derive(Debug)]
pub struct ObjectList {
  items: Vec<Object>,
  kind: Option<ObjectKind>,
  version: u64,
  indexes: RefCell<Indexes>,
}

impl Default for ObjectList {
  fn default() -> Self {
    Self::new()
  }
}

impl Clone for ObjectList {
  fn clone(&self) -> Self {
    Self {
      items: self.items.clone(),
      kind: self.kind,
      version: 0,
      indexes: RefCell::new(Indexes::default()),
    }
  }
}

impl ObjectList {
  /// Create an empty, untyped list. The kind is inferred from the first
  /// record inserted.
  pub fn new() -> Self {
    Self {
      items: Vec::new(),
      kind: None,
      version: 0,
      indexes: RefCell::new(Indexes::default()),
    }
  }

  /// Create an empty list fixed to the given kind.
  pub fn for_kind(kind: ObjectKind) -> Self {
    Self {
      kind: Some(kind),
      ..Self::new()
    }
  }

  /// Create a one-element list of the record's kind.
  pub fn singleton(obj: Object) -> Self {
    Self {
      kind: Some(obj.kind()),
      items: vec![obj],
      version: 0,
      indexes: RefCell::new(Indexes::default()),
    }
  }

  /// Create a list from records, inferring the kind from the first one.
  pub fn from_objects(objects: Vec<Object>) -> Result<Self> {
    let mut list = Self::new();
    list.extend(objects)?;
    Ok(list)
  }

  /// The collection's kind, or `None` while untyped.
  pub fn kind(&self) -> Option<ObjectKind> {
    self.kind
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Object> {
    self.items.iter()
  }

  pub fn get(&self, index: usize) -> Option<&Object> {
    self.items.get(index)
  }

  fn touch(&mut self) {
    self.version += 1;
  }

  fn mismatch(&self, expected: ObjectKind, actual: ObjectKind, index: usize) -> PlanhatError {
    PlanhatError::TypeMismatch(format!(
      "expected {expected}, got {actual} at index {index}"
    ))
  }

  fn check_kind(&self, obj: &Object, index: usize) -> Result<()> {
    match self.kind {
      Some(kind) if obj.kind() != kind => Err(self.mismatch(kind, obj.kind(), index)),
      _ => Ok(()),
    }
  }

  // ==========================================================================
  // Mutation
  // ==========================================================================

  /// Append a record, fixing the kind if the list is still untyped.
  pub fn push(&mut self, obj: Object) -> Result<()> {
    self.check_kind(&obj, self.items.len())?;
    self.kind.get_or_insert(obj.kind());
    self.items.push(obj);
    self.touch();
    Ok(())
  }

  /// Append every record. Validation runs before anything is inserted, so
  /// a kind mismatch leaves the list unchanged.
  pub fn extend(&mut self, objects: impl IntoIterator<Item = Object>) -> Result<()> {
    let objects: Vec<Object> = objects.into_iter().collect();
    let kind = self.kind.or_else(|| objects.first().map(Object::kind));
    if let Some(kind) = kind {
      for (offset, obj) in objects.iter().enumerate() {
        if obj.kind() != kind {
          return Err(self.mismatch(kind, obj.kind(), self.items.len() + offset));
        }
      }
    }
    if !objects.is_empty() {
      self.kind = kind;
    }
    self.items.extend(objects);
    self.touch();
    Ok(())
  }

  /// Insert a record at `index`, shifting the tail.
  pub fn insert(&mut self, index: usize, obj: Object) -> Result<()> {
    self.check_kind(&obj, index)?;
    self.kind.get_or_insert(obj.kind());
    self.items.insert(index, obj);
    self.touch();
    Ok(())
  }

  /// Replace the record at `index`, returning the previous one.
  pub fn replace(&mut self, index: usize, obj: Object) -> Result<Object> {
    self.check_kind(&obj, index)?;
    let old = std::mem::replace(&mut self.items[index], obj);
    self.touch();
    Ok(old)
  }

  /// Remove and return the record at `index`.
  pub fn remove(&mut self, index: usize) -> Object {
    let obj = self.items.remove(index);
    self.touch();
    obj
  }

  /// Remove the record with the given native id, if present.
  pub fn remove_by_id(&mut self, id: &str) -> Option<Object> {
    if id.is_empty() {
      return None;
    }
    let position = self.items.iter().position(|obj| obj.id() == id)?;
    let obj = self.items.remove(position);
    self.touch();
    Some(obj)
  }

  /// Merge a record into the list: the entry with the same native id is
  /// field-updated in place, otherwise the record is appended.
  pub fn merge_object(&mut self, obj: &Object) -> Result<()> {
    self.check_kind(obj, self.items.len())?;
    let id = obj.id();
    let position = if id.is_empty() {
      None
    } else {
      self.items.iter().position(|existing| existing.id() == id)
    };
    match position {
      Some(position) => {
        self.items[position].merge_fields(obj);
        self.touch();
        Ok(())
      }
      None => self.push(obj.clone()),
    }
  }

  /// Copy a sub-range into a new list of the same kind. Out-of-range
  /// bounds are clamped.
  pub fn slice(&self, range: Range<usize>) -> ObjectList {
    let end = range.end.min(self.items.len());
    let start = range.start.min(end);
    ObjectList {
      items: self.items[start..end].to_vec(),
      kind: self.kind,
      version: 0,
      indexes: RefCell::new(Indexes::default()),
    }
  }

  // ==========================================================================
  // Membership and lookups
  // ==========================================================================

  /// Whether a record with any matching identifier is in the list.
  /// This is identifier-based same-object equality, scanned linearly.
  pub fn is_obj_in_list(&self, obj: &Object) -> Result<bool> {
    self.check_kind(obj, 0)?;
    Ok(self.items.iter().any(|item| item.is_same_object(obj)))
  }

  fn with_fresh_indexes<R>(&self, f: impl FnOnce(&mut Indexes) -> R) -> R {
    let mut indexes = self.indexes.borrow_mut();
    if indexes.version != self.version {
      *indexes = Indexes {
        version: self.version,
        ..Indexes::default()
      };
    }
    f(&mut indexes)
  }

  fn kind_name(&self) -> &'static str {
    self.kind.map(|kind| kind.name()).unwrap_or("object")
  }

  fn position_by(
    &self,
    id: &str,
    select: fn(&mut Indexes) -> &mut Option<HashMap<String, usize>>,
    key_of: fn(&Object) -> &str,
  ) -> Option<usize> {
    if id.is_empty() {
      return None;
    }
    self.with_fresh_indexes(|indexes| {
      let slot = select(indexes);
      if slot.is_none() {
        let mut map = HashMap::new();
        for (position, obj) in self.items.iter().enumerate() {
          let key = key_of(obj);
          if !key.is_empty() {
            map.insert(key.to_string(), position);
          }
        }
        *slot = Some(map);
      }
      slot.as_ref().and_then(|map| map.get(id).copied())
    })
  }

  /// Find the record with the given native id.
  pub fn find_by_id(&self, id: &str) -> Result<&Object> {
    self
      .position_by(id, |indexes| &mut indexes.by_id, Object::id)
      .map(|position| &self.items[position])
      .ok_or_else(|| {
        PlanhatError::NotFound(format!("Unable to find {} with ID {id}.", self.kind_name()))
      })
  }

  /// Find the record with the given source id.
  pub fn find_by_source_id(&self, source_id: &str) -> Result<&Object> {
    self
      .position_by(source_id, |indexes| &mut indexes.by_source_id, Object::source_id)
      .map(|position| &self.items[position])
      .ok_or_else(|| {
        PlanhatError::NotFound(format!(
          "Unable to find {} with source ID {source_id}.",
          self.kind_name()
        ))
      })
  }

  /// Find the record with the given external id.
  pub fn find_by_external_id(&self, external_id: &str) -> Result<&Object> {
    self
      .position_by(
        external_id,
        |indexes| &mut indexes.by_external_id,
        Object::external_id,
      )
      .map(|position| &self.items[position])
      .ok_or_else(|| {
        PlanhatError::NotFound(format!(
          "Unable to find {} with external ID {external_id}.",
          self.kind_name()
        ))
      })
  }

  /// Find a record by the given identifier scheme.
  pub fn find_by_id_kind(&self, id: &str, id_kind: IdKind) -> Result<&Object> {
    match id_kind {
      IdKind::Native => self.find_by_id(id),
      IdKind::Source => self.find_by_source_id(id),
      IdKind::External => self.find_by_external_id(id),
    }
  }

  fn grouped_by(
    &self,
    id: &str,
    select: fn(&mut Indexes) -> &mut Option<HashMap<String, Vec<usize>>>,
    key_of: fn(&Object) -> &str,
  ) -> Option<Vec<usize>> {
    if id.is_empty() {
      return None;
    }
    self.with_fresh_indexes(|indexes| {
      let slot = select(indexes);
      if slot.is_none() {
        let mut map: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, obj) in self.items.iter().enumerate() {
          let key = key_of(obj);
          if !key.is_empty() {
            map.entry(key.to_string()).or_default().push(position);
          }
        }
        *slot = Some(map);
      }
      slot.as_ref().and_then(|map| map.get(id).cloned())
    })
  }

  fn collect_positions(&self, positions: Vec<usize>) -> ObjectList {
    let mut result = match self.kind {
      Some(kind) => ObjectList::for_kind(kind),
      None => ObjectList::new(),
    };
    result.items = positions
      .into_iter()
      .map(|position| self.items[position].clone())
      .collect();
    result
  }

  /// Find every record owned by the given company.
  ///
  /// Fails with a kind-mismatch error when the collection's kind is not
  /// company-owned, and with NotFound when no record matches.
  pub fn find_by_company_id(&self, company_id: &str) -> Result<ObjectList> {
    match self.kind {
      Some(kind) if kind.is_company_owned() => {}
      Some(kind) => {
        return Err(PlanhatError::TypeMismatch(format!(
          "cannot find {kind} objects by company ID because {kind} is not a company-owned kind"
        )))
      }
      None => {
        return Err(PlanhatError::NotFound(format!(
          "Unable to find objects with company ID {company_id}."
        )))
      }
    }
    self
      .grouped_by(company_id, |indexes| &mut indexes.by_company_id, Object::company_id)
      .map(|positions| self.collect_positions(positions))
      .ok_or_else(|| {
        PlanhatError::NotFound(format!(
          "Unable to find {} with company ID {company_id}.",
          self.kind_name()
        ))
      })
  }

  /// Find every metric describing the given parent object.
  pub fn find_by_parent_id(&self, parent_id: &str) -> Result<ObjectList> {
    match self.kind {
      Some(ObjectKind::Metric) => {}
      Some(kind) => {
        return Err(PlanhatError::TypeMismatch(format!(
          "cannot find {kind} objects by parent ID; only metric collections index parents"
        )))
      }
      None => {
        return Err(PlanhatError::NotFound(format!(
          "Unable to find objects with parent ID {parent_id}."
        )))
      }
    }
    self
      .grouped_by(parent_id, |indexes| &mut indexes.by_parent_id, Object::parent_id)
      .map(|positions| self.collect_positions(positions))
      .ok_or_else(|| {
        PlanhatError::NotFound(format!(
          "Unable to find {} with parent ID {parent_id}.",
          self.kind_name()
        ))
      })
  }

  // ==========================================================================
  // Wire form
  // ==========================================================================

  /// The `/{collection}` path for the collection's kind; fails while the
  /// list is still untyped.
  pub fn get_urlpath(&self) -> Result<String> {
    self
      .kind
      .map(ObjectKind::type_urlpath)
      .ok_or_else(|| {
        PlanhatError::Config("unable to determine a URL path for an untyped list".to_string())
      })
  }

  /// The collection as an owned JSON array.
  pub fn to_json(&self) -> Value {
    Value::Array(self.items.iter().map(Object::to_json).collect())
  }

  /// Encode the collection as a JSON byte payload for request bodies.
  pub fn encode(&self) -> Result<Vec<u8>> {
    serde_json::to_vec(&self.to_json()).map_err(|e| PlanhatError::InvalidPayload(e.to_string()))
  }
}

impl std::ops::Index<usize> for ObjectList {
  type Output = Object;

  fn index(&self, index: usize) -> &Object {
    &self.items[index]
  }
}

impl IntoIterator for ObjectList {
  type Item = Object;
  type IntoIter = std::vec::IntoIter<Object>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.into_iter()
  }
}

impl<'a> IntoIterator for &'a ObjectList {
  type Item = &'a Object;
  type IntoIter = std::slice::Iter<'a, Object>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

impl fmt::Display for ObjectList {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}[{} items]", self.kind_name(), self.items.len())
  }
}
