//! The Planhat client: read-through caching, pagination and batching in
//! front of the transport.
//!
//! The client owns a per-kind cache of full-object collections. Reads are
//! served from the cache when possible and populate it on first access;
//! writes always go to the network and merge their results back into any
//! populated cache entry. All server-imposed size limits (page sizes, the
//! company-id filter length, the bulk upsert chunk size) are handled here
//! so callers see complete result sets.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{PlanhatError, Result};
use crate::transport::{Host, HttpTransport, Method, Params, Transport};
use crate::types::{IdKind, Object, ObjectKind, ObjectList};

/// Maximum number of records per bulk upsert request.
const BULK_CHUNK_SIZE: usize = 5000;
/// Maximum concatenated character length of a company-id filter.
const COMPANY_ID_FILTER_MAX_CHARS: usize = 2000;

/// A day expressed as days since 1970-01-01, as the dimension-data endpoint
/// expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochDay(pub i64);

impl From<i64> for EpochDay {
  fn from(day: i64) -> Self {
    Self(day)
  }
}

impl From<NaiveDate> for EpochDay {
  fn from(date: NaiveDate) -> Self {
    // NaiveDate::default() is the 1970-01-01 epoch
    Self((date - NaiveDate::default()).num_days())
  }
}

/// Filters for a time-series metric fetch.
#[derive(Debug, Clone, Default)]
pub struct DimensionDataQuery {
  /// Restrict to one company (`cId`).
  pub company_id: Option<String>,
  /// Restrict to one dimension (`dimid`).
  pub dimension_id: Option<String>,
  /// Start day, inclusive (`from`).
  pub from_day: Option<EpochDay>,
  /// End day (`to`).
  pub to_day: Option<EpochDay>,
  /// Cap on the total number of records fetched across pages.
  pub max_records: Option<usize>,
}

/// Server response(s) from a bulk upsert: the single body when one request
/// sufficed, or one body per chunk in request order.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkUpsertResponse {
  Single(Value),
  Batched(Vec<Value>),
}

/// Client for the Planhat API.
///
/// Retrieval methods cache full-object collections per kind; subsequent
/// calls for the same kind are served from memory until caching is turned
/// off (which clears the cache) or the process ends. Fetches that select a
/// subset of properties bypass the cache entirely and never populate it.
pub struct PlanhatClient<T: Transport = HttpTransport> {
  transport: T,
  config: Config,
  cache: HashMap<ObjectKind, ObjectList>,
  use_caching: bool,
}

impl PlanhatClient<HttpTransport> {
  /// Build a client over the blocking HTTP transport.
  ///
  /// Fails with a configuration error, before any network call, if the
  /// configuration has no API key.
  pub fn new(config: Config) -> Result<Self> {
    let transport = HttpTransport::new(config.clone())?;
    Ok(Self::with_transport(transport, config))
  }
}

impl<T: Transport> PlanhatClient<T> {
  /// Build a client over a caller-supplied transport.
  pub fn with_transport(transport: T, config: Config) -> Self {
    Self {
      transport,
      config,
      cache: HashMap::new(),
      use_caching: true,
    }
  }

  /// Borrow the underlying transport.
  pub fn transport(&self) -> &T {
    &self.transport
  }

  /// Whether retrieved collections are cached.
  pub fn use_caching(&self) -> bool {
    self.use_caching
  }

  /// Toggle caching. Turning caching off clears the cache immediately.
  pub fn set_use_caching(&mut self, use_caching: bool) {
    self.use_caching = use_caching;
    if !use_caching {
      self.cache.clear();
    }
  }

  // ==========================================================================
  // Fetch engine
  // ==========================================================================

  /// Fetch the complete set of records for a kind straight from the API,
  /// paging and batching as the server limits require. Does not consult or
  /// populate the cache.
  fn fetch_objects(
    &self,
    kind: ObjectKind,
    company_ids: Option<&[&str]>,
    properties: Option<&[&str]>,
  ) -> Result<ObjectList> {
    if let Some(ids) = company_ids {
      let filter_len: usize = ids.iter().map(|id| id.len()).sum();
      if filter_len > COMPANY_ID_FILTER_MAX_CHARS {
        let batches = batch_company_ids(ids);
        debug!(
          kind = kind.name(),
          filter_len,
          batches = batches.len(),
          "company-id filter over limit, splitting"
        );
        let mut full = ObjectList::for_kind(kind);
        for batch in &batches {
          full.extend(self.fetch_objects(kind, Some(batch), properties)?)?;
        }
        return Ok(full);
      }
    }

    let limit = kind.page_limit();
    let mut params: Params = vec![("limit".to_string(), limit.to_string())];
    if let Some(ids) = company_ids {
      params.push(("companyId".to_string(), ids.join(",")));
    }
    if let Some(props) = properties {
      params.push(("select".to_string(), props.join(",")));
    }

    let mut full = ObjectList::for_kind(kind);
    let mut offset = 0usize;
    loop {
      debug!(kind = kind.name(), offset, "requesting page");
      let mut page_params = params.clone();
      page_params.push(("offset".to_string(), offset.to_string()));
      let response =
        self
          .transport
          .request(Method::GET, Host::Api, &kind.type_urlpath(), &page_params, None)?;
      let page = Object::from_response_as(kind, &response)?.into_list();
      let count = page.len();
      full.extend(page)?;
      if count < limit {
        break;
      }
      offset += limit;
    }
    debug!(kind = kind.name(), found = full.len(), "fetch complete");
    Ok(full)
  }

  /// Fetch from the API and fold full-object results into a populated
  /// cache entry. Property-selected fetches never touch the cache.
  fn fetch_and_cache(
    &mut self,
    kind: ObjectKind,
    company_ids: Option<&[&str]>,
    properties: Option<&[&str]>,
  ) -> Result<ObjectList> {
    let found = self.fetch_objects(kind, company_ids, properties)?;
    if self.use_caching && properties.is_none() {
      self.merge_into_cache(kind, found.iter())?;
    }
    Ok(found)
  }

  /// Merge objects into the cache entry for `kind`, if one is populated:
  /// matched by native id, updated in place on hit, appended on miss.
  fn merge_into_cache<'a>(
    &mut self,
    kind: ObjectKind,
    objects: impl IntoIterator<Item = &'a Object>,
  ) -> Result<()> {
    if let Some(cached) = self.cache.get_mut(&kind) {
      for obj in objects {
        cached.merge_object(obj)?;
      }
    }
    Ok(())
  }

  /// The cached collection for `kind`, populating it with a full fetch on
  /// first access.
  fn cached_objects(&mut self, kind: ObjectKind) -> Result<&ObjectList> {
    if !self.cache.contains_key(&kind) {
      let list = self.fetch_objects(kind, None, None)?;
      self.cache.insert(kind, list);
    }
    self
      .cache
      .get(&kind)
      .ok_or_else(|| PlanhatError::NotFound(format!("no cached {kind} collection")))
  }

  // ==========================================================================
  // Retrieval
  // ==========================================================================

  /// Get all objects of `kind`, optionally restricted to the given
  /// companies and/or to a subset of properties.
  ///
  /// With caching enabled and no property selection, results come from the
  /// per-kind cache, which is populated on first access; company-id filters
  /// are partitioned into cache hits and misses and only the misses hit the
  /// network. A property selection (or caching disabled) always goes to the
  /// network. Pass `"ALL"` as a property to request every field.
  ///
  /// Zero matching records is a NotFound error; use
  /// [`get_objects_or_empty`](Self::get_objects_or_empty) when an empty
  /// collection is an acceptable outcome.
  pub fn get_objects(
    &mut self,
    kind: ObjectKind,
    company_ids: Option<&[&str]>,
    properties: Option<&[&str]>,
  ) -> Result<ObjectList> {
    let objects = self.get_objects_or_empty(kind, company_ids, properties)?;
    if objects.is_empty() {
      return Err(PlanhatError::NotFound(format!(
        "no {} found",
        kind.descriptor().plural
      )));
    }
    Ok(objects)
  }

  /// [`get_objects`](Self::get_objects) without the NotFound-on-empty
  /// policy: zero records yields an empty collection.
  pub fn get_objects_or_empty(
    &mut self,
    kind: ObjectKind,
    company_ids: Option<&[&str]>,
    properties: Option<&[&str]>,
  ) -> Result<ObjectList> {
    if !self.use_caching || properties.is_some() {
      return self.fetch_and_cache(kind, company_ids, properties);
    }

    let Some(ids) = company_ids else {
      return Ok(self.cached_objects(kind)?.clone());
    };

    // Partition the filter into cache hits and misses. Companies match on
    // their own id, owned kinds on their company id.
    let (hits, misses) = {
      let cached = self.cached_objects(kind)?;
      let mut hits: Vec<Object> = Vec::new();
      let mut covered: HashSet<&str> = HashSet::new();
      for obj in cached.iter() {
        let key = if kind == ObjectKind::Company {
          obj.id()
        } else {
          obj.company_id()
        };
        if !key.is_empty() && ids.contains(&key) {
          covered.insert(key);
          hits.push(obj.clone());
        }
      }
      let misses: Vec<String> = ids
        .iter()
        .filter(|id| !covered.contains(**id))
        .map(|id| id.to_string())
        .collect();
      (hits, misses)
    };

    let mut result = ObjectList::for_kind(kind);
    result.extend(hits)?;
    if !misses.is_empty() {
      debug!(kind = kind.name(), misses = misses.len(), "fetching cache misses");
      let miss_refs: Vec<&str> = misses.iter().map(String::as_str).collect();
      result.extend(self.fetch_and_cache(kind, Some(&miss_refs), None)?)?;
    }
    Ok(result)
  }

  /// Get a single object by id, trying the cache's index first (by the
  /// given id scheme) and falling back to a direct fetch on miss.
  pub fn get_object_by_id(&mut self, kind: ObjectKind, id: &str, id_kind: IdKind) -> Result<Object> {
    if self.use_caching {
      if let Ok(obj) = self.cached_objects(kind)?.find_by_id_kind(id, id_kind) {
        return Ok(obj.clone());
      }
    }
    let path = format!("/{}/{}{}", kind.api_name(), id_kind.prefix(), id);
    let response = self
      .transport
      .request(Method::GET, Host::Api, &path, &Params::new(), None)?;
    Object::from_response_as(kind, &response)?.into_object()
  }

  /// List every company through the lean companies endpoint, which returns
  /// only names and ids and is not subject to the 5000-object page limit.
  /// Bypasses the cache.
  pub fn list_all_companies(&self) -> Result<ObjectList> {
    let response =
      self
        .transport
        .request(Method::GET, Host::Api, "/leancompanies", &Params::new(), None)?;
    let companies = Object::from_response_as(ObjectKind::Company, &response)?.into_list();
    if companies.is_empty() {
      return Err(PlanhatError::NotFound("No companies found.".to_string()));
    }
    Ok(companies)
  }

  /// Of the given objects, return those that do not exist in Planhat,
  /// judged by identifier-based same-object equality against the full
  /// collection of their kind.
  pub fn find_missing_objects(&mut self, objects: &ObjectList) -> Result<ObjectList> {
    let Some(kind) = objects.kind() else {
      return Ok(ObjectList::new());
    };
    let fetched;
    let known: &ObjectList = if self.use_caching {
      self.cached_objects(kind)?
    } else {
      fetched = self.fetch_objects(kind, None, None)?;
      &fetched
    };
    let mut missing = ObjectList::for_kind(kind);
    for obj in objects.iter() {
      if !known.is_obj_in_list(obj)? {
        missing.push(obj.clone())?;
      }
    }
    Ok(missing)
  }

  // ==========================================================================
  // Writes
  // ==========================================================================

  /// Create an object. The payload must not carry a Planhat id.
  pub fn create_object(&mut self, payload: &Object) -> Result<Object> {
    let response = self.transport.request(
      Method::POST,
      Host::Api,
      &payload.type_urlpath(),
      &Params::new(),
      Some(payload.encode()?),
    )?;
    let created = Object::from_response_as(payload.kind(), &response)?.into_object()?;
    self.merge_into_cache(payload.kind(), std::iter::once(&created))?;
    Ok(created)
  }

  /// Update an object, addressed by the first of its native, source or
  /// external id that is set.
  pub fn update_object(&mut self, payload: &Object) -> Result<Object> {
    let response = self.transport.request(
      Method::PUT,
      Host::Api,
      &payload.get_urlpath(IdKind::Native)?,
      &Params::new(),
      Some(payload.encode()?),
    )?;
    let updated = Object::from_response_as(payload.kind(), &response)?.into_object()?;
    self.merge_into_cache(payload.kind(), std::iter::once(&updated))?;
    Ok(updated)
  }

  /// Bulk upsert a collection. Planhat matches each record by native,
  /// source or external id to decide between create and update.
  ///
  /// Payloads over 5000 records are split into consecutive chunks of at
  /// most 5000, one request per chunk in order; any chunk failing fails
  /// the whole call.
  pub fn update_objects(&mut self, payload: &ObjectList) -> Result<BulkUpsertResponse> {
    let urlpath = payload.get_urlpath()?;
    let Some(kind) = payload.kind() else {
      // get_urlpath already rejects untyped lists
      return Err(PlanhatError::Config(
        "unable to determine a URL path for an untyped list".to_string(),
      ));
    };

    let result = if payload.len() > BULK_CHUNK_SIZE {
      let mut responses = Vec::new();
      let mut start = 0;
      while start < payload.len() {
        let end = (start + BULK_CHUNK_SIZE).min(payload.len());
        debug!(kind = kind.name(), start, end, "upserting chunk");
        let chunk = payload.slice(start..end);
        let response = self.transport.request(
          Method::PUT,
          Host::Api,
          &urlpath,
          &Params::new(),
          Some(chunk.encode()?),
        )?;
        responses.push(response.body);
        start = end;
      }
      BulkUpsertResponse::Batched(responses)
    } else {
      let response = self.transport.request(
        Method::PUT,
        Host::Api,
        &urlpath,
        &Params::new(),
        Some(payload.encode()?),
      )?;
      BulkUpsertResponse::Single(response.body)
    };

    // The server only returns an upsert summary, so the affected payload
    // objects are what gets merged.
    self.merge_into_cache(kind, payload.iter())?;
    Ok(result)
  }

  /// Delete an object, addressed like [`update_object`](Self::update_object).
  /// Returns the server's response body.
  pub fn delete_object(&mut self, payload: &Object) -> Result<Value> {
    let response = self.transport.request(
      Method::DELETE,
      Host::Api,
      &payload.get_urlpath(IdKind::Native)?,
      &Params::new(),
      None,
    )?;
    if let Some(cached) = self.cache.get_mut(&payload.kind()) {
      cached.remove_by_id(payload.id());
    }
    Ok(response.body)
  }

  // ==========================================================================
  // Time-series metrics
  // ==========================================================================

  /// Fetch dimension data, paging until exhausted or until
  /// `query.max_records` is reached. The final page's limit shrinks so the
  /// cap is never exceeded. May return an empty collection.
  pub fn get_dimension_data(&self, query: &DimensionDataQuery) -> Result<ObjectList> {
    let mut params: Params = Vec::new();
    if let Some(company_id) = &query.company_id {
      params.push(("cId".to_string(), company_id.clone()));
    }
    if let Some(dimension_id) = &query.dimension_id {
      params.push(("dimid".to_string(), dimension_id.clone()));
    }
    if let Some(from_day) = query.from_day {
      params.push(("from".to_string(), from_day.0.to_string()));
    }
    if let Some(to_day) = query.to_day {
      params.push(("to".to_string(), to_day.0.to_string()));
    }

    let page_limit = ObjectKind::Metric.page_limit();
    let mut data = ObjectList::for_kind(ObjectKind::Metric);
    let mut offset = 0usize;
    loop {
      let limit = match query.max_records {
        Some(cap) => {
          let remaining = cap.saturating_sub(data.len());
          if remaining == 0 {
            break;
          }
          page_limit.min(remaining)
        }
        None => page_limit,
      };
      let mut page_params = params.clone();
      page_params.push(("limit".to_string(), limit.to_string()));
      page_params.push(("offset".to_string(), offset.to_string()));
      let response =
        self
          .transport
          .request(Method::GET, Host::Api, "/dimensiondata", &page_params, None)?;
      let page = Object::from_response_as(ObjectKind::Metric, &response)?.into_list();
      let count = page.len();
      data.extend(page)?;
      if count < limit {
        break;
      }
      offset += limit;
    }
    debug!(found = data.len(), "dimension data fetch complete");
    Ok(data)
  }

  // ==========================================================================
  // Analytics ingestion
  // ==========================================================================

  /// Post one activity to the analytics host. Requires a tenant UUID in the
  /// configuration; fails with a configuration error before any network
  /// call otherwise.
  pub fn create_activity(&self, activity: &Value) -> Result<Value> {
    let tenant_uuid = self.config.require_tenant_uuid()?;
    let path = format!("/analytics/{tenant_uuid}");
    let body =
      serde_json::to_vec(activity).map_err(|e| PlanhatError::InvalidPayload(e.to_string()))?;
    let response =
      self
        .transport
        .request(Method::POST, Host::Analytics, &path, &Params::new(), Some(body))?;
    Ok(response.body)
  }

  /// Post a batch of activities to the analytics host.
  pub fn create_bulk_activities(&self, activities: &[Value]) -> Result<Value> {
    let tenant_uuid = self.config.require_tenant_uuid()?;
    let path = format!("/analytics/bulk/{tenant_uuid}");
    let body =
      serde_json::to_vec(activities).map_err(|e| PlanhatError::InvalidPayload(e.to_string()))?;
    let response =
      self
        .transport
        .request(Method::POST, Host::Analytics, &path, &Params::new(), Some(body))?;
    Ok(response.body)
  }
}

/// Split a company-id filter into ordered batches whose concatenated
/// character length stays within the server limit. Greedy and
/// order-preserving; ids are never split across batches.
fn batch_company_ids<'a>(ids: &[&'a str]) -> Vec<Vec<&'a str>> {
  let mut batches: Vec<Vec<&str>> = Vec::new();
  let mut current: Vec<&str> = Vec::new();
  let mut current_len = 0usize;
  for &id in ids {
    if current_len + id.len() > COMPANY_ID_FILTER_MAX_CHARS && !current.is_empty() {
      batches.push(std::mem::take(&mut current));
      current_len = 0;
    }
    current.push(id);
    current_len += id.len();
  }
  if !current.is_empty() {
    batches.push(current);
  }
  batches
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transport::{status_error, Response};
  use serde_json::json;
  use std::cell::RefCell;
  use std::collections::VecDeque;

  #[derive(Debug, Clone)]
  struct Call {
    method: Method,
    host: Host,
    path: String,
    params: Params,
    body: Option<Value>,
  }

  impl Call {
    fn param(&self, key: &str) -> Option<&str> {
      self
        .params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
    }
  }

  /// Scripted transport: hands out queued responses in order and records
  /// every request it sees.
  #[derive(Default)]
  struct FakeTransport {
    calls: RefCell<Vec<Call>>,
    responses: RefCell<VecDeque<Result<Response>>>,
  }

  impl FakeTransport {
    fn push_json(&self, body: Value) {
      self.responses.borrow_mut().push_back(Ok(Response {
        status: 200,
        url: "https://api.planhat.com/".to_string(),
        body,
      }));
    }

    fn push_error(&self, err: PlanhatError) {
      self.responses.borrow_mut().push_back(Err(err));
    }

    fn calls(&self) -> Vec<Call> {
      self.calls.borrow().clone()
    }
  }

  impl Transport for FakeTransport {
    fn request(
      &self,
      method: Method,
      host: Host,
      path: &str,
      params: &Params,
      body: Option<Vec<u8>>,
    ) -> Result<Response> {
      self.calls.borrow_mut().push(Call {
        method,
        host,
        path: path.to_string(),
        params: params.clone(),
        body: body.map(|bytes| serde_json::from_slice(&bytes).unwrap()),
      });
      self
        .responses
        .borrow_mut()
        .pop_front()
        .unwrap_or_else(|| panic!("no scripted response for {path}"))
    }
  }

  fn client() -> PlanhatClient<FakeTransport> {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
    PlanhatClient::with_transport(
      FakeTransport::default(),
      Config::new("test-key").with_tenant_uuid("tenant-1"),
    )
  }

  fn company(id: &str, name: &str) -> Value {
    json!({"_id": id, "name": name})
  }

  fn company_page() -> Value {
    json!([company("1", "Test Company 1"), company("2", "Test Company 2")])
  }

  fn ids_page(prefix: &str, count: usize) -> Value {
    Value::Array(
      (0..count)
        .map(|i| json!({"_id": format!("{prefix}-{i}")}))
        .collect(),
    )
  }

  // ==========================================================================
  // Pagination
  // ==========================================================================

  #[test]
  fn test_pagination_walks_offsets_until_short_page() {
    let mut client = client();
    client.set_use_caching(false);
    client.transport().push_json(ids_page("a", 2000));
    client.transport().push_json(ids_page("b", 2000));
    client.transport().push_json(ids_page("c", 500));

    let endusers = client.get_objects(ObjectKind::Enduser, None, None).unwrap();

    assert_eq!(endusers.len(), 4500);
    // Concatenated in request order
    assert_eq!(endusers[0].id(), "a-0");
    assert_eq!(endusers[2000].id(), "b-0");
    assert_eq!(endusers[4499].id(), "c-499");

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 3);
    for (call, offset) in calls.iter().zip(["0", "2000", "4000"]) {
      assert_eq!(call.method, Method::GET);
      assert_eq!(call.path, "/endusers");
      assert_eq!(call.param("limit"), Some("2000"));
      assert_eq!(call.param("offset"), Some(offset));
    }
  }

  #[test]
  fn test_company_pages_use_the_larger_limit() {
    let mut client = client();
    client.set_use_caching(false);
    client.transport().push_json(company_page());

    client.get_objects(ObjectKind::Company, None, None).unwrap();

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].param("limit"), Some("5000"));
  }

  #[test]
  fn test_zero_records_is_not_found_by_default() {
    let mut client = client();
    client.set_use_caching(false);
    client.transport().push_json(json!([]));
    assert!(matches!(
      client.get_objects(ObjectKind::Company, None, None),
      Err(PlanhatError::NotFound(_))
    ));

    client.transport().push_json(json!([]));
    let empty = client
      .get_objects_or_empty(ObjectKind::Company, None, None)
      .unwrap();
    assert!(empty.is_empty());
  }

  #[test]
  fn test_single_object_response_is_wrapped() {
    let mut client = client();
    client.set_use_caching(false);
    client.transport().push_json(company("1", "Test Company 1"));

    let companies = client
      .get_objects(ObjectKind::Company, Some(&["1"]), None)
      .unwrap();
    assert_eq!(companies.len(), 1);
    assert_eq!(companies[0].id(), "1");
    assert_eq!(client.transport().calls()[0].param("companyId"), Some("1"));
  }

  // ==========================================================================
  // Company-id filter batching
  // ==========================================================================

  #[test]
  fn test_batch_company_ids_respects_length_limit() {
    let ids: Vec<String> = (0..5).map(|i| format!("{i}").repeat(600)).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let batches = batch_company_ids(&id_refs);

    assert_eq!(batches.len(), 2);
    for batch in &batches {
      let concatenated: usize = batch.iter().map(|id| id.len()).sum();
      assert!(concatenated <= COMPANY_ID_FILTER_MAX_CHARS);
    }
    // Order preserved, nothing dropped or split
    let flattened: Vec<&str> = batches.iter().flatten().copied().collect();
    assert_eq!(flattened, id_refs);
  }

  #[test]
  fn test_oversized_filter_fetches_in_batches() {
    let mut client = client();
    client.set_use_caching(false);

    let ids: Vec<String> = (0..4).map(|i| format!("{i}").repeat(600)).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    client.transport().push_json(json!([company("1", "One")]));
    client.transport().push_json(json!([company("2", "Two")]));

    let companies = client
      .get_objects(ObjectKind::Company, Some(&id_refs), None)
      .unwrap();

    // Batch results concatenate in batch order
    assert_eq!(companies.len(), 2);
    assert_eq!(companies[0].id(), "1");
    assert_eq!(companies[1].id(), "2");

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
      calls[0].param("companyId"),
      Some(ids[..3].join(",").as_str())
    );
    assert_eq!(calls[1].param("companyId"), Some(ids[3].as_str()));
  }

  // ==========================================================================
  // Caching
  // ==========================================================================

  #[test]
  fn test_cache_serves_repeat_fetches() {
    let mut client = client();
    client.transport().push_json(company_page());

    let first = client.get_objects(ObjectKind::Company, None, None).unwrap();
    let second = client.get_objects(ObjectKind::Company, None, None).unwrap();

    assert_eq!(client.transport().calls().len(), 1);
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(second[1].name(), "Test Company 2");
  }

  #[test]
  fn test_properties_fetch_bypasses_and_does_not_alter_cache() {
    let mut client = client();
    client.transport().push_json(company_page());
    client.get_objects(ObjectKind::Company, None, None).unwrap();

    client
      .transport()
      .push_json(json!([{"_id": "1", "name": "Projected"}]));
    let projected = client
      .get_objects(ObjectKind::Company, Some(&["1"]), Some(&["name"]))
      .unwrap();
    assert_eq!(projected[0].name(), "Projected");

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].param("select"), Some("name"));

    // The cached full-object collection is untouched
    let cached = client
      .get_object_by_id(ObjectKind::Company, "1", IdKind::Native)
      .unwrap();
    assert_eq!(cached.name(), "Test Company 1");
    assert_eq!(client.transport().calls().len(), 2);
  }

  #[test]
  fn test_company_filter_partitions_hits_and_misses() {
    let mut client = client();
    client.transport().push_json(company_page());
    client.get_objects(ObjectKind::Company, None, None).unwrap();

    client.transport().push_json(company("3", "Test Company 3"));
    let companies = client
      .get_objects(ObjectKind::Company, Some(&["2", "3"]), None)
      .unwrap();

    assert_eq!(companies.len(), 2);
    assert_eq!(companies[0].id(), "2");
    assert_eq!(companies[1].id(), "3");

    // Only the miss went to the network
    let calls = client.transport().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].param("companyId"), Some("3"));

    // And the miss was folded into the cache
    let cached = client
      .get_object_by_id(ObjectKind::Company, "3", IdKind::Native)
      .unwrap();
    assert_eq!(cached.name(), "Test Company 3");
    assert_eq!(client.transport().calls().len(), 2);
  }

  #[test]
  fn test_owned_kind_filter_matches_on_company_id() {
    let mut client = client();
    client.transport().push_json(json!([
      {"_id": "e1", "companyId": "1"},
      {"_id": "e2", "companyId": "2"},
    ]));
    client.get_objects(ObjectKind::Enduser, None, None).unwrap();

    // All hits: no further network traffic
    let endusers = client
      .get_objects(ObjectKind::Enduser, Some(&["1"]), None)
      .unwrap();
    assert_eq!(endusers.len(), 1);
    assert_eq!(endusers[0].id(), "e1");
    assert_eq!(client.transport().calls().len(), 1);
  }

  #[test]
  fn test_disabling_caching_clears_the_cache() {
    let mut client = client();
    client.transport().push_json(company_page());
    client.get_objects(ObjectKind::Company, None, None).unwrap();
    assert!(!client.cache.is_empty());

    client.set_use_caching(false);
    assert!(client.cache.is_empty());

    client.transport().push_json(company_page());
    client.get_objects(ObjectKind::Company, None, None).unwrap();
    assert_eq!(client.transport().calls().len(), 2);
    assert!(client.cache.is_empty());
  }

  // ==========================================================================
  // Single-object reads
  // ==========================================================================

  #[test]
  fn test_get_object_by_id_uses_cache_index() {
    let mut client = client();
    client.transport().push_json(company_page());
    client.get_objects(ObjectKind::Company, None, None).unwrap();

    let company = client
      .get_object_by_id(ObjectKind::Company, "2", IdKind::Native)
      .unwrap();
    assert_eq!(company.name(), "Test Company 2");
    assert_eq!(client.transport().calls().len(), 1);
  }

  #[test]
  fn test_get_object_by_id_falls_back_to_network_on_cache_miss() {
    let mut client = client();
    client.transport().push_json(company_page());
    client.get_objects(ObjectKind::Company, None, None).unwrap();

    client.transport().push_json(company("4", "Test Company 4"));
    let company = client
      .get_object_by_id(ObjectKind::Company, "4", IdKind::Native)
      .unwrap();
    assert_eq!(company.name(), "Test Company 4");

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].path, "/companies/4");
  }

  #[test]
  fn test_get_object_by_alternate_id_prefixes_the_path() {
    let mut client = client();
    client.set_use_caching(false);
    client
      .transport()
      .push_json(json!({"_id": "1", "name": "Test Company 1", "externalId": "1a"}));

    let company = client
      .get_object_by_id(ObjectKind::Company, "1a", IdKind::External)
      .unwrap();
    assert_eq!(company.id(), "1");
    assert_eq!(client.transport().calls()[0].path, "/companies/extid-1a");
  }

  #[test]
  fn test_get_object_by_id_404_is_not_found_and_leaves_cache_alone() {
    let mut client = client();
    client.set_use_caching(false);
    client.transport().push_error(status_error(404, "gone"));

    let result = client.get_object_by_id(ObjectKind::Company, "2", IdKind::Native);
    assert!(matches!(result, Err(PlanhatError::NotFound(_))));
    assert!(client.cache.is_empty());
  }

  // ==========================================================================
  // Writes
  // ==========================================================================

  #[test]
  fn test_create_object_posts_and_merges_into_cache() {
    let mut client = client();
    client.transport().push_json(company_page());
    client.get_objects(ObjectKind::Company, None, None).unwrap();

    client.transport().push_json(company("3", "Test Company 3"));
    let created = client
      .create_object(&Object::new(ObjectKind::Company).with_name("Test Company 3"))
      .unwrap();
    assert_eq!(created.id(), "3");

    let calls = client.transport().calls();
    assert_eq!(calls[1].method, Method::POST);
    assert_eq!(calls[1].path, "/companies");
    assert_eq!(calls[1].body, Some(json!({"name": "Test Company 3"})));

    // Cache picked up the created object
    let cached = client
      .get_object_by_id(ObjectKind::Company, "3", IdKind::Native)
      .unwrap();
    assert_eq!(cached.name(), "Test Company 3");
    assert_eq!(client.transport().calls().len(), 2);
  }

  #[test]
  fn test_create_object_does_not_populate_an_empty_cache() {
    let mut client = client();
    client.transport().push_json(company("1", "Test Company 1"));
    client
      .create_object(&Object::new(ObjectKind::Company).with_name("Test Company 1"))
      .unwrap();
    assert!(client.cache.is_empty());
  }

  #[test]
  fn test_update_object_puts_to_the_object_path() {
    let mut client = client();
    client.transport().push_json(company_page());
    client.get_objects(ObjectKind::Company, None, None).unwrap();

    client
      .transport()
      .push_json(json!({"_id": "2", "name": "Updated"}));
    let payload = Object::new(ObjectKind::Company)
      .with_id("2")
      .with_name("Updated");
    let updated = client.update_object(&payload).unwrap();
    assert_eq!(updated.name(), "Updated");

    let calls = client.transport().calls();
    assert_eq!(calls[1].method, Method::PUT);
    assert_eq!(calls[1].path, "/companies/2");

    // In-place cache merge
    let cached = client
      .get_object_by_id(ObjectKind::Company, "2", IdKind::Native)
      .unwrap();
    assert_eq!(cached.name(), "Updated");
    assert_eq!(client.transport().calls().len(), 2);
  }

  #[test]
  fn test_update_objects_single_request_under_chunk_size() {
    let mut client = client();
    client.set_use_caching(false);
    let summary = json!({"created": 2, "updated": 0});
    client.transport().push_json(summary.clone());

    let payload = ObjectList::from_objects(vec![
      Object::new(ObjectKind::Company)
        .with_external_id("1a")
        .with_name("Test Company 1"),
      Object::new(ObjectKind::Company)
        .with_external_id("2a")
        .with_name("Test Company 2"),
    ])
    .unwrap();

    let response = client.update_objects(&payload).unwrap();
    assert_eq!(response, BulkUpsertResponse::Single(summary));

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, Method::PUT);
    assert_eq!(calls[0].path, "/companies");
  }

  #[test]
  fn test_update_objects_chunks_oversized_payloads_in_order() {
    let mut client = client();
    client.set_use_caching(false);
    for chunk in 0..3 {
      client.transport().push_json(json!({"chunk": chunk}));
    }

    let mut payload = ObjectList::for_kind(ObjectKind::Enduser);
    for i in 0..12_000 {
      payload
        .push(Object::new(ObjectKind::Enduser).with_external_id(format!("e{i}")))
        .unwrap();
    }

    let response = client.update_objects(&payload).unwrap();
    assert_eq!(
      response,
      BulkUpsertResponse::Batched(vec![
        json!({"chunk": 0}),
        json!({"chunk": 1}),
        json!({"chunk": 2}),
      ])
    );

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 3);
    let sizes: Vec<usize> = calls
      .iter()
      .map(|call| call.body.as_ref().unwrap().as_array().unwrap().len())
      .collect();
    assert_eq!(sizes, vec![5000, 5000, 2000]);
    // Chunks keep payload order
    assert_eq!(
      calls[2].body.as_ref().unwrap().as_array().unwrap()[0]["externalId"],
      json!("e10000")
    );
  }

  #[test]
  fn test_update_objects_rejects_untyped_payload() {
    let mut client = client();
    assert!(matches!(
      client.update_objects(&ObjectList::new()),
      Err(PlanhatError::Config(_))
    ));
    assert!(client.transport().calls().is_empty());
  }

  #[test]
  fn test_delete_object_removes_from_cache() {
    let mut client = client();
    client.transport().push_json(company_page());
    client.get_objects(ObjectKind::Company, None, None).unwrap();

    client
      .transport()
      .push_json(json!({"n": 1, "ok": 1, "deletedCount": 1}));
    let body = client
      .delete_object(&Object::new(ObjectKind::Company).with_id("1"))
      .unwrap();
    assert_eq!(body["deletedCount"], json!(1));

    let calls = client.transport().calls();
    assert_eq!(calls[1].method, Method::DELETE);
    assert_eq!(calls[1].path, "/companies/1");

    client.transport().push_error(status_error(404, ""));
    assert!(client
      .get_object_by_id(ObjectKind::Company, "1", IdKind::Native)
      .is_err());
  }

  // ==========================================================================
  // Missing objects
  // ==========================================================================

  #[test]
  fn test_find_missing_objects() {
    let mut client = client();
    client.transport().push_json(company_page());

    let candidates = ObjectList::from_objects(vec![
      Object::new(ObjectKind::Company).with_id("1"),
      Object::new(ObjectKind::Company).with_id("11"),
      Object::new(ObjectKind::Company).with_id("12"),
    ])
    .unwrap();

    let missing = client.find_missing_objects(&candidates).unwrap();
    assert_eq!(missing.len(), 2);
    assert_eq!(missing[0].id(), "11");
    assert_eq!(missing[1].id(), "12");
  }

  // ==========================================================================
  // Lean companies
  // ==========================================================================

  #[test]
  fn test_list_all_companies() {
    let client = client();
    client.transport().push_json(json!([
      {"_id": "1", "name": "Test Company 1", "externalId": "1a", "sourceId": "a1"},
      {"_id": "2", "name": "Test Company 2", "externalId": "2a", "sourceId": "a2"},
    ]));

    let companies = client.list_all_companies().unwrap();
    assert_eq!(companies.len(), 2);
    assert_eq!(companies[0].source_id(), "a1");
    assert_eq!(companies[1].external_id(), "2a");
    assert_eq!(client.transport().calls()[0].path, "/leancompanies");
  }

  #[test]
  fn test_list_all_companies_empty_is_not_found() {
    let client = client();
    client.transport().push_json(json!([]));
    assert!(matches!(
      client.list_all_companies(),
      Err(PlanhatError::NotFound(_))
    ));
  }

  // ==========================================================================
  // Dimension data
  // ==========================================================================

  fn metric(id: &str, model: &str, parent_id: &str) -> Value {
    json!({
      "_id": id,
      "dimensionId": "test-dimension-id",
      "companyId": "1",
      "time": "2024-02-29T00:00:00.000Z",
      "date": "2024-02-29T00:00:00.000Z",
      "day": 19782,
      "value": 100,
      "timestamp": {"value": "2024-02-29T00:00:00.000Z"},
      "model": model,
      "parentId": parent_id,
      "companyName": "Acme",
    })
  }

  #[test]
  fn test_get_dimension_data_decodes_metrics() {
    let client = client();
    client
      .transport()
      .push_json(json!([metric("1", "Company", "1"), metric("2", "Asset", "1a")]));

    let metrics = client
      .get_dimension_data(&DimensionDataQuery::default())
      .unwrap();

    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics.kind(), Some(ObjectKind::Metric));
    assert_eq!(metrics[0].dimension_id(), "test-dimension-id");
    assert_eq!(metrics[0].model_kind().unwrap(), ObjectKind::Company);
    assert_eq!(metrics[1].model_kind().unwrap(), ObjectKind::Asset);
    assert_eq!(metrics[1].parent_id(), "1a");

    let calls = client.transport().calls();
    assert_eq!(calls[0].path, "/dimensiondata");
    assert_eq!(calls[0].param("limit"), Some("2000"));
    assert_eq!(calls[0].param("offset"), Some("0"));
  }

  #[test]
  fn test_get_dimension_data_passes_filters() {
    let client = client();
    client.transport().push_json(json!([]));

    let query = DimensionDataQuery {
      company_id: Some("1".to_string()),
      dimension_id: Some("installs".to_string()),
      from_day: Some(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap().into()),
      to_day: Some(EpochDay(19732)),
      max_records: None,
    };
    let metrics = client.get_dimension_data(&query).unwrap();
    assert!(metrics.is_empty());

    let call = &client.transport().calls()[0];
    assert_eq!(call.param("cId"), Some("1"));
    assert_eq!(call.param("dimid"), Some("installs"));
    assert_eq!(call.param("from"), Some("19732"));
    assert_eq!(call.param("to"), Some("19732"));
  }

  #[test]
  fn test_get_dimension_data_respects_max_records() {
    let client = client();
    client.transport().push_json(json!([
      metric("1", "Company", "1"),
      metric("2", "Company", "1"),
      metric("3", "Company", "1"),
    ]));

    let query = DimensionDataQuery {
      max_records: Some(3),
      ..DimensionDataQuery::default()
    };
    let metrics = client.get_dimension_data(&query).unwrap();
    assert_eq!(metrics.len(), 3);

    // The limit shrank to the cap and no further page was requested
    let calls = client.transport().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].param("limit"), Some("3"));
  }

  #[test]
  fn test_epoch_day_from_date() {
    assert_eq!(
      EpochDay::from(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
      EpochDay(19732)
    );
    assert_eq!(
      EpochDay::from(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
      EpochDay(0)
    );
  }

  // ==========================================================================
  // Analytics
  // ==========================================================================

  #[test]
  fn test_create_activity_requires_tenant_uuid() {
    let client =
      PlanhatClient::with_transport(FakeTransport::default(), Config::new("test-key"));
    let result = client.create_activity(&json!({"action": "login"}));
    assert!(matches!(result, Err(PlanhatError::Config(_))));
    assert!(client.transport().calls().is_empty());
  }

  #[test]
  fn test_create_activity_posts_to_the_analytics_host() {
    let client = client();
    client.transport().push_json(json!({"ok": true}));

    client.create_activity(&json!({"action": "login"})).unwrap();

    let call = &client.transport().calls()[0];
    assert_eq!(call.method, Method::POST);
    assert_eq!(call.host, Host::Analytics);
    assert_eq!(call.path, "/analytics/tenant-1");
    assert_eq!(call.body, Some(json!({"action": "login"})));
  }

  #[test]
  fn test_create_bulk_activities_posts_a_list() {
    let client = client();
    client.transport().push_json(json!({"ok": true}));

    client
      .create_bulk_activities(&[json!({"action": "a"}), json!({"action": "b"})])
      .unwrap();

    let call = &client.transport().calls()[0];
    assert_eq!(call.path, "/analytics/bulk/tenant-1");
    assert_eq!(call.body, Some(json!([{"action": "a"}, {"action": "b"}])));
  }
}
