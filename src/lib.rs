//! Typed client for the [Planhat](https://docs.planhat.com) customer
//! platform API.
//!
//! Planhat exposes one generic CRUD surface over ~20 entity collections
//! (companies, endusers, licenses, ...). This crate represents those
//! entities as kind-tagged records ([`Object`]) and kind-homogeneous,
//! indexed collections ([`ObjectList`]), and drives them through a client
//! that handles pagination, request batching and a per-kind read-through
//! cache transparently.
//!
//! Field names in payloads must match the Planhat API documentation for
//! creates and updates to succeed; deletes only need one of the record's
//! identifiers.
//!
//! # Example
//!
//! ```no_run
//! use planhat::{Config, IdKind, ObjectKind, PlanhatClient};
//!
//! fn main() -> planhat::Result<()> {
//!   let mut client = PlanhatClient::new(Config::from_env()?)?;
//!
//!   // The first access fetches and caches the full collection; later
//!   // calls for the same kind are served from memory.
//!   let companies = client.get_objects(ObjectKind::Company, None, None)?;
//!   let acme = companies.find_by_id("56bccdf554d3d01f00c054e0")?;
//!   println!("{acme}");
//!
//!   let enduser = client.get_object_by_id(ObjectKind::Enduser, "u-17", IdKind::External)?;
//!   println!("{}", enduser.email());
//!   Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod transport;
mod types;

pub use client::{BulkUpsertResponse, DimensionDataQuery, EpochDay, PlanhatClient};
pub use config::Config;
pub use error::{PlanhatError, Result};
pub use transport::{Host, HttpTransport, Method, Params, Response, Transport};
pub use types::{Decoded, IdKind, IntoFieldValue, KindDescriptor, Object, ObjectKind, ObjectList};
