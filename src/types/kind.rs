//! Object kinds and identifier schemes.
//!
//! The Planhat API is one generic CRUD surface over ~20 entity collections.
//! [`ObjectKind`] is the closed registry of those collections: every kind
//! carries its endpoint name, display names, capabilities and page limit,
//! and the name-matching lookups used to resolve a response URL or a metric
//! model tag back to a kind.

use std::fmt;

use crate::error::{PlanhatError, Result};

/// The three identifier schemes Planhat accepts when addressing an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdKind {
  /// The Planhat-assigned primary id (`_id`).
  #[default]
  Native,
  /// The id assigned by an upstream source CRM (`sourceId`).
  Source,
  /// The id assigned by the caller's own system (`externalId`).
  External,
}

impl IdKind {
  /// URL prefix token used when addressing an object by this scheme.
  pub fn prefix(self) -> &'static str {
    match self {
      IdKind::Native => "",
      IdKind::Source => "srcid-",
      IdKind::External => "extid-",
    }
  }
}

/// Endpoint and naming metadata for one object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
  /// Collection name forming the endpoint path (`/companies`, ...).
  pub api_name: &'static str,
  /// Singular display name.
  pub singular: &'static str,
  /// Plural display name.
  pub plural: &'static str,
}

/// A concrete Planhat entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
  Company,
  Asset,
  Campaign,
  Churn,
  Conversation,
  CustomField,
  Enduser,
  Invoice,
  Issue,
  License,
  Note,
  Nps,
  Opportunity,
  Objective,
  Project,
  Sale,
  Task,
  Ticket,
  User,
  Workspace,
  Metric,
}

impl ObjectKind {
  /// Every concrete kind. Order matters for name resolution: kinds that
  /// share an endpoint (Note rides the conversations collection) resolve
  /// to the earlier entry.
  pub const ALL: [ObjectKind; 21] = [
    ObjectKind::Company,
    ObjectKind::Asset,
    ObjectKind::Campaign,
    ObjectKind::Churn,
    ObjectKind::Conversation,
    ObjectKind::CustomField,
    ObjectKind::Enduser,
    ObjectKind::Invoice,
    ObjectKind::Issue,
    ObjectKind::License,
    ObjectKind::Note,
    ObjectKind::Nps,
    ObjectKind::Opportunity,
    ObjectKind::Objective,
    ObjectKind::Project,
    ObjectKind::Sale,
    ObjectKind::Task,
    ObjectKind::Ticket,
    ObjectKind::User,
    ObjectKind::Workspace,
    ObjectKind::Metric,
  ];

  /// Endpoint and naming metadata for this kind.
  pub fn descriptor(self) -> KindDescriptor {
    match self {
      ObjectKind::Company => KindDescriptor {
        api_name: "companies",
        singular: "company",
        plural: "companies",
      },
      ObjectKind::Asset => KindDescriptor {
        api_name: "assets",
        singular: "asset",
        plural: "assets",
      },
      ObjectKind::Campaign => KindDescriptor {
        api_name: "campaigns",
        singular: "campaign",
        plural: "campaigns",
      },
      ObjectKind::Churn => KindDescriptor {
        api_name: "churn",
        singular: "churn",
        plural: "churns",
      },
      ObjectKind::Conversation => KindDescriptor {
        api_name: "conversations",
        singular: "conversation",
        plural: "conversations",
      },
      ObjectKind::CustomField => KindDescriptor {
        api_name: "customfields",
        singular: "custom field",
        plural: "custom fields",
      },
      ObjectKind::Enduser => KindDescriptor {
        api_name: "endusers",
        singular: "enduser",
        plural: "endusers",
      },
      ObjectKind::Invoice => KindDescriptor {
        api_name: "invoices",
        singular: "invoice",
        plural: "invoices",
      },
      ObjectKind::Issue => KindDescriptor {
        api_name: "issues",
        singular: "issue",
        plural: "issues",
      },
      ObjectKind::License => KindDescriptor {
        api_name: "licenses",
        singular: "license",
        plural: "licenses",
      },
      // Notes are conversations on the wire; they keep their own kind so
      // callers can distinguish them locally.
      ObjectKind::Note => KindDescriptor {
        api_name: "conversations",
        singular: "note",
        plural: "notes",
      },
      ObjectKind::Nps => KindDescriptor {
        api_name: "nps",
        singular: "nps",
        plural: "nps",
      },
      ObjectKind::Opportunity => KindDescriptor {
        api_name: "opportunities",
        singular: "opportunity",
        plural: "opportunities",
      },
      ObjectKind::Objective => KindDescriptor {
        api_name: "objectives",
        singular: "objective",
        plural: "objectives",
      },
      ObjectKind::Project => KindDescriptor {
        api_name: "projects",
        singular: "project",
        plural: "projects",
      },
      ObjectKind::Sale => KindDescriptor {
        api_name: "sales",
        singular: "sale",
        plural: "sales",
      },
      ObjectKind::Task => KindDescriptor {
        api_name: "tasks",
        singular: "task",
        plural: "tasks",
      },
      ObjectKind::Ticket => KindDescriptor {
        api_name: "tickets",
        singular: "ticket",
        plural: "tickets",
      },
      ObjectKind::User => KindDescriptor {
        api_name: "users",
        singular: "user",
        plural: "users",
      },
      ObjectKind::Workspace => KindDescriptor {
        api_name: "workspaces",
        singular: "workspace",
        plural: "workspaces",
      },
      ObjectKind::Metric => KindDescriptor {
        api_name: "dimensiondata",
        singular: "metric",
        plural: "metrics",
      },
    }
  }

  /// Collection name forming the endpoint path.
  pub fn api_name(self) -> &'static str {
    self.descriptor().api_name
  }

  /// The kind's name as used in error messages (`Company`, `NPS`, ...).
  pub fn name(self) -> &'static str {
    match self {
      ObjectKind::Company => "Company",
      ObjectKind::Asset => "Asset",
      ObjectKind::Campaign => "Campaign",
      ObjectKind::Churn => "Churn",
      ObjectKind::Conversation => "Conversation",
      ObjectKind::CustomField => "CustomField",
      ObjectKind::Enduser => "Enduser",
      ObjectKind::Invoice => "Invoice",
      ObjectKind::Issue => "Issue",
      ObjectKind::License => "License",
      ObjectKind::Note => "Note",
      ObjectKind::Nps => "NPS",
      ObjectKind::Opportunity => "Opportunity",
      ObjectKind::Objective => "Objective",
      ObjectKind::Project => "Project",
      ObjectKind::Sale => "Sale",
      ObjectKind::Task => "Task",
      ObjectKind::Ticket => "Ticket",
      ObjectKind::User => "User",
      ObjectKind::Workspace => "Workspace",
      ObjectKind::Metric => "Metric",
    }
  }

  /// The `/{collection}` path used for list and create requests.
  pub fn type_urlpath(self) -> String {
    format!("/{}", self.api_name())
  }

  /// Whether objects of this kind carry a top-level `name` field.
  pub fn has_name(self) -> bool {
    matches!(self, ObjectKind::Company | ObjectKind::Workspace)
  }

  /// Whether objects of this kind are owned by a company.
  pub fn is_company_owned(self) -> bool {
    matches!(
      self,
      ObjectKind::Asset
        | ObjectKind::Campaign
        | ObjectKind::Churn
        | ObjectKind::Conversation
        | ObjectKind::Enduser
        | ObjectKind::Invoice
        | ObjectKind::License
        | ObjectKind::Note
        | ObjectKind::Nps
        | ObjectKind::Opportunity
        | ObjectKind::Objective
        | ObjectKind::Project
        | ObjectKind::Sale
        | ObjectKind::Task
        | ObjectKind::Ticket
        | ObjectKind::Workspace
    )
  }

  /// Server-imposed page size for list requests of this kind.
  pub fn page_limit(self) -> usize {
    match self {
      ObjectKind::Company => 5000,
      _ => 2000,
    }
  }

  /// Resolve a collection, singular or plural name to a kind,
  /// case-insensitively. Used for metric model tags and URL resolution.
  pub fn from_name(tag: &str) -> Result<ObjectKind> {
    let lower = tag.to_lowercase();
    Self::ALL
      .iter()
      .copied()
      .find(|kind| {
        let d = kind.descriptor();
        d.api_name == lower || d.singular == lower || d.plural == lower
      })
      .ok_or_else(|| PlanhatError::Resolution(format!("no object kind matches name '{tag}'")))
  }

  /// Resolve a request URL path to a kind by matching its segments against
  /// the registry, preferring the trailing segment.
  pub fn from_path(path: &str) -> Result<ObjectKind> {
    path
      .split('/')
      .filter(|segment| !segment.is_empty())
      .rev()
      .find_map(|segment| Self::from_name(segment).ok())
      .ok_or_else(|| PlanhatError::Resolution(format!("no object kind matches path '{path}'")))
  }
}

impl fmt::Display for ObjectKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
