//! Reference data: services, service roles, person roles and nations.
//!
//! All of these are closed sets persisted as integer ids.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Services ────────────────────────────────────────────────────────────────

/// A regulated service an organisation can enrol in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
  /// Extended producer responsibility for packaging.
  Packaging,
  /// The regulators' own service.
  Regulating,
}

impl Service {
  pub fn key(self) -> &'static str {
    match self {
      Self::Packaging => "Packaging",
      Self::Regulating => "Regulating",
    }
  }

  /// Resolve a service key as supplied by callers. Keys are case-sensitive.
  pub fn from_key(key: &str) -> Option<Self> {
    match key {
      "Packaging" => Some(Self::Packaging),
      "Regulating" => Some(Self::Regulating),
      _ => None,
    }
  }

  /// Only packaging supports Approved/Delegated Person nominations.
  pub fn supports_delegation(self) -> bool { matches!(self, Self::Packaging) }

  /// Roles whose holders may manage other users of this service.
  pub fn management_roles(self) -> &'static [ServiceRole] {
    match self {
      Self::Packaging => {
        &[ServiceRole::ApprovedPerson, ServiceRole::DelegatedPerson]
      }
      Self::Regulating => &[ServiceRole::RegulatorAdmin],
    }
  }

  pub fn roles(self) -> &'static [ServiceRole] {
    match self {
      Self::Packaging => &[
        ServiceRole::ApprovedPerson,
        ServiceRole::DelegatedPerson,
        ServiceRole::BasicUser,
      ],
      Self::Regulating => {
        &[ServiceRole::RegulatorAdmin, ServiceRole::RegulatorBasic]
      }
    }
  }
}

impl fmt::Display for Service {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

// ─── Service roles ───────────────────────────────────────────────────────────

/// A role within a service. Within one service a lower id carries more
/// privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceRole {
  #[serde(rename = "Packaging.ApprovedPerson")]
  ApprovedPerson,
  #[serde(rename = "Packaging.DelegatedPerson")]
  DelegatedPerson,
  #[serde(rename = "Packaging.BasicUser")]
  BasicUser,
  #[serde(rename = "Regulator.Admin")]
  RegulatorAdmin,
  #[serde(rename = "Regulator.Basic")]
  RegulatorBasic,
}

impl ServiceRole {
  pub fn id(self) -> i64 {
    match self {
      Self::ApprovedPerson => 1,
      Self::DelegatedPerson => 2,
      Self::BasicUser => 3,
      Self::RegulatorAdmin => 4,
      Self::RegulatorBasic => 5,
    }
  }

  pub fn from_id(id: i64) -> Result<Self> {
    match id {
      1 => Ok(Self::ApprovedPerson),
      2 => Ok(Self::DelegatedPerson),
      3 => Ok(Self::BasicUser),
      4 => Ok(Self::RegulatorAdmin),
      5 => Ok(Self::RegulatorBasic),
      other => Err(Error::UnknownServiceRole(other)),
    }
  }

  pub fn key(self) -> &'static str {
    match self {
      Self::ApprovedPerson => "Packaging.ApprovedPerson",
      Self::DelegatedPerson => "Packaging.DelegatedPerson",
      Self::BasicUser => "Packaging.BasicUser",
      Self::RegulatorAdmin => "Regulator.Admin",
      Self::RegulatorBasic => "Regulator.Basic",
    }
  }

  pub fn service(self) -> Service {
    match self {
      Self::ApprovedPerson | Self::DelegatedPerson | Self::BasicUser => {
        Service::Packaging
      }
      Self::RegulatorAdmin | Self::RegulatorBasic => Service::Regulating,
    }
  }

  /// `true` when `self` belongs to the same service as `other` and carries
  /// at least as much privilege.
  pub fn at_or_above(self, other: ServiceRole) -> bool {
    self.service() == other.service() && self.id() <= other.id()
  }

  pub fn is_management_role(self) -> bool {
    self.service().management_roles().contains(&self)
  }
}

impl fmt::Display for ServiceRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

// ─── Connection roles ────────────────────────────────────────────────────────

/// A person's role inside the organisation they are connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonRole {
  Admin,
  Employee,
  Member,
}

impl PersonRole {
  pub fn id(self) -> i64 {
    match self {
      Self::Admin => 1,
      Self::Employee => 2,
      Self::Member => 3,
    }
  }

  pub fn from_id(id: i64) -> Result<Self> {
    match id {
      1 => Ok(Self::Admin),
      2 => Ok(Self::Employee),
      3 => Ok(Self::Member),
      other => Err(Error::UnknownPersonRole(other)),
    }
  }
}

/// The organisation's side of a connection.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OrganisationRole {
  #[default]
  Employer,
}

impl OrganisationRole {
  pub fn id(self) -> i64 {
    match self {
      Self::Employer => 1,
    }
  }

  pub fn from_id(id: i64) -> Result<Self> {
    match id {
      1 => Ok(Self::Employer),
      other => Err(Error::UnknownOrganisationRole(other)),
    }
  }
}

// ─── Nations ─────────────────────────────────────────────────────────────────

/// A UK nation; regulators act only within their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nation {
  England,
  NorthernIreland,
  Scotland,
  Wales,
}

impl Nation {
  pub fn id(self) -> i64 {
    match self {
      Self::England => 1,
      Self::NorthernIreland => 2,
      Self::Scotland => 3,
      Self::Wales => 4,
    }
  }

  pub fn from_id(id: i64) -> Result<Self> {
    match id {
      1 => Ok(Self::England),
      2 => Ok(Self::NorthernIreland),
      3 => Ok(Self::Scotland),
      4 => Ok(Self::Wales),
      other => Err(Error::UnknownNation(other)),
    }
  }
}
