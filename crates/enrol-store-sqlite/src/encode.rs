//! Encoding and decoding helpers between domain types and the columns stored
//! in SQLite.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings, and
//! closed enums their persisted integer ids. Rows are first read into `Raw*`
//! structs inside the connection closure and decoded outside it.

use chrono::{DateTime, Utc};
use enrol_core::{
  comment::{CommentKind, RegulatorComment},
  connection::Connection,
  enrolment::{Enrolment, EnrolmentDetail},
  nomination::{
    ApprovedPersonNomination, Declaration, DelegatedPersonNomination,
    Relationship,
  },
  organisation::Organisation,
  person::Person,
  role::{Nation, OrganisationRole, PersonRole, ServiceRole},
  status::EnrolmentStatus,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

fn decode_declaration(
  text: Option<String>,
  at: Option<String>,
) -> Result<Option<Declaration>> {
  match (text, at) {
    (Some(text), Some(at)) => Ok(Some(Declaration { text, at: decode_dt(&at)? })),
    _ => Ok(None),
  }
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const PERSON_COLUMNS: &str =
  "p.id, p.external_id, p.first_name, p.last_name, p.email, p.telephone, \
   p.user_id, p.created_on";

pub const ORGANISATION_COLUMNS: &str =
  "o.id, o.external_id, o.name, o.nation_id, o.transfer_nation_id, o.created_on";

pub const CONNECTION_COLUMNS: &str =
  "c.id, c.external_id, c.person_id, c.organisation_id, c.person_role_id, \
   c.organisation_role_id, c.job_title, c.created_on";

pub const ENROLMENT_COLUMNS: &str =
  "e.id, e.external_id, e.connection_id, e.service_role_id, e.status, \
   e.valid_from, e.valid_to, e.created_on, e.last_updated_on";

/// `SELECT` prefix for [`RawEnrolmentDetail`]; callers append `WHERE …`.
pub fn detail_select() -> String {
  format!(
    "SELECT {ENROLMENT_COLUMNS}, {CONNECTION_COLUMNS}, {PERSON_COLUMNS}, \
     {ORGANISATION_COLUMNS}
     FROM enrolments e
     JOIN connections   c ON c.id = e.connection_id
     JOIN persons       p ON p.id = c.person_id
     JOIN organisations o ON o.id = c.organisation_id"
  )
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from a `persons` row.
pub struct RawPerson {
  pub id:          i64,
  pub external_id: String,
  pub first_name:  String,
  pub last_name:   String,
  pub email:       String,
  pub telephone:   Option<String>,
  pub user_id:     Option<String>,
  pub created_on:  String,
}

impl RawPerson {
  /// Read [`PERSON_COLUMNS`] starting at column `at`.
  pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(at)?,
      external_id: row.get(at + 1)?,
      first_name:  row.get(at + 2)?,
      last_name:   row.get(at + 3)?,
      email:       row.get(at + 4)?,
      telephone:   row.get(at + 5)?,
      user_id:     row.get(at + 6)?,
      created_on:  row.get(at + 7)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      id:          self.id,
      external_id: decode_uuid(&self.external_id)?,
      first_name:  self.first_name,
      last_name:   self.last_name,
      email:       self.email,
      telephone:   self.telephone,
      user_id:     self.user_id.as_deref().map(decode_uuid).transpose()?,
      created_on:  decode_dt(&self.created_on)?,
    })
  }
}

/// Raw values read from an `organisations` row.
pub struct RawOrganisation {
  pub id:                 i64,
  pub external_id:        String,
  pub name:               String,
  pub nation_id:          Option<i64>,
  pub transfer_nation_id: Option<i64>,
  pub created_on:         String,
}

impl RawOrganisation {
  pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(at)?,
      external_id:        row.get(at + 1)?,
      name:               row.get(at + 2)?,
      nation_id:          row.get(at + 3)?,
      transfer_nation_id: row.get(at + 4)?,
      created_on:         row.get(at + 5)?,
    })
  }

  pub fn into_organisation(self) -> Result<Organisation> {
    Ok(Organisation {
      id:              self.id,
      external_id:     decode_uuid(&self.external_id)?,
      name:            self.name,
      nation:          self.nation_id.map(Nation::from_id).transpose()?,
      transfer_nation: self.transfer_nation_id.map(Nation::from_id).transpose()?,
      created_on:      decode_dt(&self.created_on)?,
    })
  }
}

/// Raw values read from a `connections` row.
pub struct RawConnection {
  pub id:                   i64,
  pub external_id:          String,
  pub person_id:            i64,
  pub organisation_id:      i64,
  pub person_role_id:       i64,
  pub organisation_role_id: i64,
  pub job_title:            Option<String>,
  pub created_on:           String,
}

impl RawConnection {
  pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                   row.get(at)?,
      external_id:          row.get(at + 1)?,
      person_id:            row.get(at + 2)?,
      organisation_id:      row.get(at + 3)?,
      person_role_id:       row.get(at + 4)?,
      organisation_role_id: row.get(at + 5)?,
      job_title:            row.get(at + 6)?,
      created_on:           row.get(at + 7)?,
    })
  }

  pub fn into_connection(self) -> Result<Connection> {
    Ok(Connection {
      id:                self.id,
      external_id:       decode_uuid(&self.external_id)?,
      person_id:         self.person_id,
      organisation_id:   self.organisation_id,
      person_role:       PersonRole::from_id(self.person_role_id)?,
      organisation_role: OrganisationRole::from_id(self.organisation_role_id)?,
      job_title:         self.job_title,
      created_on:        decode_dt(&self.created_on)?,
    })
  }
}

/// Raw values read from an `enrolments` row.
pub struct RawEnrolment {
  pub id:              i64,
  pub external_id:     String,
  pub connection_id:   i64,
  pub service_role_id: i64,
  pub status:          i64,
  pub valid_from:      Option<String>,
  pub valid_to:        Option<String>,
  pub created_on:      String,
  pub last_updated_on: String,
}

impl RawEnrolment {
  pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(at)?,
      external_id:     row.get(at + 1)?,
      connection_id:   row.get(at + 2)?,
      service_role_id: row.get(at + 3)?,
      status:          row.get(at + 4)?,
      valid_from:      row.get(at + 5)?,
      valid_to:        row.get(at + 6)?,
      created_on:      row.get(at + 7)?,
      last_updated_on: row.get(at + 8)?,
    })
  }

  pub fn into_enrolment(self) -> Result<Enrolment> {
    Ok(Enrolment {
      id:              self.id,
      external_id:     decode_uuid(&self.external_id)?,
      connection_id:   self.connection_id,
      service_role:    ServiceRole::from_id(self.service_role_id)?,
      status:          EnrolmentStatus::from_code(self.status)?,
      valid_from:      decode_opt_dt(self.valid_from)?,
      valid_to:        decode_opt_dt(self.valid_to)?,
      created_on:      decode_dt(&self.created_on)?,
      last_updated_on: decode_dt(&self.last_updated_on)?,
    })
  }
}

/// An enrolment joined with its connection, person and organisation, in the
/// column order produced by [`detail_select`].
pub struct RawEnrolmentDetail {
  pub enrolment:    RawEnrolment,
  pub connection:   RawConnection,
  pub person:       RawPerson,
  pub organisation: RawOrganisation,
}

impl RawEnrolmentDetail {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      enrolment:    RawEnrolment::from_row(row, 0)?,
      connection:   RawConnection::from_row(row, 9)?,
      person:       RawPerson::from_row(row, 17)?,
      organisation: RawOrganisation::from_row(row, 25)?,
    })
  }

  pub fn into_detail(self) -> Result<EnrolmentDetail> {
    Ok(EnrolmentDetail {
      enrolment:    self.enrolment.into_enrolment()?,
      connection:   self.connection.into_connection()?,
      person:       self.person.into_person()?,
      organisation: self.organisation.into_organisation()?,
    })
  }
}

/// Raw values read from a `delegated_person_nominations` row.
pub struct RawDelegatedNomination {
  pub id:                       i64,
  pub enrolment_id:             i64,
  pub nominator_enrolment_id:   i64,
  pub relationship_type:        i64,
  pub consultancy_name:         Option<String>,
  pub compliance_scheme_name:   Option<String>,
  pub other_organisation_name:  Option<String>,
  pub other_description:        Option<String>,
  pub nominator_declaration:    String,
  pub nominator_declaration_at: String,
  pub nominee_declaration:      Option<String>,
  pub nominee_declaration_at:   Option<String>,
}

pub const DELEGATED_NOMINATION_COLUMNS: &str =
  "id, enrolment_id, nominator_enrolment_id, relationship_type, \
   consultancy_name, compliance_scheme_name, other_organisation_name, \
   other_description, nominator_declaration, nominator_declaration_at, \
   nominee_declaration, nominee_declaration_at";

impl RawDelegatedNomination {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                       row.get(0)?,
      enrolment_id:             row.get(1)?,
      nominator_enrolment_id:   row.get(2)?,
      relationship_type:        row.get(3)?,
      consultancy_name:         row.get(4)?,
      compliance_scheme_name:   row.get(5)?,
      other_organisation_name:  row.get(6)?,
      other_description:        row.get(7)?,
      nominator_declaration:    row.get(8)?,
      nominator_declaration_at: row.get(9)?,
      nominee_declaration:      row.get(10)?,
      nominee_declaration_at:   row.get(11)?,
    })
  }

  pub fn into_nomination(self) -> Result<DelegatedPersonNomination> {
    Ok(DelegatedPersonNomination {
      id:                     self.id,
      enrolment_id:           self.enrolment_id,
      nominator_enrolment_id: self.nominator_enrolment_id,
      relationship:           Relationship::from_parts(
        self.relationship_type,
        self.consultancy_name,
        self.compliance_scheme_name,
        self.other_organisation_name,
        self.other_description,
      )?,
      nominator_declaration:  Declaration {
        text: self.nominator_declaration,
        at:   decode_dt(&self.nominator_declaration_at)?,
      },
      nominee_declaration:    decode_declaration(
        self.nominee_declaration,
        self.nominee_declaration_at,
      )?,
    })
  }
}

/// Detail columns for a [`Relationship`], in schema order.
pub fn relationship_columns(
  relationship: &Relationship,
) -> (Option<String>, Option<String>, Option<String>, Option<String>) {
  match relationship {
    Relationship::Employment => (None, None, None, None),
    Relationship::Consultancy { consultancy_name } => {
      (Some(consultancy_name.clone()), None, None, None)
    }
    Relationship::ComplianceScheme { compliance_scheme_name } => {
      (None, Some(compliance_scheme_name.clone()), None, None)
    }
    Relationship::Other { organisation_name, description } => (
      None,
      None,
      Some(organisation_name.clone()),
      Some(description.clone()),
    ),
  }
}

/// Raw values read from an `approved_person_nominations` row.
pub struct RawApprovedNomination {
  pub id:                     i64,
  pub enrolment_id:           i64,
  pub nominee_declaration:    Option<String>,
  pub nominee_declaration_at: Option<String>,
}

impl RawApprovedNomination {
  pub fn into_nomination(self) -> Result<ApprovedPersonNomination> {
    Ok(ApprovedPersonNomination {
      id:                  self.id,
      enrolment_id:        self.enrolment_id,
      nominee_declaration: decode_declaration(
        self.nominee_declaration,
        self.nominee_declaration_at,
      )?,
    })
  }
}

/// Raw values read from a `regulator_comments` row.
pub struct RawComment {
  pub id:                  i64,
  pub enrolment_id:        i64,
  pub regulator_person_id: i64,
  pub kind_id:             i64,
  pub text:                String,
  pub created_on:          String,
}

impl RawComment {
  pub fn into_comment(self) -> Result<RegulatorComment> {
    Ok(RegulatorComment {
      id:                  self.id,
      enrolment_id:        self.enrolment_id,
      regulator_person_id: self.regulator_person_id,
      kind:                CommentKind::from_id(self.kind_id)?,
      text:                self.text,
      created_on:          decode_dt(&self.created_on)?,
    })
  }
}
