//! [`SqliteStore`]: the SQLite implementation of [`AccountStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, params, params_from_iter, types::Value};
use uuid::Uuid;

use enrol_core::{
  comment::{NewRegulatorComment, RegulatorComment},
  connection::{Connection, NewConnection},
  enrolment::{Enrolment, EnrolmentDetail, NewEnrolment},
  nomination::{
    ApprovedPersonNomination, Declaration, DelegatedPersonNomination,
    NewDelegatedNomination,
  },
  organisation::{NewOrganisation, Organisation},
  person::{NewPerson, Person},
  role::{Nation, PersonRole, Service, ServiceRole},
  status::{EnrolmentStatus, StatusChange},
  store::{
    AccountStore, Authority, Decision, RegulatorAuthority, Removal, RoleChange,
    WriteConflict,
  },
};

use crate::{
  Error, Result,
  encode::{
    CONNECTION_COLUMNS, DELEGATED_NOMINATION_COLUMNS, ORGANISATION_COLUMNS,
    PERSON_COLUMNS, RawApprovedNomination, RawComment, RawConnection,
    RawDelegatedNomination, RawEnrolment, RawEnrolmentDetail, RawOrganisation,
    RawPerson, decode_uuid, detail_select, encode_dt, encode_uuid,
    relationship_columns,
  },
  schema::SCHEMA,
};

// ─── Refusals ────────────────────────────────────────────────────────────────

/// Why a guarded write inside a connection closure did not happen. Decoded
/// into an [`Error`] once back on the async side.
enum Refused {
  Conflict(WriteConflict),
  /// A status compare-and-swap missed; `actual` is the stored code.
  Status {
    enrolment_id: i64,
    expected:     EnrolmentStatus,
    actual:       i64,
  },
  Missing { table: &'static str, id: i64 },
}

impl Refused {
  fn into_error(self) -> Error {
    match self {
      Self::Conflict(conflict) => conflict.into(),
      Self::Status { enrolment_id, expected, actual } => {
        match EnrolmentStatus::from_code(actual) {
          Ok(actual) => {
            WriteConflict::StatusConflict { enrolment_id, expected, actual }.into()
          }
          Err(e) => e.into(),
        }
      }
      Self::Missing { table, id } => Error::RowNotFound { table, id },
    }
  }
}

type Guarded<T> = std::result::Result<T, Refused>;

fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

// ─── Row helpers (run on the connection thread) ──────────────────────────────

fn load_person(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<RawPerson> {
  conn.query_row(
    &format!("SELECT {PERSON_COLUMNS} FROM persons p WHERE p.id = ?1"),
    params![id],
    |row| RawPerson::from_row(row, 0),
  )
}

fn load_organisation(
  conn: &rusqlite::Connection,
  id: i64,
) -> rusqlite::Result<RawOrganisation> {
  conn.query_row(
    &format!("SELECT {ORGANISATION_COLUMNS} FROM organisations o WHERE o.id = ?1"),
    params![id],
    |row| RawOrganisation::from_row(row, 0),
  )
}

fn load_connection(
  conn: &rusqlite::Connection,
  id: i64,
) -> rusqlite::Result<RawConnection> {
  conn.query_row(
    &format!("SELECT {CONNECTION_COLUMNS} FROM connections c WHERE c.id = ?1"),
    params![id],
    |row| RawConnection::from_row(row, 0),
  )
}

fn load_enrolment(
  conn: &rusqlite::Connection,
  id: i64,
) -> rusqlite::Result<RawEnrolment> {
  conn.query_row(
    "SELECT id, external_id, connection_id, service_role_id, status,
            valid_from, valid_to, created_on, last_updated_on
     FROM enrolments WHERE id = ?1",
    params![id],
    |row| RawEnrolment::from_row(row, 0),
  )
}

/// Insert an enrolment row, reporting an active duplicate as a conflict.
fn insert_enrolment(
  conn: &rusqlite::Connection,
  enrolment: &Enrolment,
) -> rusqlite::Result<Guarded<i64>> {
  let inserted = conn.execute(
    "INSERT INTO enrolments (
       external_id, connection_id, service_role_id, status,
       valid_from, valid_to, created_on, last_updated_on
     ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)",
    params![
      encode_uuid(enrolment.external_id),
      enrolment.connection_id,
      enrolment.service_role.id(),
      enrolment.status.code(),
      enrolment.valid_from.map(encode_dt),
      encode_dt(enrolment.created_on),
    ],
  );
  match inserted {
    Ok(_) => Ok(Ok(conn.last_insert_rowid())),
    Err(e) if is_unique_violation(&e) => {
      Ok(Err(Refused::Conflict(WriteConflict::DuplicateEnrolment {
        connection_id: enrolment.connection_id,
        service_role:  enrolment.service_role,
      })))
    }
    Err(e) => Err(e),
  }
}

/// Compare-and-swap an enrolment's status, stamping the validity window.
fn swap_status(
  conn: &rusqlite::Connection,
  enrolment_id: i64,
  change: StatusChange,
  now: &str,
) -> rusqlite::Result<Guarded<()>> {
  let updated = conn.execute(
    "UPDATE enrolments
     SET status          = ?3,
         last_updated_on = ?4,
         valid_from = CASE WHEN ?5 AND valid_from IS NULL THEN ?4 ELSE valid_from END,
         valid_to   = CASE WHEN ?6 THEN ?4 ELSE valid_to END
     WHERE id = ?1 AND status = ?2 AND is_deleted = 0",
    params![
      enrolment_id,
      change.expected.code(),
      change.to.code(),
      now,
      change.to.opens_validity(),
      change.to.closes_validity(),
    ],
  )?;
  if updated == 1 {
    return Ok(Ok(()));
  }

  let actual: Option<i64> = conn
    .query_row(
      "SELECT status FROM enrolments WHERE id = ?1 AND is_deleted = 0",
      params![enrolment_id],
      |r| r.get(0),
    )
    .optional()?;
  Ok(Err(match actual {
    None => Refused::Conflict(WriteConflict::EnrolmentNotFound(enrolment_id)),
    Some(actual) => Refused::Status { enrolment_id, expected: change.expected, actual },
  }))
}

fn insert_comment(
  conn: &rusqlite::Connection,
  enrolment_id: i64,
  comment: &NewRegulatorComment,
  now: &str,
) -> rusqlite::Result<i64> {
  conn.execute(
    "INSERT INTO regulator_comments (
       enrolment_id, regulator_person_id, kind_id, text, created_on
     ) VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      enrolment_id,
      comment.regulator_person_id,
      comment.kind.id(),
      comment.text,
      now,
    ],
  )?;
  Ok(conn.last_insert_rowid())
}

/// Soft-delete an enrolment and its nomination rows, closing its validity
/// window. `false` when the enrolment was already gone.
fn retire_enrolment(
  conn: &rusqlite::Connection,
  enrolment_id: i64,
  now: &str,
) -> rusqlite::Result<bool> {
  let updated = conn.execute(
    "UPDATE enrolments
     SET is_deleted = 1,
         valid_to = COALESCE(valid_to, ?2),
         last_updated_on = ?2
     WHERE id = ?1 AND is_deleted = 0",
    params![enrolment_id, now],
  )?;
  if updated == 0 {
    return Ok(false);
  }
  for table in ["delegated_person_nominations", "approved_person_nominations"] {
    conn.execute(
      &format!(
        "UPDATE {table} SET is_deleted = 1, last_updated_on = ?2
         WHERE enrolment_id = ?1 AND is_deleted = 0"
      ),
      params![enrolment_id, now],
    )?;
  }
  Ok(true)
}

fn is_active_code(code: i64) -> bool {
  EnrolmentStatus::from_code(code).is_ok_and(EnrolmentStatus::is_active_authority)
}

fn revoked(enrolment_id: i64) -> Refused {
  Refused::Conflict(WriteConflict::AuthorityRevoked { enrolment_id })
}

/// Re-read the enrolment an actor's authority rests on.
fn check_authority(
  conn: &rusqlite::Connection,
  authority: Authority,
) -> rusqlite::Result<Guarded<()>> {
  let row: Option<(i64, i64)> = conn
    .query_row(
      "SELECT e.status, c.person_role_id
       FROM enrolments e JOIN connections c ON c.id = e.connection_id
       WHERE e.id = ?1 AND e.is_deleted = 0 AND c.is_deleted = 0",
      params![authority.enrolment_id],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;
  let holds = row.is_some_and(|(status, person_role)| {
    is_active_code(status)
      && (!authority.requires_admin || person_role == PersonRole::Admin.id())
  });
  Ok(if holds { Ok(()) } else { Err(revoked(authority.enrolment_id)) })
}

/// Re-read a regulator's enrolment and the nations of the organisation they
/// are acting on.
fn check_regulator(
  conn: &rusqlite::Connection,
  authority: RegulatorAuthority,
  organisation_id: i64,
) -> rusqlite::Result<Guarded<()>> {
  let nation = authority.nation.id();
  let regulator: Option<(i64, Option<i64>)> = conn
    .query_row(
      "SELECT e.status, r.nation_id
       FROM enrolments e
       JOIN connections c ON c.id = e.connection_id
       JOIN organisations r ON r.id = c.organisation_id
       WHERE e.id = ?1 AND e.is_deleted = 0 AND c.is_deleted = 0",
      params![authority.enrolment_id],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;
  let active = regulator
    .is_some_and(|(status, office)| is_active_code(status) && office == Some(nation));
  let regulated: bool = conn.query_row(
    "SELECT EXISTS (
       SELECT 1 FROM organisations
       WHERE id = ?1 AND is_deleted = 0
         AND (nation_id = ?2 OR transfer_nation_id = ?2)
     )",
    params![organisation_id, nation],
    |r| r.get(0),
  )?;
  Ok(if active && regulated { Ok(()) } else { Err(revoked(authority.enrolment_id)) })
}

/// Bail out of a connection closure with a refusal; the open transaction, if
/// any, rolls back on drop.
macro_rules! guard {
  ($e:expr) => {
    match $e? {
      Ok(value) => value,
      Err(refused) => return Ok(Err(refused)),
    }
  };
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An account store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "enrolment store opened");
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read enrolment details matching `filter`, a `WHERE` clause over the
  /// `e`, `c`, `p` and `o` aliases with positional parameters `values`.
  async fn details(
    &self,
    filter: &'static str,
    values: Vec<Value>,
  ) -> Result<Vec<EnrolmentDetail>> {
    let sql = format!("{} WHERE {filter} ORDER BY e.id", detail_select());

    let raws: Vec<RawEnrolmentDetail> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(values), RawEnrolmentDetail::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEnrolmentDetail::into_detail).collect()
  }
}

// ─── AccountStore impl ───────────────────────────────────────────────────────

impl AccountStore for SqliteStore {
  type Error = Error;

  // ── People and organisations ──────────────────────────────────────────────

  async fn add_person(&self, input: NewPerson) -> Result<Person> {
    let mut person = Person {
      id:          0,
      external_id: Uuid::new_v4(),
      first_name:  input.first_name,
      last_name:   input.last_name,
      email:       input.email,
      telephone:   input.telephone,
      user_id:     input.user_id,
      created_on:  Utc::now(),
    };

    let row = person.clone();
    let inserted: Guarded<i64> = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO persons (
             external_id, first_name, last_name, email, telephone, user_id,
             created_on, last_updated_on
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          params![
            encode_uuid(row.external_id),
            row.first_name,
            row.last_name,
            row.email,
            row.telephone,
            row.user_id.map(encode_uuid),
            encode_dt(row.created_on),
          ],
        );
        match result {
          Ok(_) => Ok(Ok(conn.last_insert_rowid())),
          Err(e) if is_unique_violation(&e) => Ok(Err(Refused::Conflict(
            WriteConflict::UserAlreadyLinked(row.user_id.unwrap_or_default()),
          ))),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    person.id = inserted.map_err(Refused::into_error)?;
    Ok(person)
  }

  async fn get_person(&self, external_id: Uuid) -> Result<Option<Person>> {
    let id_str = encode_uuid(external_id);

    let raw: Option<RawPerson> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PERSON_COLUMNS} FROM persons p
                 WHERE p.external_id = ?1 AND p.is_deleted = 0"
              ),
              params![id_str],
              |row| RawPerson::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPerson::into_person).transpose()
  }

  async fn find_person_by_user(&self, user_id: Uuid) -> Result<Option<Person>> {
    let user_str = encode_uuid(user_id);

    let raw: Option<RawPerson> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PERSON_COLUMNS} FROM persons p
                 WHERE p.user_id = ?1 AND p.is_deleted = 0"
              ),
              params![user_str],
              |row| RawPerson::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPerson::into_person).transpose()
  }

  async fn link_person_to_user(&self, person_id: i64, user_id: Uuid) -> Result<Person> {
    let user_str = encode_uuid(user_id);
    let now = encode_dt(Utc::now());

    let raw: Guarded<RawPerson> = self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE persons SET user_id = ?2, last_updated_on = ?3
           WHERE id = ?1 AND is_deleted = 0",
          params![person_id, user_str, now],
        );
        match updated {
          Ok(0) => Ok(Err(Refused::Missing { table: "persons", id: person_id })),
          Ok(_) => Ok(Ok(load_person(conn, person_id)?)),
          Err(e) if is_unique_violation(&e) => {
            Ok(Err(Refused::Conflict(WriteConflict::UserAlreadyLinked(user_id))))
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    raw.map_err(Refused::into_error)?.into_person()
  }

  async fn add_organisation(&self, input: NewOrganisation) -> Result<Organisation> {
    let mut organisation = Organisation {
      id:              0,
      external_id:     Uuid::new_v4(),
      name:            input.name,
      nation:          input.nation,
      transfer_nation: None,
      created_on:      Utc::now(),
    };

    let id_str = encode_uuid(organisation.external_id);
    let name = organisation.name.clone();
    let nation_id = organisation.nation.map(Nation::id);
    let at_str = encode_dt(organisation.created_on);

    organisation.id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO organisations (
             external_id, name, nation_id, created_on, last_updated_on
           ) VALUES (?1, ?2, ?3, ?4, ?4)",
          params![id_str, name, nation_id, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(organisation)
  }

  async fn get_organisation(&self, external_id: Uuid) -> Result<Option<Organisation>> {
    let id_str = encode_uuid(external_id);

    let raw: Option<RawOrganisation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ORGANISATION_COLUMNS} FROM organisations o
                 WHERE o.external_id = ?1 AND o.is_deleted = 0"
              ),
              params![id_str],
              |row| RawOrganisation::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawOrganisation::into_organisation).transpose()
  }

  async fn request_transfer(
    &self,
    organisation_id: i64,
    nation: Nation,
    comment: Option<NewRegulatorComment>,
    authority: RegulatorAuthority,
  ) -> Result<Organisation> {
    let now = encode_dt(Utc::now());

    let raw: Guarded<RawOrganisation> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        guard!(check_regulator(&tx, authority, organisation_id));

        tx.execute(
          "UPDATE organisations SET transfer_nation_id = ?2, last_updated_on = ?3
           WHERE id = ?1 AND is_deleted = 0",
          params![organisation_id, nation.id(), now],
        )?;

        if let Some(comment) = &comment {
          let awaiting: Vec<i64> = {
            let mut stmt = tx.prepare(
              "SELECT e.id, e.status
               FROM enrolments e JOIN connections c ON c.id = e.connection_id
               WHERE c.organisation_id = ?1 AND c.is_deleted = 0 AND e.is_deleted = 0
               ORDER BY e.id",
            )?;
            let rows = stmt
              .query_map(params![organisation_id], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?))
              })?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
              .into_iter()
              .filter(|(_, status)| {
                EnrolmentStatus::from_code(*status)
                  .is_ok_and(EnrolmentStatus::awaits_regulator)
              })
              .map(|(id, _)| id)
              .collect()
          };
          for enrolment_id in awaiting {
            insert_comment(&tx, enrolment_id, comment, &now)?;
          }
        }

        let raw = load_organisation(&tx, organisation_id)?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    raw.map_err(Refused::into_error)?.into_organisation()
  }

  // ── Connections ───────────────────────────────────────────────────────────

  async fn add_connection(&self, input: NewConnection) -> Result<Connection> {
    let mut connection = Connection {
      id:                0,
      external_id:       Uuid::new_v4(),
      person_id:         input.person_id,
      organisation_id:   input.organisation_id,
      person_role:       input.person_role,
      organisation_role: input.organisation_role,
      job_title:         input.job_title,
      created_on:        Utc::now(),
    };

    let row = connection.clone();
    connection.id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO connections (
             external_id, person_id, organisation_id, person_role_id,
             organisation_role_id, job_title, created_on, last_updated_on
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          params![
            encode_uuid(row.external_id),
            row.person_id,
            row.organisation_id,
            row.person_role.id(),
            row.organisation_role.id(),
            row.job_title,
            encode_dt(row.created_on),
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(connection)
  }

  async fn get_connection(&self, external_id: Uuid) -> Result<Option<Connection>> {
    let id_str = encode_uuid(external_id);

    let raw: Option<RawConnection> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections c
                 WHERE c.external_id = ?1 AND c.is_deleted = 0"
              ),
              params![id_str],
              |row| RawConnection::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawConnection::into_connection).transpose()
  }

  async fn find_connection(
    &self,
    person_id: i64,
    organisation_id: i64,
  ) -> Result<Option<Connection>> {
    let raw: Option<RawConnection> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections c
                 WHERE c.person_id = ?1 AND c.organisation_id = ?2
                   AND c.is_deleted = 0"
              ),
              params![person_id, organisation_id],
              |row| RawConnection::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawConnection::into_connection).transpose()
  }

  async fn change_person_role(
    &self,
    connection_id: i64,
    role: PersonRole,
    authority: Authority,
  ) -> Result<RoleChange> {
    let now = encode_dt(Utc::now());

    let changed: Guarded<(RawConnection, Vec<String>)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        guard!(check_authority(&tx, authority));

        let previous: Option<i64> = tx
          .query_row(
            "SELECT person_role_id FROM connections WHERE id = ?1 AND is_deleted = 0",
            params![connection_id],
            |r| r.get(0),
          )
          .optional()?;
        let Some(previous) = previous else {
          return Ok(Err(Refused::Missing { table: "connections", id: connection_id }));
        };

        tx.execute(
          "UPDATE connections SET person_role_id = ?2, last_updated_on = ?3
           WHERE id = ?1",
          params![connection_id, role.id(), now],
        )?;

        let mut removed = Vec::new();
        if previous == PersonRole::Admin.id() && role != PersonRole::Admin {
          let delegation: Option<(i64, String)> = tx
            .query_row(
              "SELECT id, external_id FROM enrolments
               WHERE connection_id = ?1 AND service_role_id = ?2
                 AND status = ?3 AND is_deleted = 0",
              params![
                connection_id,
                ServiceRole::DelegatedPerson.id(),
                EnrolmentStatus::Approved.code(),
              ],
              |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
          if let Some((id, external_id)) = delegation {
            retire_enrolment(&tx, id, &now)?;
            removed.push(external_id);
          }
        }

        let raw = load_connection(&tx, connection_id)?;
        tx.commit()?;
        Ok(Ok((raw, removed)))
      })
      .await?;

    let (raw, removed) = changed.map_err(Refused::into_error)?;
    Ok(RoleChange {
      connection:          raw.into_connection()?,
      delegations_removed: removed
        .iter()
        .map(|id| decode_uuid(id))
        .collect::<Result<_>>()?,
    })
  }

  // ── Enrolments ────────────────────────────────────────────────────────────

  async fn create_enrolment(&self, input: NewEnrolment) -> Result<Enrolment> {
    let mut enrolment = new_enrolment(input);

    let row = enrolment.clone();
    let inserted: Guarded<i64> = self
      .conn
      .call(move |conn| insert_enrolment(conn, &row).map_err(Into::into))
      .await?;

    enrolment.id = inserted.map_err(Refused::into_error)?;
    Ok(enrolment)
  }

  async fn get_enrolment(&self, external_id: Uuid) -> Result<Option<EnrolmentDetail>> {
    let mut found = self
      .details(
        "e.external_id = ?1 AND e.is_deleted = 0 AND c.is_deleted = 0",
        vec![encode_uuid(external_id).into()],
      )
      .await?;
    Ok(found.pop())
  }

  async fn get_enrolment_by_id(&self, enrolment_id: i64) -> Result<Option<EnrolmentDetail>> {
    let mut found = self
      .details(
        "e.id = ?1 AND e.is_deleted = 0 AND c.is_deleted = 0",
        vec![enrolment_id.into()],
      )
      .await?;
    Ok(found.pop())
  }

  async fn set_status(&self, enrolment_id: i64, change: StatusChange) -> Result<Enrolment> {
    let now = encode_dt(Utc::now());

    let raw: Guarded<RawEnrolment> = self
      .conn
      .call(move |conn| {
        guard!(swap_status(conn, enrolment_id, change, &now));
        Ok(Ok(load_enrolment(conn, enrolment_id)?))
      })
      .await?;

    raw.map_err(Refused::into_error)?.into_enrolment()
  }

  async fn delete_enrolment(&self, enrolment_id: i64) -> Result<()> {
    let now = encode_dt(Utc::now());

    let deleted: Guarded<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !retire_enrolment(&tx, enrolment_id, &now)? {
          return Ok(Err(Refused::Conflict(WriteConflict::EnrolmentNotFound(
            enrolment_id,
          ))));
        }
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    deleted.map_err(Refused::into_error)
  }

  async fn remove_enrolments(
    &self,
    connection_id: i64,
    service_role: ServiceRole,
    authority: Authority,
  ) -> Result<Removal> {
    let now = encode_dt(Utc::now());

    let removal: Guarded<Removal> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        guard!(check_authority(&tx, authority));

        let ids: Vec<i64> = {
          let mut stmt = tx.prepare(
            "SELECT id FROM enrolments
             WHERE connection_id = ?1 AND service_role_id = ?2 AND is_deleted = 0",
          )?;
          stmt
            .query_map(params![connection_id, service_role.id()], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        if ids.is_empty() {
          return Ok(Ok(Removal { enrolments_removed: 0, connection_removed: false }));
        }
        for id in &ids {
          retire_enrolment(&tx, *id, &now)?;
        }

        let remaining: i64 = tx.query_row(
          "SELECT COUNT(*) FROM enrolments WHERE connection_id = ?1 AND is_deleted = 0",
          params![connection_id],
          |r| r.get(0),
        )?;
        let connection_removed = remaining == 0;
        if connection_removed {
          tx.execute(
            "UPDATE connections SET is_deleted = 1, last_updated_on = ?2
             WHERE id = ?1 AND is_deleted = 0",
            params![connection_id, now],
          )?;
        }

        tx.commit()?;
        Ok(Ok(Removal { enrolments_removed: ids.len(), connection_removed }))
      })
      .await?;

    removal.map_err(Refused::into_error)
  }

  async fn user_enrolments(
    &self,
    user_id: Uuid,
    organisation_id: Option<i64>,
  ) -> Result<Vec<EnrolmentDetail>> {
    self
      .details(
        "p.user_id = ?1 AND (?2 IS NULL OR c.organisation_id = ?2)
         AND p.is_deleted = 0 AND c.is_deleted = 0 AND e.is_deleted = 0",
        vec![encode_uuid(user_id).into(), organisation_id.into()],
      )
      .await
  }

  async fn organisation_enrolments(
    &self,
    organisation_id: i64,
    service: Option<Service>,
  ) -> Result<Vec<EnrolmentDetail>> {
    let mut all = self
      .details(
        "c.organisation_id = ?1 AND c.is_deleted = 0 AND e.is_deleted = 0",
        vec![organisation_id.into()],
      )
      .await?;
    if let Some(service) = service {
      all.retain(|d| d.enrolment.service() == service);
    }
    Ok(all)
  }

  // ── Nominations ───────────────────────────────────────────────────────────

  async fn create_delegated_nomination(
    &self,
    enrolment: NewEnrolment,
    nomination: NewDelegatedNomination,
  ) -> Result<(Enrolment, DelegatedPersonNomination)> {
    let mut enrolment = new_enrolment(enrolment);
    let mut nomination = DelegatedPersonNomination {
      id:                     0,
      enrolment_id:           0,
      nominator_enrolment_id: nomination.nominator_enrolment_id,
      relationship:           nomination.relationship,
      nominator_declaration:  nomination.nominator_declaration,
      nominee_declaration:    None,
    };

    let row = enrolment.clone();
    let record = nomination.clone();
    let ids: Guarded<(i64, i64)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let nominator_id = record.nominator_enrolment_id;

        // The nominator must still be Approved when the nomination lands.
        let nominator: Option<i64> = tx
          .query_row(
            "SELECT status FROM enrolments WHERE id = ?1 AND is_deleted = 0",
            params![nominator_id],
            |r| r.get(0),
          )
          .optional()?;
        match nominator {
          None => {
            return Ok(Err(Refused::Conflict(WriteConflict::EnrolmentNotFound(
              nominator_id,
            ))));
          }
          Some(code) if code != EnrolmentStatus::Approved.code() => {
            return Ok(Err(Refused::Status {
              enrolment_id: nominator_id,
              expected:     EnrolmentStatus::Approved,
              actual:       code,
            }));
          }
          Some(_) => {}
        }

        let enrolment_id = guard!(insert_enrolment(&tx, &row));

        let (consultancy, scheme, other_org, other_desc) =
          relationship_columns(&record.relationship);
        let declared_at = encode_dt(record.nominator_declaration.at);
        let inserted = tx.execute(
          "INSERT INTO delegated_person_nominations (
             enrolment_id, nominator_enrolment_id, relationship_type,
             consultancy_name, compliance_scheme_name, other_organisation_name,
             other_description, nominator_declaration, nominator_declaration_at,
             created_on, last_updated_on
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
          params![
            enrolment_id,
            nominator_id,
            record.relationship.type_id(),
            consultancy,
            scheme,
            other_org,
            other_desc,
            record.nominator_declaration.text,
            declared_at,
            encode_dt(row.created_on),
          ],
        );
        match inserted {
          Ok(_) => {}
          Err(e) if is_unique_violation(&e) => {
            return Ok(Err(Refused::Conflict(WriteConflict::DuplicateNomination {
              nominator_enrolment_id: nominator_id,
            })));
          }
          Err(e) => return Err(e.into()),
        }
        let nomination_id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(Ok((enrolment_id, nomination_id)))
      })
      .await?;

    let (enrolment_id, nomination_id) = ids.map_err(Refused::into_error)?;
    enrolment.id = enrolment_id;
    nomination.id = nomination_id;
    nomination.enrolment_id = enrolment_id;
    Ok((enrolment, nomination))
  }

  async fn get_delegated_nomination(
    &self,
    enrolment_id: i64,
  ) -> Result<Option<DelegatedPersonNomination>> {
    let raw: Option<RawDelegatedNomination> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {DELEGATED_NOMINATION_COLUMNS}
                 FROM delegated_person_nominations
                 WHERE enrolment_id = ?1 AND is_deleted = 0"
              ),
              params![enrolment_id],
              RawDelegatedNomination::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDelegatedNomination::into_nomination).transpose()
  }

  async fn find_nomination_by_nominator(
    &self,
    nominator_enrolment_id: i64,
  ) -> Result<Option<DelegatedPersonNomination>> {
    let raw: Option<RawDelegatedNomination> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {DELEGATED_NOMINATION_COLUMNS}
                 FROM delegated_person_nominations
                 WHERE nominator_enrolment_id = ?1 AND is_deleted = 0"
              ),
              params![nominator_enrolment_id],
              RawDelegatedNomination::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDelegatedNomination::into_nomination).transpose()
  }

  async fn accept_delegated_nomination(
    &self,
    enrolment_id: i64,
    change: StatusChange,
    declaration: Declaration,
  ) -> Result<Enrolment> {
    self
      .accept_nomination("delegated_person_nominations", enrolment_id, change, declaration)
      .await
  }

  async fn create_approved_person_nomination(
    &self,
    enrolment: NewEnrolment,
    authority: Authority,
  ) -> Result<(Enrolment, ApprovedPersonNomination)> {
    let mut enrolment = new_enrolment(enrolment);

    let row = enrolment.clone();
    let ids: Guarded<(i64, i64)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        guard!(check_authority(&tx, authority));
        let enrolment_id = guard!(insert_enrolment(&tx, &row));
        tx.execute(
          "INSERT INTO approved_person_nominations (
             enrolment_id, created_on, last_updated_on
           ) VALUES (?1, ?2, ?2)",
          params![enrolment_id, encode_dt(row.created_on)],
        )?;
        let nomination_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Ok((enrolment_id, nomination_id)))
      })
      .await?;

    let (enrolment_id, nomination_id) = ids.map_err(Refused::into_error)?;
    enrolment.id = enrolment_id;
    let nomination = ApprovedPersonNomination {
      id: nomination_id,
      enrolment_id,
      nominee_declaration: None,
    };
    Ok((enrolment, nomination))
  }

  async fn get_approved_person_nomination(
    &self,
    enrolment_id: i64,
  ) -> Result<Option<ApprovedPersonNomination>> {
    let raw: Option<RawApprovedNomination> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, enrolment_id, nominee_declaration, nominee_declaration_at
               FROM approved_person_nominations
               WHERE enrolment_id = ?1 AND is_deleted = 0",
              params![enrolment_id],
              |row| {
                Ok(RawApprovedNomination {
                  id:                     row.get(0)?,
                  enrolment_id:           row.get(1)?,
                  nominee_declaration:    row.get(2)?,
                  nominee_declaration_at: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawApprovedNomination::into_nomination).transpose()
  }

  async fn accept_approved_person_nomination(
    &self,
    enrolment_id: i64,
    change: StatusChange,
    declaration: Declaration,
  ) -> Result<Enrolment> {
    self
      .accept_nomination("approved_person_nominations", enrolment_id, change, declaration)
      .await
  }

  // ── Regulator decisions ───────────────────────────────────────────────────

  async fn decide_enrolment(
    &self,
    enrolment_id: i64,
    change: StatusChange,
    comment: Option<NewRegulatorComment>,
    authority: RegulatorAuthority,
  ) -> Result<Decision> {
    let now = encode_dt(Utc::now());

    let raws: Guarded<(RawEnrolment, RawOrganisation, bool)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let organisation_id: Option<i64> = tx
          .query_row(
            "SELECT c.organisation_id
             FROM enrolments e JOIN connections c ON c.id = e.connection_id
             WHERE e.id = ?1 AND e.is_deleted = 0",
            params![enrolment_id],
            |r| r.get(0),
          )
          .optional()?;
        let Some(organisation_id) = organisation_id else {
          return Ok(Err(Refused::Conflict(WriteConflict::EnrolmentNotFound(
            enrolment_id,
          ))));
        };

        guard!(check_regulator(&tx, authority, organisation_id));
        guard!(swap_status(&tx, enrolment_id, change, &now));
        if let Some(comment) = &comment {
          insert_comment(&tx, enrolment_id, comment, &now)?;
        }

        let settled = change.to.settles_transfer()
          && tx.execute(
            "UPDATE organisations
             SET nation_id = transfer_nation_id,
                 transfer_nation_id = NULL,
                 last_updated_on = ?3
             WHERE id = ?1 AND transfer_nation_id = ?2",
            params![organisation_id, authority.nation.id(), now],
          )? == 1;

        let enrolment = load_enrolment(&tx, enrolment_id)?;
        let organisation = load_organisation(&tx, organisation_id)?;
        tx.commit()?;
        Ok(Ok((enrolment, organisation, settled)))
      })
      .await?;

    let (enrolment, organisation, transfer_settled) =
      raws.map_err(Refused::into_error)?;
    Ok(Decision {
      enrolment: enrolment.into_enrolment()?,
      organisation: organisation.into_organisation()?,
      transfer_settled,
    })
  }

  async fn regulator_comments(&self, enrolment_id: i64) -> Result<Vec<RegulatorComment>> {
    let raws: Vec<RawComment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, enrolment_id, regulator_person_id, kind_id, text, created_on
           FROM regulator_comments
           WHERE enrolment_id = ?1
           ORDER BY created_on, id",
        )?;
        let rows = stmt
          .query_map(params![enrolment_id], |row| {
            Ok(RawComment {
              id:                  row.get(0)?,
              enrolment_id:        row.get(1)?,
              regulator_person_id: row.get(2)?,
              kind_id:             row.get(3)?,
              text:                row.get(4)?,
              created_on:          row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawComment::into_comment).collect()
  }
}

impl SqliteStore {
  /// Swap the status and record the nominee's declaration on the nomination
  /// row in `table`, in one transaction.
  async fn accept_nomination(
    &self,
    table: &'static str,
    enrolment_id: i64,
    change: StatusChange,
    declaration: Declaration,
  ) -> Result<Enrolment> {
    let now = encode_dt(Utc::now());
    let declared_at = encode_dt(declaration.at);

    let raw: Guarded<RawEnrolment> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        guard!(swap_status(&tx, enrolment_id, change, &now));
        let updated = tx.execute(
          &format!(
            "UPDATE {table}
             SET nominee_declaration = ?2,
                 nominee_declaration_at = ?3,
                 last_updated_on = ?4
             WHERE enrolment_id = ?1 AND is_deleted = 0"
          ),
          params![enrolment_id, declaration.text, declared_at, now],
        )?;
        if updated == 0 {
          return Ok(Err(Refused::Missing { table, id: enrolment_id }));
        }
        let raw = load_enrolment(&tx, enrolment_id)?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    raw.map_err(Refused::into_error)?.into_enrolment()
  }
}

/// Build an enrolment row in its initial status; `id` is filled in on insert.
fn new_enrolment(input: NewEnrolment) -> Enrolment {
  let now = Utc::now();
  Enrolment {
    id:              0,
    external_id:     Uuid::new_v4(),
    connection_id:   input.connection_id,
    service_role:    input.service_role,
    status:          input.status,
    valid_from:      input.status.opens_validity().then_some(now),
    valid_to:        None,
    created_on:      now,
    last_updated_on: now,
  }
}
