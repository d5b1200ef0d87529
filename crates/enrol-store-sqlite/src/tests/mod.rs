//! Integration tests for `SqliteStore` and the workflows running over it,
//! against an in-memory database.

mod gate;
mod store;

use std::sync::Arc;

use enrol_core::{
  connection::{Connection, NewConnection},
  enrolment::{Enrolment, NewEnrolment},
  organisation::{NewOrganisation, Organisation},
  person::{NewPerson, Person},
  role::{Nation, PersonRole, ServiceRole},
  service::AccountService,
  status::EnrolmentStatus,
  store::AccountStore,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn service() -> AccountService<SqliteStore> {
  AccountService::new(Arc::new(store().await))
}

/// A person with a login, connected to an organisation and holding one
/// enrolment there.
struct Member {
  user_id:    Uuid,
  person:     Person,
  connection: Connection,
  enrolment:  Enrolment,
}

async fn organisation(s: &SqliteStore, nation: Nation) -> Organisation {
  s.add_organisation(NewOrganisation {
    name:   "Acme Packaging Ltd".into(),
    nation: Some(nation),
  })
  .await
  .unwrap()
}

async fn person(s: &SqliteStore, first_name: &str, user_id: Option<Uuid>) -> Person {
  s.add_person(NewPerson {
    first_name: first_name.into(),
    last_name:  "Smith".into(),
    email:      format!("{}@example.com", first_name.to_lowercase()),
    telephone:  None,
    user_id,
  })
  .await
  .unwrap()
}

async fn member(
  s: &SqliteStore,
  organisation: &Organisation,
  first_name: &str,
  person_role: PersonRole,
  service_role: ServiceRole,
  status: EnrolmentStatus,
) -> Member {
  let user_id = Uuid::new_v4();
  let person = person(s, first_name, Some(user_id)).await;
  let connection = s
    .add_connection(NewConnection::new(person.id, organisation.id, person_role))
    .await
    .unwrap();
  let enrolment = s
    .create_enrolment(NewEnrolment::new(connection.id, service_role, status))
    .await
    .unwrap();
  Member { user_id, person, connection, enrolment }
}

/// An Approved Person with status Approved.
async fn approved_person(s: &SqliteStore, organisation: &Organisation) -> Member {
  member(
    s,
    organisation,
    "Alice",
    PersonRole::Admin,
    ServiceRole::ApprovedPerson,
    EnrolmentStatus::Approved,
  )
  .await
}

/// An enrolled basic user.
async fn basic_user(
  s: &SqliteStore,
  organisation: &Organisation,
  first_name: &str,
) -> Member {
  member(
    s,
    organisation,
    first_name,
    PersonRole::Employee,
    ServiceRole::BasicUser,
    EnrolmentStatus::Enrolled,
  )
  .await
}

/// A regulator admin working for `nation`'s regulator.
async fn regulator(s: &SqliteStore, nation: Nation) -> Member {
  let office = s
    .add_organisation(NewOrganisation {
      name:   format!("{nation:?} regulator"),
      nation: Some(nation),
    })
    .await
    .unwrap();
  member(
    s,
    &office,
    "Regina",
    PersonRole::Admin,
    ServiceRole::RegulatorAdmin,
    EnrolmentStatus::Enrolled,
  )
  .await
}
