use enrol_core::{
  comment::{CommentKind, NewRegulatorComment},
  connection::NewConnection,
  enrolment::NewEnrolment,
  nomination::{Declaration, NewDelegatedNomination, Relationship},
  organisation::Organisation,
  role::{Nation, PersonRole, Service, ServiceRole},
  status::{EnrolmentStatus, StatusChange},
  store::{
    AccountStore,
    Authority,
    RegulatorAuthority,
    Removal,
    StoreError as _,
    WriteConflict,
  },
};
use uuid::Uuid;

use super::{Member, approved_person, basic_user, member, organisation, person, regulator, store};
use crate::{Error, SqliteStore};

fn conflict(e: &Error) -> WriteConflict {
  e.as_conflict().cloned().expect("write conflict")
}

// ─── People, organisations, connections ─────────────────────────────────────

#[tokio::test]
async fn add_and_get_person() {
  let s = store().await;
  let user = Uuid::new_v4();
  let added = person(&s, "Bob", Some(user)).await;

  let fetched = s.get_person(added.external_id).await.unwrap().unwrap();
  assert_eq!(fetched, added);
  assert_eq!(fetched.full_name(), "Bob Smith");

  let by_user = s.find_person_by_user(user).await.unwrap().unwrap();
  assert_eq!(by_user.id, added.id);
}

#[tokio::test]
async fn get_person_missing_returns_none() {
  let s = store().await;
  assert!(s.get_person(Uuid::new_v4()).await.unwrap().is_none());
  assert!(s.find_person_by_user(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn user_links_to_one_person_only() {
  let s = store().await;
  let user = Uuid::new_v4();
  person(&s, "Bob", Some(user)).await;
  let other = person(&s, "Carol", None).await;

  let err = s.link_person_to_user(other.id, user).await.unwrap_err();
  assert_eq!(conflict(&err), WriteConflict::UserAlreadyLinked(user));

  let fresh = Uuid::new_v4();
  let linked = s.link_person_to_user(other.id, fresh).await.unwrap();
  assert_eq!(linked.user_id, Some(fresh));
}

#[tokio::test]
async fn connections_are_found_by_person_and_organisation() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = person(&s, "Bob", None).await;
  let connection = s
    .add_connection(NewConnection::new(bob.id, org.id, PersonRole::Employee))
    .await
    .unwrap();

  let found = s.find_connection(bob.id, org.id).await.unwrap().unwrap();
  assert_eq!(found, connection);
  let by_external = s.get_connection(connection.external_id).await.unwrap().unwrap();
  assert_eq!(by_external, connection);
}

#[tokio::test]
async fn demoting_an_admin_ends_their_delegation() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let dave = member(
    &s,
    &org,
    "Dave",
    PersonRole::Admin,
    ServiceRole::DelegatedPerson,
    EnrolmentStatus::Approved,
  )
  .await;

  let change = s
    .change_person_role(
      dave.connection.id,
      PersonRole::Employee,
      Authority::of(alice.enrolment.id),
    )
    .await
    .unwrap();
  assert_eq!(change.connection.person_role, PersonRole::Employee);
  assert_eq!(change.delegations_removed, vec![dave.enrolment.external_id]);
  assert!(s.get_enrolment(dave.enrolment.external_id).await.unwrap().is_none());

  // Promotion has no side effects.
  let promoted = s
    .change_person_role(
      dave.connection.id,
      PersonRole::Admin,
      Authority::of(alice.enrolment.id),
    )
    .await
    .unwrap();
  assert_eq!(promoted.connection.person_role, PersonRole::Admin);
  assert!(promoted.delegations_removed.is_empty());
}

#[tokio::test]
async fn role_change_by_a_revoked_manager_writes_nothing() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;

  s.delete_enrolment(alice.enrolment.id).await.unwrap();

  let err = s
    .change_person_role(
      bob.connection.id,
      PersonRole::Admin,
      Authority::of(alice.enrolment.id),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::AuthorityRevoked { enrolment_id: alice.enrolment.id }
  );
  let unchanged = s.get_connection(bob.connection.external_id).await.unwrap().unwrap();
  assert_eq!(unchanged.person_role, PersonRole::Employee);
}

// ─── Removal ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn removing_the_last_enrolment_removes_the_connection() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;

  let none = s
    .remove_enrolments(
      bob.connection.id,
      ServiceRole::DelegatedPerson,
      Authority::of(alice.enrolment.id),
    )
    .await
    .unwrap();
  assert_eq!(none, Removal { enrolments_removed: 0, connection_removed: false });
  assert!(s.get_connection(bob.connection.external_id).await.unwrap().is_some());

  let removal = s
    .remove_enrolments(
      bob.connection.id,
      ServiceRole::BasicUser,
      Authority::of(alice.enrolment.id),
    )
    .await
    .unwrap();
  assert_eq!(removal, Removal { enrolments_removed: 1, connection_removed: true });
  assert!(s.get_enrolment(bob.enrolment.external_id).await.unwrap().is_none());
  assert!(s.get_connection(bob.connection.external_id).await.unwrap().is_none());
  assert!(s.find_connection(bob.person.id, org.id).await.unwrap().is_none());
}

#[tokio::test]
async fn other_enrolments_keep_the_connection() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;
  s.create_enrolment(NewEnrolment::new(
    bob.connection.id,
    ServiceRole::DelegatedPerson,
    EnrolmentStatus::Approved,
  ))
  .await
  .unwrap();

  let removal = s
    .remove_enrolments(
      bob.connection.id,
      ServiceRole::BasicUser,
      Authority::of(alice.enrolment.id),
    )
    .await
    .unwrap();
  assert_eq!(removal, Removal { enrolments_removed: 1, connection_removed: false });
  assert_eq!(s.user_enrolments(bob.user_id, Some(org.id)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn removal_rechecks_an_admin_authority() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let carol = member(
    &s,
    &org,
    "Carol",
    PersonRole::Admin,
    ServiceRole::BasicUser,
    EnrolmentStatus::Enrolled,
  )
  .await;
  let bob = basic_user(&s, &org, "Bob").await;

  // Carol stops being an Admin before the removal commits.
  let alice = approved_person(&s, &org).await;
  s.change_person_role(
    carol.connection.id,
    PersonRole::Employee,
    Authority::of(alice.enrolment.id),
  )
  .await
  .unwrap();

  let err = s
    .remove_enrolments(
      bob.connection.id,
      ServiceRole::BasicUser,
      Authority::via_admin(carol.enrolment.id),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::AuthorityRevoked { enrolment_id: carol.enrolment.id }
  );
  assert!(s.get_enrolment(bob.enrolment.external_id).await.unwrap().is_some());
  assert!(s.get_connection(bob.connection.external_id).await.unwrap().is_some());
}

// ─── Enrolments ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_enrolment_detail() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;

  let detail = s.get_enrolment(bob.enrolment.external_id).await.unwrap().unwrap();
  assert_eq!(detail.enrolment, bob.enrolment);
  assert_eq!(detail.connection.id, bob.connection.id);
  assert_eq!(detail.person.id, bob.person.id);
  assert_eq!(detail.organisation.id, org.id);
  assert!(detail.enrolment.valid_from.is_some(), "enrolled opens validity");
  assert!(detail.is_addressed_to(bob.user_id, org.external_id, Service::Packaging));
  assert!(!detail.is_addressed_to(Uuid::new_v4(), org.external_id, Service::Packaging));

  let by_id = s.get_enrolment_by_id(bob.enrolment.id).await.unwrap().unwrap();
  assert_eq!(by_id.enrolment.external_id, bob.enrolment.external_id);
}

#[tokio::test]
async fn duplicate_active_enrolment_conflicts() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;

  let err = s
    .create_enrolment(NewEnrolment::new(
      bob.connection.id,
      ServiceRole::BasicUser,
      EnrolmentStatus::Invited,
    ))
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::DuplicateEnrolment {
      connection_id: bob.connection.id,
      service_role:  ServiceRole::BasicUser,
    }
  );

  // Once deleted, the role can be held again.
  s.delete_enrolment(bob.enrolment.id).await.unwrap();
  s.create_enrolment(NewEnrolment::new(
    bob.connection.id,
    ServiceRole::BasicUser,
    EnrolmentStatus::Invited,
  ))
  .await
  .unwrap();
}

#[tokio::test]
async fn set_status_is_compare_and_swap() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let id = bob.enrolment.id;

  let pending = s
    .set_status(id, StatusChange::new(EnrolmentStatus::Enrolled, EnrolmentStatus::Pending))
    .await
    .unwrap();
  assert_eq!(pending.status, EnrolmentStatus::Pending);

  // A second writer still expecting Enrolled loses.
  let err = s
    .set_status(id, StatusChange::new(EnrolmentStatus::Enrolled, EnrolmentStatus::Rejected))
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::StatusConflict {
      enrolment_id: id,
      expected:     EnrolmentStatus::Enrolled,
      actual:       EnrolmentStatus::Pending,
    }
  );

  let unchanged = s.get_enrolment_by_id(id).await.unwrap().unwrap();
  assert_eq!(unchanged.enrolment.status, EnrolmentStatus::Pending);
}

#[tokio::test]
async fn rejection_closes_validity() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;

  let rejected = s
    .set_status(
      bob.enrolment.id,
      StatusChange::new(EnrolmentStatus::Enrolled, EnrolmentStatus::Rejected),
    )
    .await
    .unwrap();
  assert!(rejected.valid_to.is_some());
  assert_eq!(rejected.valid_from, bob.enrolment.valid_from);
}

#[tokio::test]
async fn set_status_on_missing_enrolment_reports_not_found() {
  let s = store().await;
  let err = s
    .set_status(999, StatusChange::new(EnrolmentStatus::Enrolled, EnrolmentStatus::Pending))
    .await
    .unwrap_err();
  assert_eq!(conflict(&err), WriteConflict::EnrolmentNotFound(999));
}

#[tokio::test]
async fn deleted_enrolments_disappear_from_reads() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;

  s.delete_enrolment(bob.enrolment.id).await.unwrap();

  assert!(s.get_enrolment(bob.enrolment.external_id).await.unwrap().is_none());
  assert!(s.user_enrolments(bob.user_id, None).await.unwrap().is_empty());
  assert!(s.organisation_enrolments(org.id, None).await.unwrap().is_empty());

  let err = s.delete_enrolment(bob.enrolment.id).await.unwrap_err();
  assert_eq!(conflict(&err), WriteConflict::EnrolmentNotFound(bob.enrolment.id));
}

#[tokio::test]
async fn enrolment_listings_filter_by_organisation_and_service() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let elsewhere = organisation(&s, Nation::Scotland).await;
  let alice = approved_person(&s, &org).await;
  basic_user(&s, &org, "Bob").await;
  basic_user(&s, &elsewhere, "Carol").await;

  let mine = s.user_enrolments(alice.user_id, Some(org.id)).await.unwrap();
  assert_eq!(mine.len(), 1);
  assert!(s.user_enrolments(alice.user_id, Some(elsewhere.id)).await.unwrap().is_empty());

  let packaging = s
    .organisation_enrolments(org.id, Some(Service::Packaging))
    .await
    .unwrap();
  assert_eq!(packaging.len(), 2);
  let regulating = s
    .organisation_enrolments(org.id, Some(Service::Regulating))
    .await
    .unwrap();
  assert!(regulating.is_empty());
}

// ─── Nominations ────────────────────────────────────────────────────────────

fn delegated(nominator_enrolment_id: i64) -> NewDelegatedNomination {
  NewDelegatedNomination {
    nominator_enrolment_id,
    relationship: Relationship::Consultancy { consultancy_name: "Pack Advisors".into() },
    nominator_declaration: Declaration::new("Alice Smith"),
  }
}

#[tokio::test]
async fn delegated_nomination_roundtrip() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;

  let (enrolment, nomination) = s
    .create_delegated_nomination(
      NewEnrolment::new(
        bob.connection.id,
        ServiceRole::DelegatedPerson,
        EnrolmentStatus::Nominated,
      ),
      delegated(alice.enrolment.id),
    )
    .await
    .unwrap();
  assert_eq!(enrolment.status, EnrolmentStatus::Nominated);
  assert_eq!(nomination.enrolment_id, enrolment.id);

  let stored = s.get_delegated_nomination(enrolment.id).await.unwrap().unwrap();
  assert_eq!(stored.nominator_enrolment_id, alice.enrolment.id);
  assert_eq!(
    stored.relationship,
    Relationship::Consultancy { consultancy_name: "Pack Advisors".into() }
  );
  assert!(stored.nominee_declaration.is_none());

  let by_nominator = s
    .find_nomination_by_nominator(alice.enrolment.id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(by_nominator.id, stored.id);

  let accepted = s
    .accept_delegated_nomination(
      enrolment.id,
      StatusChange::new(EnrolmentStatus::Nominated, EnrolmentStatus::Approved),
      Declaration::new("Bob Smith"),
    )
    .await
    .unwrap();
  assert_eq!(accepted.status, EnrolmentStatus::Approved);
  let stored = s.get_delegated_nomination(enrolment.id).await.unwrap().unwrap();
  assert_eq!(stored.nominee_declaration.unwrap().text, "Bob Smith");
}

#[tokio::test]
async fn one_nomination_per_nominator() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let carol = basic_user(&s, &org, "Carol").await;

  s.create_delegated_nomination(
    NewEnrolment::new(
      bob.connection.id,
      ServiceRole::DelegatedPerson,
      EnrolmentStatus::Nominated,
    ),
    delegated(alice.enrolment.id),
  )
  .await
  .unwrap();

  let err = s
    .create_delegated_nomination(
      NewEnrolment::new(
        carol.connection.id,
        ServiceRole::DelegatedPerson,
        EnrolmentStatus::Nominated,
      ),
      delegated(alice.enrolment.id),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::DuplicateNomination { nominator_enrolment_id: alice.enrolment.id }
  );

  // The losing transaction left no enrolment behind.
  let carols = s.user_enrolments(carol.user_id, Some(org.id)).await.unwrap();
  assert_eq!(carols.len(), 1);
}

#[tokio::test]
async fn nomination_rechecks_the_nominator_inside_the_transaction() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;

  // Alice loses her approval between the gate check and the write.
  s.set_status(
    alice.enrolment.id,
    StatusChange::new(EnrolmentStatus::Approved, EnrolmentStatus::OnHold),
  )
  .await
  .unwrap();

  let err = s
    .create_delegated_nomination(
      NewEnrolment::new(
        bob.connection.id,
        ServiceRole::DelegatedPerson,
        EnrolmentStatus::Nominated,
      ),
      delegated(alice.enrolment.id),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::StatusConflict {
      enrolment_id: alice.enrolment.id,
      expected:     EnrolmentStatus::Approved,
      actual:       EnrolmentStatus::OnHold,
    }
  );
  assert_eq!(s.user_enrolments(bob.user_id, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_a_nominated_enrolment_frees_the_nominator() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let carol = basic_user(&s, &org, "Carol").await;

  let (enrolment, _) = s
    .create_delegated_nomination(
      NewEnrolment::new(
        bob.connection.id,
        ServiceRole::DelegatedPerson,
        EnrolmentStatus::Nominated,
      ),
      delegated(alice.enrolment.id),
    )
    .await
    .unwrap();
  s.delete_enrolment(enrolment.id).await.unwrap();
  assert!(s.get_delegated_nomination(enrolment.id).await.unwrap().is_none());

  s.create_delegated_nomination(
    NewEnrolment::new(
      carol.connection.id,
      ServiceRole::DelegatedPerson,
      EnrolmentStatus::Nominated,
    ),
    delegated(alice.enrolment.id),
  )
  .await
  .unwrap();
}

/// A Delegated Person, who may nominate Approved Persons.
async fn delegated_manager(s: &SqliteStore, org: &Organisation) -> Member {
  member(
    s,
    org,
    "Dave",
    PersonRole::Employee,
    ServiceRole::DelegatedPerson,
    EnrolmentStatus::Approved,
  )
  .await
}

#[tokio::test]
async fn approved_person_nomination_roundtrip() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let manager = delegated_manager(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;

  let (enrolment, nomination) = s
    .create_approved_person_nomination(
      NewEnrolment::new(
        bob.connection.id,
        ServiceRole::ApprovedPerson,
        EnrolmentStatus::Nominated,
      ),
      Authority::of(manager.enrolment.id),
    )
    .await
    .unwrap();
  assert_eq!(nomination.enrolment_id, enrolment.id);
  assert!(enrolment.valid_from.is_none());

  let accepted = s
    .accept_approved_person_nomination(
      enrolment.id,
      StatusChange::new(EnrolmentStatus::Nominated, EnrolmentStatus::Pending),
      Declaration::new("Bob Smith"),
    )
    .await
    .unwrap();
  assert_eq!(accepted.status, EnrolmentStatus::Pending);

  let stored = s
    .get_approved_person_nomination(enrolment.id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.nominee_declaration.unwrap().text, "Bob Smith");
}

#[tokio::test]
async fn lost_acceptance_leaves_the_declaration_unwritten() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let manager = delegated_manager(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let (enrolment, _) = s
    .create_approved_person_nomination(
      NewEnrolment::new(
        bob.connection.id,
        ServiceRole::ApprovedPerson,
        EnrolmentStatus::Nominated,
      ),
      Authority::of(manager.enrolment.id),
    )
    .await
    .unwrap();

  let err = s
    .accept_approved_person_nomination(
      enrolment.id,
      StatusChange::new(EnrolmentStatus::Invited, EnrolmentStatus::Pending),
      Declaration::new("Bob Smith"),
    )
    .await
    .unwrap_err();
  assert!(matches!(conflict(&err), WriteConflict::StatusConflict { .. }));

  let stored = s
    .get_approved_person_nomination(enrolment.id)
    .await
    .unwrap()
    .unwrap();
  assert!(stored.nominee_declaration.is_none());
}

#[tokio::test]
async fn approved_person_nomination_rechecks_the_nominator() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let manager = delegated_manager(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;

  s.delete_enrolment(manager.enrolment.id).await.unwrap();

  let err = s
    .create_approved_person_nomination(
      NewEnrolment::new(
        bob.connection.id,
        ServiceRole::ApprovedPerson,
        EnrolmentStatus::Nominated,
      ),
      Authority::of(manager.enrolment.id),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::AuthorityRevoked { enrolment_id: manager.enrolment.id }
  );
  assert_eq!(s.user_enrolments(bob.user_id, None).await.unwrap().len(), 1);
}

// ─── Regulator decisions and transfers ──────────────────────────────────────

fn comment(regina: &Member, kind: CommentKind, text: &str) -> NewRegulatorComment {
  NewRegulatorComment {
    regulator_person_id: regina.person.id,
    kind,
    text: text.into(),
  }
}

fn regulating(regina: &Member, nation: Nation) -> RegulatorAuthority {
  RegulatorAuthority { enrolment_id: regina.enrolment.id, nation }
}

async fn pending(s: &SqliteStore, member: &Member) {
  s.set_status(
    member.enrolment.id,
    StatusChange::new(member.enrolment.status, EnrolmentStatus::Pending),
  )
  .await
  .unwrap();
}

#[tokio::test]
async fn decision_and_comment_commit_together() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let regina = regulator(&s, Nation::England).await;
  pending(&s, &bob).await;

  let rejection = || Some(comment(&regina, CommentKind::Rejection, "Missing evidence"));

  // A stale decision writes neither the status nor the comment.
  let err = s
    .decide_enrolment(
      bob.enrolment.id,
      StatusChange::new(EnrolmentStatus::OnHold, EnrolmentStatus::Rejected),
      rejection(),
      regulating(&regina, Nation::England),
    )
    .await
    .unwrap_err();
  assert!(matches!(conflict(&err), WriteConflict::StatusConflict { .. }));
  assert!(s.regulator_comments(bob.enrolment.id).await.unwrap().is_empty());

  let decision = s
    .decide_enrolment(
      bob.enrolment.id,
      StatusChange::new(EnrolmentStatus::Pending, EnrolmentStatus::Rejected),
      rejection(),
      regulating(&regina, Nation::England),
    )
    .await
    .unwrap();
  assert_eq!(decision.enrolment.status, EnrolmentStatus::Rejected);
  assert!(!decision.transfer_settled);
  assert_eq!(decision.organisation.nation, Some(Nation::England));

  let comments = s.regulator_comments(bob.enrolment.id).await.unwrap();
  assert_eq!(comments.len(), 1);
  assert_eq!(comments[0].kind, CommentKind::Rejection);
  assert_eq!(comments[0].regulator_person_id, regina.person.id);
}

#[tokio::test]
async fn decision_by_a_revoked_regulator_writes_nothing() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let regina = regulator(&s, Nation::England).await;
  pending(&s, &bob).await;
  s.delete_enrolment(regina.enrolment.id).await.unwrap();

  let err = s
    .decide_enrolment(
      bob.enrolment.id,
      StatusChange::new(EnrolmentStatus::Pending, EnrolmentStatus::Rejected),
      Some(comment(&regina, CommentKind::Rejection, "Missing evidence")),
      regulating(&regina, Nation::England),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::AuthorityRevoked { enrolment_id: regina.enrolment.id }
  );
  let unchanged = s.get_enrolment_by_id(bob.enrolment.id).await.unwrap().unwrap();
  assert_eq!(unchanged.enrolment.status, EnrolmentStatus::Pending);
  assert!(s.regulator_comments(bob.enrolment.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn regulator_of_another_nation_cannot_decide() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let gwen = regulator(&s, Nation::Wales).await;
  pending(&s, &bob).await;

  let err = s
    .decide_enrolment(
      bob.enrolment.id,
      StatusChange::new(EnrolmentStatus::Pending, EnrolmentStatus::Approved),
      None,
      regulating(&gwen, Nation::Wales),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::AuthorityRevoked { enrolment_id: gwen.enrolment.id }
  );

  // Claiming a nation the regulator's office does not belong to fails too.
  let err = s
    .decide_enrolment(
      bob.enrolment.id,
      StatusChange::new(EnrolmentStatus::Pending, EnrolmentStatus::Approved),
      None,
      regulating(&gwen, Nation::England),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::AuthorityRevoked { enrolment_id: gwen.enrolment.id }
  );
}

#[tokio::test]
async fn transfer_comments_every_enrolment_awaiting_a_regulator() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let carol = basic_user(&s, &org, "Carol").await;
  let erin = basic_user(&s, &org, "Erin").await;
  let regina = regulator(&s, Nation::England).await;
  pending(&s, &bob).await;
  pending(&s, &carol).await;
  s.set_status(
    carol.enrolment.id,
    StatusChange::new(EnrolmentStatus::Pending, EnrolmentStatus::OnHold),
  )
  .await
  .unwrap();

  let transferring = s
    .request_transfer(
      org.id,
      Nation::Wales,
      Some(comment(&regina, CommentKind::Transfer, "Moving to Wales")),
      regulating(&regina, Nation::England),
    )
    .await
    .unwrap();
  assert_eq!(transferring.nation, Some(Nation::England));
  assert_eq!(transferring.transfer_nation, Some(Nation::Wales));
  assert!(transferring.is_regulated_by(Nation::England));
  assert!(transferring.is_regulated_by(Nation::Wales));
  assert!(!transferring.is_regulated_by(Nation::Scotland));

  for awaiting in [&bob, &carol] {
    let comments = s.regulator_comments(awaiting.enrolment.id).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].kind, CommentKind::Transfer);
    assert_eq!(comments[0].text, "Moving to Wales");
  }
  assert!(s.regulator_comments(erin.enrolment.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn transfer_by_a_revoked_regulator_writes_nothing() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let regina = regulator(&s, Nation::England).await;
  pending(&s, &bob).await;
  s.set_status(
    regina.enrolment.id,
    StatusChange::new(EnrolmentStatus::Enrolled, EnrolmentStatus::Rejected),
  )
  .await
  .unwrap();

  let err = s
    .request_transfer(
      org.id,
      Nation::Wales,
      Some(comment(&regina, CommentKind::Transfer, "Moving to Wales")),
      regulating(&regina, Nation::England),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::AuthorityRevoked { enrolment_id: regina.enrolment.id }
  );

  let unchanged = s.get_organisation(org.external_id).await.unwrap().unwrap();
  assert_eq!(unchanged.transfer_nation, None);
  assert!(s.regulator_comments(bob.enrolment.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn final_decision_by_the_transfer_nation_settles_the_transfer() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let carol = basic_user(&s, &org, "Carol").await;
  let regina = regulator(&s, Nation::England).await;
  let gwen = regulator(&s, Nation::Wales).await;
  pending(&s, &bob).await;
  pending(&s, &carol).await;
  s.request_transfer(org.id, Nation::Wales, None, regulating(&regina, Nation::England))
    .await
    .unwrap();

  // Putting an enrolment on hold leaves the transfer pending.
  let held = s
    .decide_enrolment(
      carol.enrolment.id,
      StatusChange::new(EnrolmentStatus::Pending, EnrolmentStatus::OnHold),
      Some(comment(&gwen, CommentKind::OnHold, "Awaiting documents")),
      regulating(&gwen, Nation::Wales),
    )
    .await
    .unwrap();
  assert!(!held.transfer_settled);
  assert_eq!(held.organisation.transfer_nation, Some(Nation::Wales));

  let approved = s
    .decide_enrolment(
      bob.enrolment.id,
      StatusChange::new(EnrolmentStatus::Pending, EnrolmentStatus::Approved),
      None,
      regulating(&gwen, Nation::Wales),
    )
    .await
    .unwrap();
  assert!(approved.transfer_settled);
  assert_eq!(approved.organisation.nation, Some(Nation::Wales));
  assert_eq!(approved.organisation.transfer_nation, None);

  let stored = s.get_organisation(org.external_id).await.unwrap().unwrap();
  assert_eq!(stored, approved.organisation);

  // England no longer regulates the organisation.
  let err = s
    .decide_enrolment(
      carol.enrolment.id,
      StatusChange::new(EnrolmentStatus::OnHold, EnrolmentStatus::Approved),
      None,
      regulating(&regina, Nation::England),
    )
    .await
    .unwrap_err();
  assert_eq!(
    conflict(&err),
    WriteConflict::AuthorityRevoked { enrolment_id: regina.enrolment.id }
  );
}

#[tokio::test]
async fn comments_come_back_oldest_first() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let regina = regulator(&s, Nation::England).await;
  pending(&s, &bob).await;

  s.decide_enrolment(
    bob.enrolment.id,
    StatusChange::new(EnrolmentStatus::Pending, EnrolmentStatus::OnHold),
    Some(comment(&regina, CommentKind::OnHold, "first")),
    regulating(&regina, Nation::England),
  )
  .await
  .unwrap();
  s.request_transfer(
    org.id,
    Nation::Scotland,
    Some(comment(&regina, CommentKind::Transfer, "second")),
    regulating(&regina, Nation::England),
  )
  .await
  .unwrap();

  let texts: Vec<_> = s
    .regulator_comments(bob.enrolment.id)
    .await
    .unwrap()
    .into_iter()
    .map(|c| c.text)
    .collect();
  assert_eq!(texts, ["first", "second"]);
}
