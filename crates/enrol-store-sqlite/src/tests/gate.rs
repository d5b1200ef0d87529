use enrol_core::{
  gate::AuthorizationGate,
  role::{Nation, PersonRole, ServiceRole},
  status::{EnrolmentStatus, StatusChange},
  store::{AccountStore, RegulatorAuthority},
};
use uuid::Uuid;

use super::{approved_person, basic_user, member, organisation, regulator, store};

#[tokio::test]
async fn management_roles_manage_users_for_their_service() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let gate = AuthorizationGate::new(&s);

  assert!(
    gate
      .is_authorised_to_manage_users_for_service(alice.user_id, org.external_id, "Packaging")
      .await
      .unwrap()
  );
  assert!(
    !gate
      .is_authorised_to_manage_users_for_service(bob.user_id, org.external_id, "Packaging")
      .await
      .unwrap()
  );
  assert!(
    !gate
      .is_authorised_to_manage_users_for_service(alice.user_id, org.external_id, "Regulating")
      .await
      .unwrap()
  );
  assert!(
    !gate
      .is_authorised_to_manage_users_for_service(alice.user_id, org.external_id, "packaging")
      .await
      .unwrap()
  );
}

#[tokio::test]
async fn authority_is_scoped_to_the_organisation() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let other = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let gate = AuthorizationGate::new(&s);

  assert!(
    !gate
      .is_authorised_to_manage_users_for_service(alice.user_id, other.external_id, "Packaging")
      .await
      .unwrap()
  );
  assert!(
    !gate
      .is_authorised_to_manage_delegated_users_for_service(
        alice.user_id,
        other.external_id,
        "Packaging"
      )
      .await
      .unwrap()
  );
}

#[tokio::test]
async fn minimum_role_comparison_stays_within_the_service() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let gate = AuthorizationGate::new(&s);

  let may = |user: Uuid, role: ServiceRole| {
    let gate = &gate;
    let org = org.external_id;
    async move { gate.is_authorised_to_manage_users(user, org, role).await.unwrap() }
  };

  assert!(may(alice.user_id, ServiceRole::DelegatedPerson).await);
  assert!(may(alice.user_id, ServiceRole::BasicUser).await);
  assert!(may(bob.user_id, ServiceRole::BasicUser).await);
  assert!(!may(bob.user_id, ServiceRole::DelegatedPerson).await);
  assert!(!may(alice.user_id, ServiceRole::RegulatorBasic).await);
}

#[tokio::test]
async fn only_an_approved_approved_person_manages_delegates() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let gate = AuthorizationGate::new(&s);

  let check = || {
    gate.is_authorised_to_manage_delegated_users_for_service(
      alice.user_id,
      org.external_id,
      "Packaging",
    )
  };
  assert!(check().await.unwrap());

  // Re-read on every call: a hold takes effect immediately.
  s.set_status(
    alice.enrolment.id,
    StatusChange::new(EnrolmentStatus::Approved, EnrolmentStatus::OnHold),
  )
  .await
  .unwrap();
  assert!(!check().await.unwrap());
}

#[tokio::test]
async fn delegated_person_cannot_manage_delegates() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let dee = member(
    &s,
    &org,
    "Dee",
    PersonRole::Admin,
    ServiceRole::DelegatedPerson,
    EnrolmentStatus::Approved,
  )
  .await;
  let gate = AuthorizationGate::new(&s);

  assert!(
    gate
      .is_authorised_to_manage_users_for_service(dee.user_id, org.external_id, "Packaging")
      .await
      .unwrap()
  );
  assert!(
    !gate
      .is_authorised_to_manage_delegated_users_for_service(
        dee.user_id,
        org.external_id,
        "Packaging"
      )
      .await
      .unwrap()
  );
}

#[tokio::test]
async fn removal_needs_authority_over_someone_else() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let other = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let bob = basic_user(&s, &org, "Bob").await;
  let carol = basic_user(&s, &org, "Carol").await;
  let outsider = basic_user(&s, &other, "Olga").await;
  let gate = AuthorizationGate::new(&s);

  let may_remove = |user: Uuid, target: Uuid| {
    let gate = &gate;
    let org = org.external_id;
    async move {
      gate
        .is_authorised_to_remove_enrolled_user(user, org, ServiceRole::BasicUser, target)
        .await
        .unwrap()
    }
  };

  assert!(may_remove(alice.user_id, bob.person.external_id).await);
  assert!(!may_remove(alice.user_id, alice.person.external_id).await);
  assert!(!may_remove(alice.user_id, outsider.person.external_id).await);
  assert!(!may_remove(alice.user_id, Uuid::new_v4()).await);
  assert!(!may_remove(bob.user_id, carol.person.external_id).await);
}

#[tokio::test]
async fn admin_basic_user_may_remove_basic_users() {
  let s = store().await;
  let org = organisation(&s, Nation::England).await;
  let admin = member(
    &s,
    &org,
    "Ada",
    PersonRole::Admin,
    ServiceRole::BasicUser,
    EnrolmentStatus::Enrolled,
  )
  .await;
  let bob = basic_user(&s, &org, "Bob").await;
  let gate = AuthorizationGate::new(&s);

  assert!(
    gate
      .is_authorised_to_remove_enrolled_user(
        admin.user_id,
        org.external_id,
        ServiceRole::BasicUser,
        bob.person.external_id,
      )
      .await
      .unwrap()
  );
  assert!(
    !gate
      .is_authorised_to_remove_enrolled_user(
        admin.user_id,
        org.external_id,
        ServiceRole::ApprovedPerson,
        bob.person.external_id,
      )
      .await
      .unwrap()
  );
}

#[tokio::test]
async fn regulator_nation_comes_from_the_regulator_organisation() {
  let s = store().await;
  let wales = regulator(&s, Nation::Wales).await;
  let org = organisation(&s, Nation::England).await;
  let alice = approved_person(&s, &org).await;
  let gate = AuthorizationGate::new(&s);

  assert_eq!(gate.regulator_nation(wales.user_id).await.unwrap(), Some(Nation::Wales));
  assert_eq!(gate.regulator_nation(alice.user_id).await.unwrap(), None);

  assert!(
    !gate
      .does_regulator_nation_match_organisation_nation(wales.user_id, org.external_id)
      .await
      .unwrap()
  );

  let england = regulator(&s, Nation::England).await;
  s.request_transfer(
    org.id,
    Nation::Wales,
    None,
    RegulatorAuthority { enrolment_id: england.enrolment.id, nation: Nation::England },
  )
  .await
  .unwrap();
  assert!(
    gate
      .does_regulator_nation_match_organisation_nation(wales.user_id, org.external_id)
      .await
      .unwrap()
  );
}
