//! Authorization gate: read-only predicates derived from enrolment state.
//!
//! Every predicate re-reads the store; nothing is cached between requests.
//! The gate never writes.

use uuid::Uuid;

use crate::{
  enrolment::EnrolmentDetail,
  organisation::Organisation,
  outcome::Rejection,
  role::{Nation, PersonRole, Service, ServiceRole},
  status::EnrolmentStatus,
  store::{AccountStore, Authority, RegulatorAuthority},
};

/// A regulator cleared to act on one organisation.
#[derive(Debug, Clone)]
pub struct RegulatorClearance {
  pub person_id:    i64,
  pub authority:    RegulatorAuthority,
  pub organisation: Organisation,
}

/// Borrowing view over a store that answers "may this user do that here".
pub struct AuthorizationGate<'s, S> {
  store: &'s S,
}

impl<'s, S: AccountStore> AuthorizationGate<'s, S> {
  pub fn new(store: &'s S) -> Self { Self { store } }

  /// The user's active enrolments inside one organisation.
  async fn enrolments_in(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
  ) -> Result<Vec<EnrolmentDetail>, S::Error> {
    let mut all = self.store.user_enrolments(user_id, None).await?;
    all.retain(|d| d.organisation.external_id == organisation_id);
    Ok(all)
  }

  /// The user holds an Enrolled/Approved enrolment in the organisation in the
  /// same service as `min_role`, at or above its privilege.
  pub async fn is_authorised_to_manage_users(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    min_role: ServiceRole,
  ) -> Result<bool, S::Error> {
    let mine = self.enrolments_in(user_id, organisation_id).await?;
    Ok(mine.iter().any(|d| {
      d.enrolment.status.is_active_authority()
        && d.enrolment.service_role.at_or_above(min_role)
    }))
  }

  /// The user holds one of the service's management roles, Enrolled or
  /// Approved, in the organisation. Unknown service keys never authorise.
  pub async fn is_authorised_to_manage_users_for_service(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<bool, S::Error> {
    Ok(
      self
        .service_manager_enrolment(user_id, organisation_id, service_key)
        .await?
        .is_some(),
    )
  }

  /// The management enrolment that lets the user manage the service's
  /// users, if they hold one.
  pub async fn service_manager_enrolment(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<Option<EnrolmentDetail>, S::Error> {
    let Some(service) = Service::from_key(service_key) else {
      return Ok(None);
    };
    let mine = self.enrolments_in(user_id, organisation_id).await?;
    Ok(mine.into_iter().find(|d| {
      d.enrolment.status.is_active_authority()
        && service.management_roles().contains(&d.enrolment.service_role)
    }))
  }

  /// The user is an Approved Person with status Approved, the only holder
  /// allowed to nominate a Delegated Person.
  pub async fn is_authorised_to_manage_delegated_users_for_service(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<bool, S::Error> {
    Ok(
      self
        .approved_person_enrolment(user_id, organisation_id, service_key)
        .await?
        .is_some(),
    )
  }

  /// The Approved/Approved-Person enrolment that backs the user's authority
  /// to nominate delegates, if they hold one.
  pub async fn approved_person_enrolment(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<Option<EnrolmentDetail>, S::Error> {
    match Service::from_key(service_key) {
      Some(service) if service.supports_delegation() => {}
      _ => return Ok(None),
    }
    let mine = self.enrolments_in(user_id, organisation_id).await?;
    Ok(mine.into_iter().find(|d| {
      d.enrolment.service_role == ServiceRole::ApprovedPerson
        && d.enrolment.status == EnrolmentStatus::Approved
    }))
  }

  /// The caller is admin-equivalent in the organisation for `service_role`'s
  /// service with privilege at or above it, and the target person is someone
  /// else connected to the same organisation.
  pub async fn is_authorised_to_remove_enrolled_user(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_role: ServiceRole,
    target_person_id: Uuid,
  ) -> Result<bool, S::Error> {
    Ok(
      self
        .removal_authority(user_id, organisation_id, service_role, target_person_id)
        .await?
        .is_some(),
    )
  }

  /// The authority under which the user may remove the target's
  /// `service_role` enrolments, if they have it.
  pub async fn removal_authority(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_role: ServiceRole,
    target_person_id: Uuid,
  ) -> Result<Option<Authority>, S::Error> {
    let mine = self.enrolments_in(user_id, organisation_id).await?;
    let Some(held) = mine.iter().find(|d| {
      let role = d.enrolment.service_role;
      d.enrolment.status.is_active_authority()
        && role.at_or_above(service_role)
        && (role.is_management_role()
          || d.connection.person_role == PersonRole::Admin)
    }) else {
      return Ok(None);
    };

    let Some(target) = self.store.get_person(target_person_id).await? else {
      return Ok(None);
    };
    if target.id == held.person.id {
      return Ok(None);
    }

    let connection = self
      .store
      .find_connection(target.id, held.organisation.id)
      .await?;
    if connection.is_none() {
      return Ok(None);
    }

    let authority = if held.enrolment.service_role.is_management_role() {
      Authority::of(held.enrolment.id)
    } else {
      Authority::via_admin(held.enrolment.id)
    };
    Ok(Some(authority))
  }

  /// The nation the user regulates, derived from their active enrolment in
  /// the regulators' service. `None` for non-regulators.
  pub async fn regulator_nation(
    &self,
    user_id: Uuid,
  ) -> Result<Option<Nation>, S::Error> {
    Ok(self.regulator_enrolment(user_id).await?.and_then(|d| d.organisation.nation))
  }

  async fn regulator_enrolment(
    &self,
    user_id: Uuid,
  ) -> Result<Option<EnrolmentDetail>, S::Error> {
    let all = self.store.user_enrolments(user_id, None).await?;
    Ok(all.into_iter().find(|d| {
      d.enrolment.service() == Service::Regulating
        && d.enrolment.status.is_active_authority()
    }))
  }

  /// The regulator's nation equals the organisation's nation or the nation it
  /// is being transferred to.
  pub async fn does_regulator_nation_match_organisation_nation(
    &self,
    regulator_user_id: Uuid,
    organisation_id: Uuid,
  ) -> Result<bool, S::Error> {
    Ok(
      self
        .regulator_clearance(regulator_user_id, organisation_id)
        .await?
        .is_some(),
    )
  }

  /// The regulator's standing over the organisation, when their nation
  /// matches it.
  pub async fn regulator_clearance(
    &self,
    regulator_user_id: Uuid,
    organisation_id: Uuid,
  ) -> Result<Option<RegulatorClearance>, S::Error> {
    let Some(regulator) = self.regulator_enrolment(regulator_user_id).await? else {
      return Ok(None);
    };
    let Some(nation) = regulator.organisation.nation else {
      return Ok(None);
    };
    let Some(organisation) = self.store.get_organisation(organisation_id).await?
    else {
      return Ok(None);
    };
    if !organisation.is_regulated_by(nation) {
      return Ok(None);
    }
    Ok(Some(RegulatorClearance {
      person_id: regulator.person.id,
      authority: RegulatorAuthority { enrolment_id: regulator.enrolment.id, nation },
      organisation,
    }))
  }
}

/// Build the rejection for a failed predicate, logging who asked and where.
pub fn denied(check: &'static str, user_id: Uuid, organisation_id: Uuid) -> Rejection {
  tracing::warn!(%user_id, %organisation_id, check, "authorisation check failed");
  Rejection::Unauthorised(format!("{check} does not hold for this user"))
}
