//! Membership management: inviting people, accepting invitations, removing
//! enrolments and changing a connection's person role.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
  AccountService, Failure, StoreResultExt as _, delegation_service,
  require_text, settle,
};
use crate::{
  connection::{Connection, NewConnection},
  enrolment::{Enrolment, NewEnrolment},
  gate::denied,
  outcome::{DomainRule, Outcome, Rejection, RoleManagementError},
  person::NewPerson,
  role::{PersonRole, ServiceRole},
  status::{EnrolmentStatus, StatusChange},
  store::{AccountStore, Authority},
};

pub use crate::store::Removal;

/// Details of a person invited into an organisation as a basic user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
  pub first_name:  String,
  pub last_name:   String,
  pub email:       String,
  pub telephone:   Option<String>,
  pub person_role: PersonRole,
  pub job_title:   Option<String>,
}

impl<S: AccountStore> AccountService<S> {
  /// Invite a person into the organisation. Creates the person, their
  /// connection and a Basic User enrolment in status Invited. Token
  /// generation and delivery happen elsewhere.
  pub async fn invite_person(
    &self,
    acting_user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
    invitation: Invitation,
  ) -> Result<Outcome<Enrolment>, RoleManagementError> {
    settle(
      self
        .invite_person_inner(acting_user_id, organisation_id, service_key, invitation)
        .await,
    )
  }

  async fn invite_person_inner(
    &self,
    acting_user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
    invitation: Invitation,
  ) -> Result<Enrolment, Failure> {
    const OP: &str = "invite_person";

    delegation_service(service_key)?;
    require_text("first_name", &invitation.first_name)?;
    require_text("last_name", &invitation.last_name)?;
    require_text("email", &invitation.email)?;
    if !invitation.email.contains('@') {
      return Err(Rejection::validation("email is not an email address").into());
    }
    if invitation.person_role == PersonRole::Member {
      return Err(
        Rejection::validation("invited users must be an admin or an employee").into(),
      );
    }

    if !self
      .gate()
      .is_authorised_to_manage_users_for_service(
        acting_user_id,
        organisation_id,
        service_key,
      )
      .await
      .fatal(OP)?
    {
      return Err(
        denied(
          "is_authorised_to_manage_users_for_service",
          acting_user_id,
          organisation_id,
        )
        .into(),
      );
    }

    let organisation = self
      .store()
      .get_organisation(organisation_id)
      .await
      .fatal(OP)?
      .ok_or_else(|| Rejection::not_found("organisation"))?;

    let person = self
      .store()
      .add_person(NewPerson {
        first_name: invitation.first_name,
        last_name:  invitation.last_name,
        email:      invitation.email,
        telephone:  invitation.telephone,
        user_id:    None,
      })
      .await
      .fatal(OP)?;

    let mut connection =
      NewConnection::new(person.id, organisation.id, invitation.person_role);
    connection.job_title = invitation.job_title;
    let connection = self.store().add_connection(connection).await.fatal(OP)?;

    let enrolment = self
      .store()
      .create_enrolment(NewEnrolment::new(
        connection.id,
        ServiceRole::BasicUser,
        EnrolmentStatus::Invited,
      ))
      .await
      .or_conflict(OP)?;

    tracing::info!(
      enrolment_id = %enrolment.external_id,
      %acting_user_id,
      %organisation_id,
      "person invited"
    );
    Ok(enrolment)
  }

  /// Accept an invitation as `user_id`: links the invited person to the
  /// login and moves the enrolment Invited → Enrolled.
  pub async fn accept_invitation(
    &self,
    user_id: Uuid,
    enrolment_id: Uuid,
  ) -> Result<Outcome<Enrolment>, RoleManagementError> {
    settle(self.accept_invitation_inner(user_id, enrolment_id).await)
  }

  async fn accept_invitation_inner(
    &self,
    user_id: Uuid,
    enrolment_id: Uuid,
  ) -> Result<Enrolment, Failure> {
    const OP: &str = "accept_invitation";

    let detail = self
      .store()
      .get_enrolment(enrolment_id)
      .await
      .fatal(OP)?
      .ok_or_else(|| Rejection::not_found("invitation"))?;

    let actual = detail.enrolment.status;
    if actual != EnrolmentStatus::Invited {
      return Err(
        DomainRule::WrongCurrentStatus { expected: EnrolmentStatus::Invited, actual }
          .into(),
      );
    }

    match detail.person.user_id {
      Some(linked) if linked == user_id => {}
      Some(_) => {
        tracing::warn!(%enrolment_id, %user_id, "invitation claimed by another user");
        return Err(DomainRule::IdMismatch.into());
      }
      None => {
        self
          .store()
          .link_person_to_user(detail.person.id, user_id)
          .await
          .or_conflict(OP)?;
      }
    }

    let enrolment = self
      .store()
      .set_status(
        detail.enrolment.id,
        StatusChange::new(EnrolmentStatus::Invited, EnrolmentStatus::Enrolled),
      )
      .await
      .or_conflict(OP)?;

    tracing::info!(%enrolment_id, %user_id, "invitation accepted");
    Ok(enrolment)
  }

  /// Remove a person's enrolments for `service_role_id` from the
  /// organisation. When nothing else ties the person to the organisation
  /// their connection is removed too. Rows are soft-deleted.
  pub async fn remove_enrolment(
    &self,
    user_id: Uuid,
    person_id: Uuid,
    organisation_id: Uuid,
    service_role_id: i64,
  ) -> Result<Outcome<Removal>, RoleManagementError> {
    settle(
      self
        .remove_enrolment_inner(user_id, person_id, organisation_id, service_role_id)
        .await,
    )
  }

  async fn remove_enrolment_inner(
    &self,
    user_id: Uuid,
    person_id: Uuid,
    organisation_id: Uuid,
    service_role_id: i64,
  ) -> Result<Removal, Failure> {
    const OP: &str = "remove_enrolment";

    let service_role = ServiceRole::from_id(service_role_id)
      .map_err(|e| Rejection::validation(e.to_string()))?;

    let Some(authority) = self
      .gate()
      .removal_authority(user_id, organisation_id, service_role, person_id)
      .await
      .fatal(OP)?
    else {
      return Err(
        denied("is_authorised_to_remove_enrolled_user", user_id, organisation_id)
          .into(),
      );
    };

    let organisation = self
      .store()
      .get_organisation(organisation_id)
      .await
      .fatal(OP)?
      .ok_or_else(|| Rejection::not_found("organisation"))?;
    let person = self
      .store()
      .get_person(person_id)
      .await
      .fatal(OP)?
      .ok_or_else(|| Rejection::not_found("person"))?;
    let connection = self
      .store()
      .find_connection(person.id, organisation.id)
      .await
      .fatal(OP)?
      .ok_or_else(|| Rejection::not_found("connection"))?;

    let removal = self
      .store()
      .remove_enrolments(connection.id, service_role, authority)
      .await
      .or_conflict(OP)?;
    if removal.enrolments_removed == 0 {
      return Err(Rejection::not_found("enrolment").into());
    }

    tracing::info!(
      %person_id,
      %organisation_id,
      %user_id,
      %service_role,
      enrolments_removed = removal.enrolments_removed,
      connection_removed = removal.connection_removed,
      "enrolment removed"
    );
    Ok(removal)
  }

  /// Change the person role on a connection within the organisation.
  ///
  /// Users cannot change their own role, and an Approved Person's role is
  /// fixed while they hold that enrolment.
  pub async fn update_person_role(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
    connection_id: Uuid,
    role: PersonRole,
  ) -> Result<Outcome<Connection>, RoleManagementError> {
    settle(
      self
        .update_person_role_inner(user_id, organisation_id, service_key, connection_id, role)
        .await,
    )
  }

  async fn update_person_role_inner(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
    connection_id: Uuid,
    role: PersonRole,
  ) -> Result<Connection, Failure> {
    const OP: &str = "update_person_role";

    let service = delegation_service(service_key)?;

    let Some(manager) = self
      .gate()
      .service_manager_enrolment(user_id, organisation_id, service_key)
      .await
      .fatal(OP)?
    else {
      return Err(
        denied("is_authorised_to_manage_users_for_service", user_id, organisation_id)
          .into(),
      );
    };

    let organisation = self
      .store()
      .get_organisation(organisation_id)
      .await
      .fatal(OP)?
      .ok_or_else(|| Rejection::not_found("organisation"))?;
    let connection = self
      .store()
      .get_connection(connection_id)
      .await
      .fatal(OP)?
      .filter(|c| c.organisation_id == organisation.id)
      .ok_or_else(|| Rejection::not_found("connection"))?;

    if manager.person.id == connection.person_id {
      return Err(DomainRule::SelfRoleChange.into());
    }

    let held: Vec<_> = self
      .store()
      .organisation_enrolments(organisation.id, Some(service))
      .await
      .fatal(OP)?
      .into_iter()
      .filter(|d| d.connection.id == connection.id)
      .collect();

    let is_approved_person = held.iter().any(|d| {
      d.enrolment.service_role == ServiceRole::ApprovedPerson
        && d.enrolment.status != EnrolmentStatus::Rejected
    });
    if is_approved_person {
      return Err(DomainRule::ApprovedPersonRoleLocked.into());
    }

    let change = self
      .store()
      .change_person_role(connection.id, role, Authority::of(manager.enrolment.id))
      .await
      .or_conflict(OP)?;

    for enrolment_id in &change.delegations_removed {
      tracing::info!(
        %enrolment_id,
        %connection_id,
        "delegated person enrolment removed on demotion"
      );
    }

    tracing::info!(
      %connection_id,
      %organisation_id,
      %user_id,
      from = ?connection.person_role,
      to = ?role,
      "person role updated"
    );
    Ok(change.connection)
  }
}
