//! Approved Person and Delegated Person nominations.
//!
//! ```text
//!  Enrolled(basic) --nominate--> Nominated --accept--> Approved (delegated person)
//!                                    |                  Pending  (approved person)
//!                                    '--decline--> Rejected
//! ```
//!
//! Nomination and acceptance are separate requests that may be days apart;
//! everything between them lives in the store. Acceptance is a status
//! compare-and-swap, so a second acceptance, or one racing a regulator, fails
//! instead of overwriting.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
  AccountService, Failure, StoreResultExt as _, delegation_service,
  inconsistent, is_missing, require_text, settle,
};
use crate::{
  enrolment::{Enrolment, EnrolmentDetail, NewEnrolment},
  gate::denied,
  nomination::{Declaration, NewDelegatedNomination, Relationship},
  outcome::{DomainRule, Outcome, Rejection, RoleManagementError},
  role::{Service, ServiceRole},
  status::{EnrolmentStatus, StatusChange},
  store::{AccountStore, Authority, StoreError as _},
};

// ─── Requests ────────────────────────────────────────────────────────────────

/// Body of a Delegated Person nomination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedPersonNominationRequest {
  pub relationship:          Relationship,
  /// The nominating Approved Person's declaration, usually their full name.
  pub nominator_declaration: String,
}

/// Body of a nomination acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NominationAcceptance {
  /// The nominee's declaration, usually their full name.
  pub declaration: String,
}

/// Who nominated a Delegated Person, for display to the nominee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominatorDetails {
  pub first_name:        String,
  pub last_name:         String,
  pub organisation_name: String,
}

// ─── Workflows ───────────────────────────────────────────────────────────────

impl<S: AccountStore> AccountService<S> {
  /// Nominate the person behind `connection_id` as a Delegated Person.
  ///
  /// The acting user must be an Approved Person with status Approved; their
  /// Approved Person enrolment becomes the nomination's nominator. One
  /// nominator enrolment backs at most one nomination.
  pub async fn nominate_delegated_person(
    &self,
    connection_id: Uuid,
    acting_user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
    request: DelegatedPersonNominationRequest,
  ) -> Result<Outcome<Enrolment>, RoleManagementError> {
    settle(
      self
        .nominate_delegated_person_inner(
          connection_id,
          acting_user_id,
          organisation_id,
          service_key,
          request,
        )
        .await,
    )
  }

  async fn nominate_delegated_person_inner(
    &self,
    connection_id: Uuid,
    acting_user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
    request: DelegatedPersonNominationRequest,
  ) -> Result<Enrolment, Failure> {
    const OP: &str = "nominate_delegated_person";

    let service = delegation_service(service_key)?;
    require_text("nominator_declaration", &request.nominator_declaration)?;
    if let Some(field) = request.relationship.missing_detail() {
      return Err(Rejection::validation(format!("{field} must not be blank")).into());
    }

    let gate = self.gate();
    if !gate
      .is_authorised_to_manage_delegated_users_for_service(
        acting_user_id,
        organisation_id,
        service_key,
      )
      .await
      .fatal(OP)?
    {
      return Err(
        denied(
          "is_authorised_to_manage_delegated_users_for_service",
          acting_user_id,
          organisation_id,
        )
        .into(),
      );
    }

    // The gate has just seen this enrolment; if it is gone now the store
    // changed underneath us.
    let nominator = gate
      .approved_person_enrolment(acting_user_id, organisation_id, service_key)
      .await
      .fatal(OP)?
      .ok_or_else(|| inconsistent(OP, "nominator enrolment vanished after the gate check"))?;

    let nominee = self
      .nominee_connection(connection_id, &nominator, service, OP)
      .await?;

    let created = self
      .store()
      .create_delegated_nomination(
        NewEnrolment::new(
          nominee,
          ServiceRole::DelegatedPerson,
          EnrolmentStatus::Nominated,
        ),
        NewDelegatedNomination {
          nominator_enrolment_id: nominator.enrolment.id,
          relationship:           request.relationship,
          nominator_declaration:  Declaration::new(request.nominator_declaration),
        },
      )
      .await;

    let (enrolment, _nomination) = match created {
      Err(e)
        if e
          .as_conflict()
          .is_some_and(|c| is_missing(c, nominator.enrolment.id)) =>
      {
        return Err(inconsistent(OP, "nominator enrolment vanished mid-nomination"));
      }
      other => other.or_conflict(OP)?,
    };

    tracing::info!(
      enrolment_id = %enrolment.external_id,
      nominator_enrolment_id = %nominator.enrolment.external_id,
      %organisation_id,
      "delegated person nominated"
    );
    Ok(enrolment)
  }

  /// Accept a Delegated Person nomination: Nominated → Approved.
  pub async fn accept_nomination_to_delegated_person(
    &self,
    enrolment_id: Uuid,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
    acceptance: NominationAcceptance,
  ) -> Result<Outcome<Enrolment>, RoleManagementError> {
    settle(
      self
        .accept_nomination(
          "accept_nomination_to_delegated_person",
          ServiceRole::DelegatedPerson,
          enrolment_id,
          user_id,
          organisation_id,
          service_key,
          acceptance,
        )
        .await,
    )
  }

  /// Nominate the person behind `connection_id` as an Approved Person.
  ///
  /// The nominating act is the organisation's, performed by any user who
  /// may manage users of the service.
  pub async fn nominate_approved_person(
    &self,
    connection_id: Uuid,
    acting_user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<Outcome<Enrolment>, RoleManagementError> {
    settle(
      self
        .nominate_approved_person_inner(
          connection_id,
          acting_user_id,
          organisation_id,
          service_key,
        )
        .await,
    )
  }

  async fn nominate_approved_person_inner(
    &self,
    connection_id: Uuid,
    acting_user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<Enrolment, Failure> {
    const OP: &str = "nominate_approved_person";

    let service = delegation_service(service_key)?;
    let Some(manager) = self
      .gate()
      .service_manager_enrolment(acting_user_id, organisation_id, service_key)
      .await
      .fatal(OP)?
    else {
      return Err(
        denied(
          "is_authorised_to_manage_users_for_service",
          acting_user_id,
          organisation_id,
        )
        .into(),
      );
    };

    let nominee = self.nominee_connection(connection_id, &manager, service, OP).await?;

    let (enrolment, _nomination) = self
      .store()
      .create_approved_person_nomination(
        NewEnrolment::new(nominee, ServiceRole::ApprovedPerson, EnrolmentStatus::Nominated),
        Authority::of(manager.enrolment.id),
      )
      .await
      .or_conflict(OP)?;

    tracing::info!(
      enrolment_id = %enrolment.external_id,
      %acting_user_id,
      %organisation_id,
      "approved person nominated"
    );
    Ok(enrolment)
  }

  /// Accept an Approved Person nomination: Nominated → Pending, after which
  /// the enrolment waits for a regulator's decision.
  pub async fn accept_nomination_to_approved_person(
    &self,
    enrolment_id: Uuid,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
    acceptance: NominationAcceptance,
  ) -> Result<Outcome<Enrolment>, RoleManagementError> {
    settle(
      self
        .accept_nomination(
          "accept_nomination_to_approved_person",
          ServiceRole::ApprovedPerson,
          enrolment_id,
          user_id,
          organisation_id,
          service_key,
          acceptance,
        )
        .await,
    )
  }

  /// The nominee turns the nomination down: Nominated → Rejected.
  pub async fn decline_nomination(
    &self,
    enrolment_id: Uuid,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<Outcome<Enrolment>, RoleManagementError> {
    settle(
      self
        .decline_nomination_inner(enrolment_id, user_id, organisation_id, service_key)
        .await,
    )
  }

  async fn decline_nomination_inner(
    &self,
    enrolment_id: Uuid,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<Enrolment, Failure> {
    const OP: &str = "decline_nomination";

    let service = delegation_service(service_key)?;
    let detail = self
      .addressed_enrolment(enrolment_id, user_id, organisation_id, service, OP)
      .await?;

    let role = detail.enrolment.service_role;
    if !matches!(role, ServiceRole::ApprovedPerson | ServiceRole::DelegatedPerson) {
      return Err(
        DomainRule::WrongServiceRole {
          expected: ServiceRole::DelegatedPerson,
          actual:   role,
        }
        .into(),
      );
    }
    expect_status(&detail, EnrolmentStatus::Nominated)?;

    let enrolment = self
      .store()
      .set_status(
        detail.enrolment.id,
        StatusChange::new(EnrolmentStatus::Nominated, EnrolmentStatus::Rejected),
      )
      .await
      .or_conflict(OP)?;

    tracing::info!(%enrolment_id, %user_id, service_role = %role, "nomination declined");
    Ok(enrolment)
  }

  /// Resolve who nominated a Delegated Person. Every mismatch (unknown
  /// enrolment, missing nomination, someone else's enrolment)
  /// is reported as not found.
  pub async fn get_delegated_person_nominator(
    &self,
    enrolment_id: Uuid,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<Outcome<NominatorDetails>, RoleManagementError> {
    settle(
      self
        .get_delegated_person_nominator_inner(
          enrolment_id,
          user_id,
          organisation_id,
          service_key,
        )
        .await,
    )
  }

  async fn get_delegated_person_nominator_inner(
    &self,
    enrolment_id: Uuid,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<NominatorDetails, Failure> {
    const OP: &str = "get_delegated_person_nominator";
    let not_found = || Failure::from(Rejection::not_found("nomination"));

    let service = delegation_service(service_key).map_err(|_| not_found())?;
    let detail = self
      .store()
      .get_enrolment(enrolment_id)
      .await
      .fatal(OP)?
      .filter(|d| d.is_addressed_to(user_id, organisation_id, service))
      .ok_or_else(not_found)?;

    let nomination = self
      .store()
      .get_delegated_nomination(detail.enrolment.id)
      .await
      .fatal(OP)?
      .ok_or_else(not_found)?;

    let nominator = self
      .store()
      .get_enrolment_by_id(nomination.nominator_enrolment_id)
      .await
      .fatal(OP)?
      .ok_or_else(not_found)?;

    Ok(NominatorDetails {
      first_name:        nominator.person.first_name,
      last_name:         nominator.person.last_name,
      organisation_name: nominator.organisation.name,
    })
  }

  // ── Shared steps ──────────────────────────────────────────────────────

  /// Validate the nominee connection against the nominating side and return
  /// its internal id.
  async fn nominee_connection(
    &self,
    connection_id: Uuid,
    nominator: &EnrolmentDetail,
    service: Service,
    operation: &'static str,
  ) -> Result<i64, Failure> {
    let connection = self
      .store()
      .get_connection(connection_id)
      .await
      .fatal(operation)?
      .filter(|c| c.organisation_id == nominator.organisation.id)
      .ok_or_else(|| Rejection::not_found("connection"))?;

    if connection.id == nominator.connection.id {
      return Err(DomainRule::SelfNomination.into());
    }

    let enrolled = self
      .store()
      .organisation_enrolments(nominator.organisation.id, Some(service))
      .await
      .fatal(operation)?
      .iter()
      .any(|d| {
        d.connection.id == connection.id && d.enrolment.status.is_active_authority()
      });
    if !enrolled {
      return Err(DomainRule::NomineeNotEnrolled.into());
    }

    Ok(connection.id)
  }

  /// Load an enrolment and require that it belongs to the user, organisation
  /// and service named in the request.
  async fn addressed_enrolment(
    &self,
    enrolment_id: Uuid,
    user_id: Uuid,
    organisation_id: Uuid,
    service: Service,
    operation: &'static str,
  ) -> Result<EnrolmentDetail, Failure> {
    let detail = self
      .store()
      .get_enrolment(enrolment_id)
      .await
      .fatal(operation)?
      .ok_or_else(|| Rejection::not_found("enrolment"))?;

    if !detail.is_addressed_to(user_id, organisation_id, service) {
      tracing::warn!(
        operation,
        %enrolment_id,
        %user_id,
        %organisation_id,
        "enrolment addressed with mismatched identity"
      );
      return Err(DomainRule::IdMismatch.into());
    }
    Ok(detail)
  }

  #[allow(clippy::too_many_arguments)]
  async fn accept_nomination(
    &self,
    operation: &'static str,
    role: ServiceRole,
    enrolment_id: Uuid,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
    acceptance: NominationAcceptance,
  ) -> Result<Enrolment, Failure> {
    let service = delegation_service(service_key)?;
    require_text("declaration", &acceptance.declaration)?;

    let detail = self
      .addressed_enrolment(enrolment_id, user_id, organisation_id, service, operation)
      .await?;

    if detail.enrolment.service_role != role {
      return Err(
        DomainRule::WrongServiceRole {
          expected: role,
          actual:   detail.enrolment.service_role,
        }
        .into(),
      );
    }
    expect_status(&detail, EnrolmentStatus::Nominated)?;

    if let Some(at) = self.policy().expiry_of(&detail.enrolment)
      && at <= Utc::now()
    {
      return Err(DomainRule::NominationExpired(at).into());
    }

    let declaration = Declaration::new(acceptance.declaration);
    let id = detail.enrolment.id;
    let enrolment = match role {
      ServiceRole::DelegatedPerson => {
        self
          .store()
          .get_delegated_nomination(id)
          .await
          .fatal(operation)?
          .ok_or_else(|| inconsistent(operation, "nominated enrolment has no nomination record"))?;
        self
          .store()
          .accept_delegated_nomination(
            id,
            StatusChange::new(EnrolmentStatus::Nominated, EnrolmentStatus::Approved),
            declaration,
          )
          .await
          .or_conflict(operation)?
      }
      _ => {
        self
          .store()
          .get_approved_person_nomination(id)
          .await
          .fatal(operation)?
          .ok_or_else(|| inconsistent(operation, "nominated enrolment has no nomination record"))?;
        self
          .store()
          .accept_approved_person_nomination(
            id,
            StatusChange::new(EnrolmentStatus::Nominated, EnrolmentStatus::Pending),
            declaration,
          )
          .await
          .or_conflict(operation)?
      }
    };

    tracing::info!(
      %enrolment_id,
      %user_id,
      service_role = %role,
      status = %enrolment.status,
      "nomination accepted"
    );
    Ok(enrolment)
  }
}

fn expect_status(
  detail: &EnrolmentDetail,
  expected: EnrolmentStatus,
) -> Result<(), Failure> {
  let actual = detail.enrolment.status;
  if actual != expected {
    return Err(DomainRule::WrongCurrentStatus { expected, actual }.into());
  }
  Ok(())
}
