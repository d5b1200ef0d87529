//! Pending-action items for a user, derived fresh from enrolment state on
//! every call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountService, Failure, StoreResultExt as _, settle};
use crate::{
  outcome::{DomainRule, Outcome, RoleManagementError},
  role::{Service, ServiceRole},
  status::EnrolmentStatus,
  store::AccountStore,
};

/// Something waiting on the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
  /// The user has been nominated as a Delegated Person.
  NominatedDelegatedPerson {
    enrolment_id: Uuid,
    expires_on:   Option<DateTime<Utc>>,
  },
  /// The user has been nominated as an Approved Person.
  NominatedApprovedPerson {
    enrolment_id: Uuid,
    expires_on:   Option<DateTime<Utc>>,
  },
  /// Someone the user nominated has not responded yet.
  AwaitingNomineeAcceptance {
    enrolment_id: Uuid,
    nominee_name: String,
  },
  /// Regulators only: an enrolment waiting on a decision.
  AwaitingRegulatorDecision {
    enrolment_id: Uuid,
    person_name:  String,
    service_role: ServiceRole,
    status:       EnrolmentStatus,
  },
}

impl<S: AccountStore> AccountService<S> {
  pub async fn get_notifications(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<Outcome<Vec<Notification>>, RoleManagementError> {
    settle(
      self
        .get_notifications_inner(user_id, organisation_id, service_key)
        .await,
    )
  }

  async fn get_notifications_inner(
    &self,
    user_id: Uuid,
    organisation_id: Uuid,
    service_key: &str,
  ) -> Result<Vec<Notification>, Failure> {
    const OP: &str = "get_notifications";

    let service = Service::from_key(service_key)
      .ok_or_else(|| DomainRule::ServiceNotSupported(service_key.to_owned()))?;
    let now = Utc::now();
    let policy = self.policy();
    let mut items = Vec::new();

    let own: Vec<_> = self
      .store()
      .user_enrolments(user_id, None)
      .await
      .fatal(OP)?
      .into_iter()
      .filter(|d| {
        d.organisation.external_id == organisation_id && d.enrolment.service() == service
      })
      .collect();

    for detail in &own {
      let enrolment = &detail.enrolment;
      if enrolment.status == EnrolmentStatus::Nominated
        && !policy.is_expired(enrolment, now)
      {
        let enrolment_id = enrolment.external_id;
        let expires_on = policy.expiry_of(enrolment);
        match enrolment.service_role {
          ServiceRole::DelegatedPerson => items.push(
            Notification::NominatedDelegatedPerson { enrolment_id, expires_on },
          ),
          ServiceRole::ApprovedPerson => items.push(
            Notification::NominatedApprovedPerson { enrolment_id, expires_on },
          ),
          _ => {}
        }
      }

      if enrolment.service_role == ServiceRole::ApprovedPerson
        && enrolment.status == EnrolmentStatus::Approved
        && let Some(nomination) = self
          .store()
          .find_nomination_by_nominator(enrolment.id)
          .await
          .fatal(OP)?
        && let Some(nominee) = self
          .store()
          .get_enrolment_by_id(nomination.enrolment_id)
          .await
          .fatal(OP)?
        && nominee.enrolment.status == EnrolmentStatus::Nominated
        && !policy.is_expired(&nominee.enrolment, now)
      {
        items.push(Notification::AwaitingNomineeAcceptance {
          enrolment_id: nominee.enrolment.external_id,
          nominee_name: nominee.person.full_name(),
        });
      }
    }

    let regulates = self
      .gate()
      .does_regulator_nation_match_organisation_nation(user_id, organisation_id)
      .await
      .fatal(OP)?;
    if regulates
      && let Some(organisation) = self
        .store()
        .get_organisation(organisation_id)
        .await
        .fatal(OP)?
    {
      let awaiting = self
        .store()
        .organisation_enrolments(organisation.id, Some(service))
        .await
        .fatal(OP)?;
      items.extend(
        awaiting
          .into_iter()
          .filter(|d| d.enrolment.status.awaits_regulator())
          .map(|d| Notification::AwaitingRegulatorDecision {
            enrolment_id: d.enrolment.external_id,
            person_name:  d.person.full_name(),
            service_role: d.enrolment.service_role,
            status:       d.enrolment.status,
          }),
      );
    }

    Ok(items)
  }
}
