//! Regulator decisions on pending enrolments, and nation transfers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountService, Failure, StoreResultExt as _, settle};
use crate::{
  comment::{CommentKind, NewRegulatorComment},
  enrolment::Enrolment,
  gate::{RegulatorClearance, denied},
  organisation::Organisation,
  outcome::{DomainRule, Outcome, Rejection, RoleManagementError},
  role::Nation,
  status::{EnrolmentStatus, StatusChange},
  store::AccountStore,
};

/// A regulator's decision on one enrolment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatorDecision {
  pub status:  EnrolmentStatus,
  /// Required when rejecting or putting on hold.
  pub comment: Option<String>,
}

/// Request to move an organisation to another nation's regulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NationTransfer {
  /// Persisted nation id of the receiving nation.
  pub nation_id: Option<i64>,
  pub comment:   Option<String>,
}

impl<S: AccountStore> AccountService<S> {
  /// Approve, reject or hold a Pending enrolment.
  ///
  /// Only Pending enrolments can be decided. Rejections and holds must be
  /// explained with a comment, stored atomically with the new status. A
  /// decision by a regulator of the nation the organisation is moving to
  /// settles that transfer.
  pub async fn update_enrolment_status(
    &self,
    regulator_user_id: Uuid,
    organisation_id: Uuid,
    enrolment_id: Uuid,
    decision: RegulatorDecision,
  ) -> Result<Outcome<Enrolment>, RoleManagementError> {
    settle(
      self
        .update_enrolment_status_inner(
          regulator_user_id,
          organisation_id,
          enrolment_id,
          decision,
        )
        .await,
    )
  }

  async fn update_enrolment_status_inner(
    &self,
    regulator_user_id: Uuid,
    organisation_id: Uuid,
    enrolment_id: Uuid,
    decision: RegulatorDecision,
  ) -> Result<Enrolment, Failure> {
    const OP: &str = "update_enrolment_status";

    let clearance = self
      .require_regulator_nation(regulator_user_id, organisation_id, OP)
      .await?;

    let detail = self
      .store()
      .get_enrolment(enrolment_id)
      .await
      .fatal(OP)?
      .filter(|d| d.organisation.external_id == organisation_id)
      .ok_or_else(|| Rejection::not_found("enrolment"))?;

    let from = detail.enrolment.status;
    let to = decision.status;
    if !from.regulator_targets().contains(&to) {
      tracing::warn!(%enrolment_id, %from, %to, "invalid regulator transition");
      return Err(DomainRule::InvalidTransition { from, to }.into());
    }

    let comment = decision
      .comment
      .filter(|c| !c.trim().is_empty());
    let kind = match to {
      EnrolmentStatus::Rejected => Some(CommentKind::Rejection),
      EnrolmentStatus::OnHold => Some(CommentKind::OnHold),
      _ => None,
    };
    let comment = match (kind, comment) {
      (Some(_), None) => return Err(DomainRule::MissingComment(to).into()),
      (Some(kind), Some(text)) => Some(NewRegulatorComment {
        regulator_person_id: clearance.person_id,
        kind,
        text,
      }),
      (None, _) => None,
    };

    let decision = self
      .store()
      .decide_enrolment(
        detail.enrolment.id,
        StatusChange::new(from, to),
        comment,
        clearance.authority,
      )
      .await
      .or_conflict(OP)?;

    tracing::info!(
      %enrolment_id,
      %organisation_id,
      %regulator_user_id,
      %from,
      %to,
      "regulator decided enrolment"
    );

    if decision.transfer_settled {
      tracing::info!(
        %organisation_id,
        nation = ?decision.organisation.nation,
        "nation transfer settled"
      );
    }

    Ok(decision.enrolment)
  }

  /// Start moving an organisation to another nation's regulator.
  ///
  /// Statuses are untouched; until the transfer settles, regulators of both
  /// nations may act on the organisation.
  pub async fn transfer_organisation_nation(
    &self,
    regulator_user_id: Uuid,
    organisation_id: Uuid,
    transfer: NationTransfer,
  ) -> Result<Outcome<Organisation>, RoleManagementError> {
    settle(
      self
        .transfer_organisation_nation_inner(regulator_user_id, organisation_id, transfer)
        .await,
    )
  }

  async fn transfer_organisation_nation_inner(
    &self,
    regulator_user_id: Uuid,
    organisation_id: Uuid,
    transfer: NationTransfer,
  ) -> Result<Organisation, Failure> {
    const OP: &str = "transfer_organisation_nation";

    let target = transfer
      .nation_id
      .and_then(|id| Nation::from_id(id).ok())
      .ok_or(DomainRule::InvalidNation)?;

    let RegulatorClearance { person_id, authority, organisation } = self
      .require_regulator_nation(regulator_user_id, organisation_id, OP)
      .await?;
    if organisation.nation == Some(target) {
      return Err(DomainRule::InvalidNation.into());
    }

    let comment = transfer
      .comment
      .filter(|c| !c.trim().is_empty())
      .map(|text| NewRegulatorComment {
        regulator_person_id: person_id,
        kind: CommentKind::Transfer,
        text,
      });

    let updated = self
      .store()
      .request_transfer(organisation.id, target, comment, authority)
      .await
      .or_conflict(OP)?;

    tracing::info!(
      %organisation_id,
      %regulator_user_id,
      from = ?organisation.nation,
      to = ?target,
      "nation transfer requested"
    );
    Ok(updated)
  }

  async fn require_regulator_nation(
    &self,
    regulator_user_id: Uuid,
    organisation_id: Uuid,
    operation: &'static str,
  ) -> Result<RegulatorClearance, Failure> {
    self
      .gate()
      .regulator_clearance(regulator_user_id, organisation_id)
      .await
      .fatal(operation)?
      .ok_or_else(|| {
        denied(
          "does_regulator_nation_match_organisation_nation",
          regulator_user_id,
          organisation_id,
        )
        .into()
      })
  }
}
