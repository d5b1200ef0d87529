//! The `AccountStore` trait and the write conflicts backends report.
//!
//! The trait is implemented by storage backends (e.g. `enrol-store-sqlite`).
//! The authorization gate and the workflows in [`crate::service`] depend on
//! this abstraction, not on any concrete backend.
//!
//! Every method is a single unit of work. The ones that touch more than one
//! row (nominations, acceptances, regulator decisions, nation transfers,
//! removals and role changes) are atomic in the backend. Writes made on a
//! user's authority take an [`Authority`] or [`RegulatorAuthority`] and
//! re-check it inside the same transaction.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
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
};

// ─── Write conflicts ─────────────────────────────────────────────────────────

/// Expected write failures detected by the store's uniqueness constraints and
/// compare-and-swap updates. These are the losers of races, not bugs.
///
/// Messages never include internal row ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteConflict {
  #[error("the connection already has an active {service_role} enrolment")]
  DuplicateEnrolment {
    connection_id: i64,
    service_role:  ServiceRole,
  },

  #[error("the nominating enrolment already backs a nomination")]
  DuplicateNomination { nominator_enrolment_id: i64 },

  #[error("enrolment status is {actual}, expected {expected}")]
  StatusConflict {
    enrolment_id: i64,
    expected:     EnrolmentStatus,
    actual:       EnrolmentStatus,
  },

  #[error("enrolment no longer exists")]
  EnrolmentNotFound(i64),

  #[error("user {0} is already linked to a person")]
  UserAlreadyLinked(Uuid),

  #[error("the acting user's authority changed before the write landed")]
  AuthorityRevoked { enrolment_id: i64 },
}

/// Implemented by backend error types so callers can tell an expected
/// [`WriteConflict`] from a backend failure.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn as_conflict(&self) -> Option<&WriteConflict>;
}

// ─── Authority ───────────────────────────────────────────────────────────────

/// The enrolment an acting user's authority rests on.
///
/// Inside the write transaction the enrolment must still be live and in an
/// active status ([`EnrolmentStatus::is_active_authority`]); with
/// `requires_admin` its connection must also still hold the Admin person
/// role. Otherwise the write fails with [`WriteConflict::AuthorityRevoked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authority {
  pub enrolment_id:   i64,
  pub requires_admin: bool,
}

impl Authority {
  /// Authority held through the enrolment's service role.
  pub fn of(enrolment_id: i64) -> Self {
    Self { enrolment_id, requires_admin: false }
  }

  /// Authority held through an Admin connection.
  pub fn via_admin(enrolment_id: i64) -> Self {
    Self { enrolment_id, requires_admin: true }
  }
}

/// A regulator's authority over organisations regulated by `nation`.
///
/// Inside the write transaction the regulator's enrolment must still be live
/// and active, its regulator organisation must still belong to `nation`, and
/// the target organisation's nation or pending transfer nation must equal
/// `nation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegulatorAuthority {
  pub enrolment_id: i64,
  pub nation:       Nation,
}

// ─── Compound write results ──────────────────────────────────────────────────

/// What [`AccountStore::decide_enrolment`] committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
  pub enrolment:        Enrolment,
  /// The enrolment's organisation after the decision.
  pub organisation:     Organisation,
  pub transfer_settled: bool,
}

/// What [`AccountStore::remove_enrolments`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
  pub enrolments_removed: usize,
  /// `true` when the person has left the organisation entirely.
  pub connection_removed: bool,
}

/// What [`AccountStore::change_person_role`] committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
  pub connection:          Connection,
  /// External ids of Delegated Person enrolments ended by a demotion.
  pub delegations_removed: Vec<Uuid>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the account database.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AccountStore: Send + Sync {
  type Error: StoreError;

  // ── People and organisations ──────────────────────────────────────────

  fn add_person(
    &self,
    input: NewPerson,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  fn get_person(
    &self,
    external_id: Uuid,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  /// The non-deleted person linked to `user_id`, if any.
  fn find_person_by_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  /// Link a person to an external login.
  ///
  /// Fails with [`WriteConflict::UserAlreadyLinked`] if another non-deleted
  /// person already holds `user_id`.
  fn link_person_to_user(
    &self,
    person_id: i64,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  fn add_organisation(
    &self,
    input: NewOrganisation,
  ) -> impl Future<Output = Result<Organisation, Self::Error>> + Send + '_;

  fn get_organisation(
    &self,
    external_id: Uuid,
  ) -> impl Future<Output = Result<Option<Organisation>, Self::Error>> + Send + '_;

  /// Record a pending transfer to `nation` and, if given, attach `comment`
  /// as a Transfer comment to every enrolment of the organisation awaiting a
  /// regulator, in one transaction.
  fn request_transfer(
    &self,
    organisation_id: i64,
    nation: Nation,
    comment: Option<NewRegulatorComment>,
    authority: RegulatorAuthority,
  ) -> impl Future<Output = Result<Organisation, Self::Error>> + Send + '_;

  // ── Connections ───────────────────────────────────────────────────────

  fn add_connection(
    &self,
    input: NewConnection,
  ) -> impl Future<Output = Result<Connection, Self::Error>> + Send + '_;

  /// Retrieve an active connection by external id.
  fn get_connection(
    &self,
    external_id: Uuid,
  ) -> impl Future<Output = Result<Option<Connection>, Self::Error>> + Send + '_;

  /// The active connection between a person and an organisation, if any.
  fn find_connection(
    &self,
    person_id: i64,
    organisation_id: i64,
  ) -> impl Future<Output = Result<Option<Connection>, Self::Error>> + Send + '_;

  /// Set the connection's person role in one transaction with its
  /// consequences: moving an Admin to any other role soft-deletes the
  /// connection's Approved Delegated Person enrolment.
  fn change_person_role(
    &self,
    connection_id: i64,
    role: PersonRole,
    authority: Authority,
  ) -> impl Future<Output = Result<RoleChange, Self::Error>> + Send + '_;

  // ── Enrolments ────────────────────────────────────────────────────────

  /// Create an enrolment in its initial status.
  ///
  /// Fails with [`WriteConflict::DuplicateEnrolment`] if the connection
  /// already has an active enrolment for the same service role.
  fn create_enrolment(
    &self,
    input: NewEnrolment,
  ) -> impl Future<Output = Result<Enrolment, Self::Error>> + Send + '_;

  /// Retrieve an active enrolment with its connection, person and
  /// organisation. Returns `None` if not found or deleted.
  fn get_enrolment(
    &self,
    external_id: Uuid,
  ) -> impl Future<Output = Result<Option<EnrolmentDetail>, Self::Error>> + Send + '_;

  /// As [`Self::get_enrolment`], by internal id.
  fn get_enrolment_by_id(
    &self,
    enrolment_id: i64,
  ) -> impl Future<Output = Result<Option<EnrolmentDetail>, Self::Error>> + Send + '_;

  /// Compare-and-swap the status column.
  ///
  /// Fails with [`WriteConflict::StatusConflict`] if the current status is not
  /// `change.expected`, or [`WriteConflict::EnrolmentNotFound`].
  fn set_status(
    &self,
    enrolment_id: i64,
    change: StatusChange,
  ) -> impl Future<Output = Result<Enrolment, Self::Error>> + Send + '_;

  /// Soft-delete an enrolment together with any nomination row attached to
  /// it.
  fn delete_enrolment(
    &self,
    enrolment_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Soft-delete the connection's enrolments in `service_role` with their
  /// nomination rows, then the connection itself if no enrolment remains,
  /// in one transaction. Nothing is written when no enrolment matches.
  fn remove_enrolments(
    &self,
    connection_id: i64,
    service_role: ServiceRole,
    authority: Authority,
  ) -> impl Future<Output = Result<Removal, Self::Error>> + Send + '_;

  /// Active enrolments held by the person linked to `user_id`, optionally
  /// restricted to one organisation.
  fn user_enrolments(
    &self,
    user_id: Uuid,
    organisation_id: Option<i64>,
  ) -> impl Future<Output = Result<Vec<EnrolmentDetail>, Self::Error>> + Send + '_;

  /// Active enrolments across an organisation, optionally for one service.
  fn organisation_enrolments(
    &self,
    organisation_id: i64,
    service: Option<Service>,
  ) -> impl Future<Output = Result<Vec<EnrolmentDetail>, Self::Error>> + Send + '_;

  // ── Nominations ───────────────────────────────────────────────────────

  /// Atomically create a Delegated Person enrolment and its nomination row.
  ///
  /// Inside the same transaction the nominator enrolment is re-read: if it is
  /// gone the call fails with [`WriteConflict::EnrolmentNotFound`], if it is
  /// no longer Approved with [`WriteConflict::StatusConflict`]. A nominator
  /// enrolment that already backs a nomination yields
  /// [`WriteConflict::DuplicateNomination`].
  fn create_delegated_nomination(
    &self,
    enrolment: NewEnrolment,
    nomination: NewDelegatedNomination,
  ) -> impl Future<
    Output = Result<(Enrolment, DelegatedPersonNomination), Self::Error>,
  > + Send
  + '_;

  fn get_delegated_nomination(
    &self,
    enrolment_id: i64,
  ) -> impl Future<Output = Result<Option<DelegatedPersonNomination>, Self::Error>>
  + Send
  + '_;

  /// The active nomination backed by `nominator_enrolment_id`, if any.
  fn find_nomination_by_nominator(
    &self,
    nominator_enrolment_id: i64,
  ) -> impl Future<Output = Result<Option<DelegatedPersonNomination>, Self::Error>>
  + Send
  + '_;

  /// Compare-and-swap the status and record the nominee's declaration in one
  /// transaction.
  fn accept_delegated_nomination(
    &self,
    enrolment_id: i64,
    change: StatusChange,
    declaration: Declaration,
  ) -> impl Future<Output = Result<Enrolment, Self::Error>> + Send + '_;

  /// Atomically create an Approved Person enrolment and its (empty)
  /// nomination row.
  fn create_approved_person_nomination(
    &self,
    enrolment: NewEnrolment,
    authority: Authority,
  ) -> impl Future<
    Output = Result<(Enrolment, ApprovedPersonNomination), Self::Error>,
  > + Send
  + '_;

  fn get_approved_person_nomination(
    &self,
    enrolment_id: i64,
  ) -> impl Future<Output = Result<Option<ApprovedPersonNomination>, Self::Error>>
  + Send
  + '_;

  fn accept_approved_person_nomination(
    &self,
    enrolment_id: i64,
    change: StatusChange,
    declaration: Declaration,
  ) -> impl Future<Output = Result<Enrolment, Self::Error>> + Send + '_;

  // ── Regulator decisions ───────────────────────────────────────────────

  /// Compare-and-swap the status and, if given, store the comment explaining
  /// the decision, in one transaction.
  ///
  /// When the decision is final (Approved or Rejected) and the organisation
  /// is being transferred to the regulator's nation, the transfer settles in
  /// the same transaction: the transfer nation becomes the organisation's
  /// nation and the pending transfer clears.
  fn decide_enrolment(
    &self,
    enrolment_id: i64,
    change: StatusChange,
    comment: Option<NewRegulatorComment>,
    authority: RegulatorAuthority,
  ) -> impl Future<Output = Result<Decision, Self::Error>> + Send + '_;

  /// Comments on an enrolment, oldest first.
  fn regulator_comments(
    &self,
    enrolment_id: i64,
  ) -> impl Future<Output = Result<Vec<RegulatorComment>, Self::Error>> + Send + '_;
}
