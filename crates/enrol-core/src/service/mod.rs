//! Workflows over an [`AccountStore`]: nomination, regulator decisions,
//! membership management and notifications.
//!
//! Each public operation is one request's worth of work. It validates input,
//! evaluates the relevant gate predicate, then performs its writes through
//! the store. Expected failures come back as [`Rejection`]s inside an
//! [`Outcome`]; only backend errors and integrity failures escape as
//! [`RoleManagementError`].

pub mod membership;
pub mod nomination;
pub mod notification;
pub mod regulator;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
  enrolment::Enrolment,
  gate::AuthorizationGate,
  outcome::{DomainRule, Outcome, Rejection, RoleManagementError},
  role::Service,
  store::{AccountStore, StoreError, WriteConflict},
};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// How long a nomination stays acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NominationPolicy {
  /// `None` keeps nominations open until accepted, declined or removed.
  pub expires_after: Option<Duration>,
}

impl NominationPolicy {
  pub const DEFAULT_EXPIRY_DAYS: u32 = 28;

  /// A policy expiring nominations after `days`; `0` disables expiry.
  pub fn from_days(days: u32) -> Self {
    let expires_after = (days > 0).then(|| Duration::days(i64::from(days)));
    Self { expires_after }
  }

  /// When a nomination created as `enrolment` stops being acceptable. A
  /// window reaching past the representable range never expires.
  pub fn expiry_of(&self, enrolment: &Enrolment) -> Option<DateTime<Utc>> {
    self
      .expires_after
      .and_then(|window| enrolment.created_on.checked_add_signed(window))
  }

  pub fn is_expired(&self, enrolment: &Enrolment, now: DateTime<Utc>) -> bool {
    self.expiry_of(enrolment).is_some_and(|at| at <= now)
  }
}

impl Default for NominationPolicy {
  fn default() -> Self { Self::from_days(Self::DEFAULT_EXPIRY_DAYS) }
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Entry point for all enrolment workflows.
///
/// Cloning is cheap; the store is reference-counted.
pub struct AccountService<S> {
  store:  Arc<S>,
  policy: NominationPolicy,
}

impl<S> Clone for AccountService<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), policy: self.policy }
  }
}

impl<S: AccountStore> AccountService<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, policy: NominationPolicy::default() }
  }

  pub fn with_policy(mut self, policy: NominationPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn policy(&self) -> NominationPolicy { self.policy }

  pub fn gate(&self) -> AuthorizationGate<'_, S> {
    AuthorizationGate::new(&self.store)
  }
}

// ─── Internal failure plumbing ───────────────────────────────────────────────

/// Either half of a workflow failure. Lets workflow bodies use `?` for both
/// rejections and fatal errors; [`settle`] splits them again at the public
/// boundary.
#[derive(Debug)]
pub(crate) enum Failure {
  Rejected(Rejection),
  Fatal(RoleManagementError),
}

impl From<Rejection> for Failure {
  fn from(r: Rejection) -> Self { Self::Rejected(r) }
}

impl From<DomainRule> for Failure {
  fn from(r: DomainRule) -> Self { Self::Rejected(r.into()) }
}

impl From<RoleManagementError> for Failure {
  fn from(e: RoleManagementError) -> Self { Self::Fatal(e) }
}

pub(crate) fn settle<T>(
  result: Result<T, Failure>,
) -> Result<Outcome<T>, RoleManagementError> {
  match result {
    Ok(value) => Ok(Ok(value)),
    Err(Failure::Rejected(rejection)) => Ok(Err(rejection)),
    Err(Failure::Fatal(e)) => Err(e),
  }
}

pub(crate) fn inconsistent(
  operation: &'static str,
  detail: impl Into<String>,
) -> Failure {
  let detail = detail.into();
  tracing::error!(operation, %detail, "store contradicts an enrolment invariant");
  Failure::Fatal(RoleManagementError::Inconsistent { operation, detail })
}

/// Classification of store results inside workflows.
pub(crate) trait StoreResultExt<T> {
  /// Every error is fatal. Used for reads.
  fn fatal(self, operation: &'static str) -> Result<T, Failure>;

  /// Write conflicts become [`Rejection::Conflict`]; anything else is fatal.
  fn or_conflict(self, operation: &'static str) -> Result<T, Failure>;
}

impl<T, E: StoreError> StoreResultExt<T> for Result<T, E> {
  fn fatal(self, operation: &'static str) -> Result<T, Failure> {
    self.map_err(|e| {
      tracing::error!(operation, error = %e, "store operation failed");
      Failure::Fatal(RoleManagementError::Store {
        operation,
        source: Box::new(e),
      })
    })
  }

  fn or_conflict(self, operation: &'static str) -> Result<T, Failure> {
    match self {
      Ok(value) => Ok(value),
      Err(e) => match e.as_conflict() {
        Some(conflict) => {
          tracing::warn!(operation, %conflict, "write lost to a conflicting change");
          Err(Failure::Rejected(Rejection::Conflict(conflict.clone())))
        }
        None => Err::<T, E>(e).fatal(operation),
      },
    }
  }
}

/// Resolve a service key for an operation that only makes sense for services
/// supporting Approved/Delegated Person nominations.
pub(crate) fn delegation_service(service_key: &str) -> Result<Service, Failure> {
  match Service::from_key(service_key) {
    Some(service) if service.supports_delegation() => Ok(service),
    _ => Err(DomainRule::ServiceNotSupported(service_key.to_owned()).into()),
  }
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), Failure> {
  if value.trim().is_empty() {
    Err(Rejection::validation(format!("{field} must not be blank")).into())
  } else {
    Ok(())
  }
}

/// `true` when `conflict` reports that `enrolment_id` itself is gone.
pub(crate) fn is_missing(conflict: &WriteConflict, enrolment_id: i64) -> bool {
  matches!(conflict, WriteConflict::EnrolmentNotFound(id) if *id == enrolment_id)
}
