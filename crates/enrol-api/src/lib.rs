//! JSON REST API for enrolment and role management.
//!
//! Exposes an axum [`Router`] over an [`AccountService`]. The acting user's
//! id is read from the `x-user-id` header; authenticating the caller that
//! sets it is the embedding server's job.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", enrol_api::api_router(service.clone()))
//! ```

pub mod acting;
pub mod error;
pub mod membership;
pub mod nominations;
pub mod notifications;
pub mod regulators;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use enrol_core::{service::AccountService, store::AccountStore};

pub use acting::{ActingUser, USER_HEADER};
pub use error::ApiError;

const SERVICE: &str = "/organisations/{org}/services/{service}";

/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(service: AccountService<S>) -> Router<()>
where
  S: AccountStore + 'static,
{
  let scoped = |path: &str| format!("{SERVICE}{path}");

  Router::new()
    // Nominations
    .route(
      &scoped("/connections/{connection}/delegated-person-nomination"),
      post(nominations::nominate_delegated::<S>),
    )
    .route(
      &scoped("/enrolments/{enrolment}/delegated-person-acceptance"),
      put(nominations::accept_delegated::<S>),
    )
    .route(
      &scoped("/enrolments/{enrolment}/delegated-person-nominator"),
      get(nominations::nominator::<S>),
    )
    .route(
      &scoped("/connections/{connection}/approved-person-nomination"),
      post(nominations::nominate_approved::<S>),
    )
    .route(
      &scoped("/enrolments/{enrolment}/approved-person-acceptance"),
      put(nominations::accept_approved::<S>),
    )
    .route(
      &scoped("/enrolments/{enrolment}/nomination-decline"),
      put(nominations::decline::<S>),
    )
    // Membership
    .route(
      &scoped("/connections/{connection}/person-role"),
      put(membership::person_role::<S>),
    )
    .route(&scoped("/invitations"), post(membership::invite::<S>))
    .route(
      "/invitations/{enrolment}/acceptance",
      put(membership::accept_invitation::<S>),
    )
    .route(
      "/organisations/{org}/persons/{person}/enrolments",
      delete(membership::remove::<S>),
    )
    // Notifications
    .route(&scoped("/notifications"), get(notifications::handler::<S>))
    // Regulators
    .route(
      "/regulators/organisations/{org}/enrolments/{enrolment}/status",
      put(regulators::decide::<S>),
    )
    .route(
      "/regulators/organisations/{org}/nation-transfer",
      put(regulators::transfer::<S>),
    )
    .with_state(service)
}
