//! Core types, the store trait and the enrolment workflows of the account
//! backend.
//!
//! This crate has no HTTP or database dependencies. Storage backends
//! implement [`store::AccountStore`]; transports call into
//! [`service::AccountService`].

#![allow(async_fn_in_trait)]

pub mod comment;
pub mod connection;
pub mod enrolment;
pub mod error;
pub mod gate;
pub mod nomination;
pub mod organisation;
pub mod outcome;
pub mod person;
pub mod role;
pub mod service;
pub mod status;
pub mod store;

pub use error::{Error, Result};
