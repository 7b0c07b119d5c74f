//! Credential pool management.
//!
//! Owns the set of upstream account credentials, their health state,
//! and the selection policy. No other component touches credential
//! fields directly — everything goes through
//! [`manager::CredentialPool::acquire`] and
//! [`manager::CredentialPool::report_outcome`].

pub mod credential;
pub mod manager;
pub mod store;

pub use credential::{Credential, CredentialHealth};
pub use manager::{CredentialLease, CredentialPool, PoolConfig, PoolError};
