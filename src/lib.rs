//! # Gardi (Authentication and Authorization Core)
//!
//! `gardi` turns a username/password pair into a verified, claims-bearing
//! session token, optionally routing the login through a second
//! authentication factor, and gates every protected operation by group
//! membership encoded in that token.
//!
//! The design is intentionally stateless: no server-side session store
//! exists, all session state lives inside the signed token, and the only
//! multi-step protocol state (an outstanding login challenge) is custodied by
//! the credential directory as a short-lived, single-use session.
//!
//! ## Split of responsibilities
//!
//! - [`directory`]: the contract with the external identity provider, plus an
//!   in-process implementation for fallback deployments and tests.
//! - [`flow`]: the challenge state machine and MFA enrollment orchestration.
//! - [`token`]: the HS256 session token issuer/verifier.
//! - [`guard`]: authentication and group-authorization request gates.
//! - [`groups`]: the closed group vocabulary and the single configured
//!   membership source of truth.
//! - [`api`] / [`cli`]: the HTTP surface and the service wiring around it.

pub mod api;
pub mod cli;
pub mod directory;
pub mod flow;
pub mod groups;
pub mod guard;
pub mod token;
