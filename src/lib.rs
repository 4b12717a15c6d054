//! # Pasejo (Authentication & Session Orchestration)
//!
//! `pasejo` turns a login attempt, credential-based or federated, into an
//! authorized, single-active session behind an anti-bot challenge gate.
//!
//! ## Login Flow
//!
//! Every attempt first clears the challenge gate (single-use tokens with
//! compare-and-swap consumption), then authenticates through either the
//! credential verifier or the federated coordinator. First-time federated
//! identities suspend on an out-of-band provisioning prompt until a local
//! password is chosen or the prompt is cancelled.
//!
//! ## Sessions
//!
//! The session issuer enforces at most one active session per account:
//! issuing a new session supersedes the previous one atomically and records
//! a `Conflict` termination signal for the displaced context. Out-of-band
//! invalidation (admin lock, account deletion, expiry sweep) records the
//! matching reason instead. Signals are keyed, last-write-wins slots read
//! exactly once at the next login-boundary activation.
//!
//! ## External Collaborators
//!
//! The account store, identity-federation provider, challenge-verification
//! service, and rate limiter are all consumed through narrow traits; HTTP
//! handlers here are one driver of the core, not part of it.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
