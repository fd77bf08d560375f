//! API handlers for the Reklamo authentication service.
//!
//! Route handlers live here; `auth` carries the login state machine,
//! session plumbing, and the rate-limit guards it shares with the rest
//! of the API surface.

pub mod auth;
pub mod health;
pub mod root;
