//! Core library for onair: keeps the content system of record and the
//! broadcast automation engine in agreement, and turns the near-term schedule
//! into a versioned, integrity-checked feed.
//!
//! The crate is split along the two paths through the system:
//!
//! - **feed**: [`media`] existence checks feed into the [`feed`] builder,
//!   which produces deterministic [`onair_model::FeedSnapshot`]s.
//! - **reconcile**: the [`reconcile`] diff engine compares both systems over an
//!   envelope window and the apply engine pushes the difference to the
//!   automation engine under a per-window lock.
//!
//! Remote systems are reached through the ports in [`remote`]; every
//! time-dependent decision reads an injected [`clock::Clock`].

pub mod clock;
pub mod error;
pub mod feed;
pub mod media;
pub mod reconcile;
pub mod remote;
pub mod retry;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{FeedError, ReconcileError, RemoteError};
pub use retry::RetryPolicy;
