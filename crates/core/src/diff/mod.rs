//! Diff algorithms
//!
//! - [`identity`]: local canonical events vs. a destination's owned events,
//!   keyed by minted identifier (push-out)
//! - [`slots`]: freshly parsed source slots vs. stored slots, compared as
//!   multisets of time ranges (pull-in)

pub mod identity;
pub mod slots;

pub use identity::{diff_by_identity, IdentityDiff};
pub use slots::{diff_slots, SlotDiff};
