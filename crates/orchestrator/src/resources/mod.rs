//! RAII guards scoped to one `enter_phase` call.
//!
//! - [`PhaseScope`] - Owns the external-devices overlay and releases it on
//!   every exit path

mod phase_scope;

pub use phase_scope::PhaseScope;
