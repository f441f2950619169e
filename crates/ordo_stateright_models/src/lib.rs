//! Ordo coordinator: Stateright models.
//!
//! Small and "toy" on purpose. The models check the hand-off invariants
//! (no duplicated commit, no lost commit, commit order) without pulling in the
//! runtime crate.
//!
//! Each example in `examples/` is one little machine.

pub mod envelope;
