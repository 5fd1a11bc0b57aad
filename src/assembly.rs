//! Accumulation of per-cell contributions into a global linear system.
//!
//! The [`local`] module holds the contracts between the assembler and its collaborators
//! (degree-of-freedom numbering, shape-function evaluation, the equation callback); the
//! [`global`] module holds the additive global-storage contracts and the per-cell
//! [`Assembler`](global::Assembler) itself.
pub mod global;
pub mod local;
