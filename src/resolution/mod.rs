//! Reference resolution: turning raw dependency strings into item ids.
//!
//! - [`names`]: name index, candidate selection heuristic, classification.
//! - [`linker`]: the full-store link pass.

pub mod linker;
pub mod names;

pub use linker::{LinkReport, Linker};
pub use names::{
    classify_reference, resolve_candidates, Candidate, NameIndex, ReferenceClass, Resolution,
    ResolutionReason,
};
