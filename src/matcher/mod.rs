//! Entity matching between two structural models.
//!
//! [`EntityMatcher`] pairs classes, operations and attributes of a before and
//! an after model. Exact qualified-name matches are taken first; the rest are
//! scored (name edit distance, parameter types, body statements) and accepted
//! best-first, so every entity ends up either in a matched pair or in the
//! added/removed lists.

mod entity;
pub mod similarity;

pub use entity::{
    EntityMatcher, EntityMatching, MatchedPair, OperationScore, body_similarity,
};
