//! Transformation module.
//!
//! This module handles the FeatureCollection ⇄ table conversions:
//! - Codec: collection to table and back
//! - Merger: several collections into one, duplicate ids renamed
//! - Joiner: left join of an attribute table
//! - Normalize: cell helpers shared by all of the above
//! - Pipeline: byte-level workflow steps

pub mod codec;
pub mod joiner;
pub mod merger;
pub mod normalize;
pub mod pipeline;

pub use codec::{decode, encode, DecodeOutput};
pub use joiner::{join, JoinOutput};
pub use merger::{merge, merge_documents, DuplicateIdRenamed, MergeOutput, RejectedDocument};
pub use normalize::{cell_to_string, is_absent, normalize_key};
pub use pipeline::*;
