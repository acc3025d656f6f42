//! Talentdesk query DSL.
//!
//! Shared by the kernel and the client. Everything in this crate is pure:
//! - Types: QueryDescriptor, Predicate, FieldFilter, IncludeTree, OrderBy
//! - Sanitizing: include-depth collapsing and take clamping
//! - Merging: AND/OR composition and authorization overlays
//! - Search: free-text to predicate-tree compilation
//! - Evaluation: in-memory predicate matching over JSON rows

pub mod error;
pub mod eval;
pub mod merge;
pub mod path;
pub mod predicate;
pub mod sanitize;
pub mod search;
pub mod types;

pub use error::QueryError;
pub use merge::{
    add_or_constraints, assign_equals, merge_where_and, merge_where_or, remove_restricted_fields,
};
pub use path::FieldPath;
pub use predicate::{FieldFilter, MatchMode, Predicate, Scalar};
pub use sanitize::{
    ClampLimits, DEFAULT_MAX_INCLUDE_DEPTH, clamp_query, collapsed_nodes, include_depth,
    sanitize_include,
};
pub use search::{
    SearchOperator, apply_search, compile_search, remove_search_branches, search_fields,
};
pub use types::{
    IncludeEntry, IncludeNode, IncludeTree, OrderBy, PaginatedResponse, QueryDescriptor, Select,
    SortDirection, SortKey,
};

pub mod prelude {
    pub use crate::merge::*;
    pub use crate::sanitize::*;
    pub use crate::search::*;
    pub use crate::types::*;
    pub use crate::{FieldFilter, FieldPath, MatchMode, Predicate, QueryError, Scalar};
}
