/// Route pattern compilation
///
/// Turns file-based route names into structured matchers:
/// - `segment`: the literal / param / qualified-param / rest-param grammar
/// - `pattern`: segment matchers composed into a `CompiledPattern`
/// - `specificity`: the total order used to prioritise overlapping routes
pub mod pattern;
pub mod segment;
pub mod specificity;

pub use pattern::{compile, CompiledPattern, Params};
pub use segment::{encode_literal, parse_segment, Part, Segment};
pub use specificity::{compare_items, compare_parts, compare_patterns, SortKey};
