//! Document module for everything the crawler reads off the wire
//!
//! This module contains:
//! - Sanitizing raw payloads before XML parsing
//! - Parsing live and historical comment documents
//! - Decoding the roll-date index
//! - Ordering comment entries with the protected-comment gap rule

mod ordering;
mod parser;
mod rolldate;
mod sanitize;

pub use ordering::{extract_ordered, order_entries};
pub use parser::{
    parse_comment_document, CommentDocument, CommentNode, ParseFailure, ParsedResponse,
};
pub use rolldate::{parse_roll_date_index, RollDateError};
pub use sanitize::sanitize;
