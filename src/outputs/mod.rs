//! Output generation for the aggregated release list.
//!
//! # Submodules
//!
//! - [`markdown`]: Renders records as Markdown link lines, grouped by product
//! - [`json`]: Writes the same records as a JSON array for other tools
//!
//! Both writers replace the target file; nothing is appended.

pub mod json;
pub mod markdown;
