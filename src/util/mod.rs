//! Utility functions for common operations.
//!
//! - **Text processing**: width-aware abbreviation for listings and
//!   control-character stripping for terminal output
//! - **Email validation**: checks addresses added to STR notification lists

mod email;
mod text;

pub use email::{validate_email, EmailError};
pub use text::{abbreviate, display_width, strip_control_chars};
