//! # SQL Front End
//!
//! Text in, rows out:
//!
//! ```text
//! SQL text --lexer--> tokens --parser--> AST --planner--> access path
//!                                         |                   |
//!                                         +-----executor------+
//! ```
//!
//! The lexer and parser are storage-free. The planner consults the
//! catalog to pick an access path, and the executor pulls rows through
//! the chosen path one at a time.

pub mod ast;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod planner;
pub mod token;

pub use parser::parse_script;
