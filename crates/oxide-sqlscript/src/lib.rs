//! # oxide-sqlscript
//!
//! Splits a SQL script into the statements a client sends to the server one
//! at a time.
//!
//! The splitter does not understand SQL. It only tracks what a command-line
//! client has to track to find statement boundaries:
//!
//! - the active statement delimiter (`;` by default), changed with
//!   `DELIMITER <token>` or the `\d<token>` shorthand so that stored
//!   procedure bodies can contain `;`,
//! - `-- ...` and `/* ... */` comments, which are dropped,
//! - quoted literals (`'...'`, `"..."`, `` `...` ``), which are opaque.
//!
//! ## Example
//!
//! ```rust
//! use oxide_sqlscript::split;
//!
//! let script = "
//! CREATE TABLE memo (id INT, body TEXT); -- table
//!
//! DELIMITER //
//! CREATE PROCEDURE touch()
//! BEGIN
//!   UPDATE memo SET body = ';';
//! END //
//! DELIMITER ;
//! ";
//!
//! let statements: Vec<String> = split(script).collect();
//! assert_eq!(statements.len(), 2);
//! assert_eq!(statements[0], "CREATE TABLE memo (id INT, body TEXT)");
//! assert!(statements[1].ends_with("END"));
//! ```

mod scan;
mod splitter;

pub use splitter::{split, Statements, DEFAULT_DELIMITER};
