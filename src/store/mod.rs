//! Repository functions over a SQLite connection.
//!
//! Every function takes `&Connection`, so callers can pass either the
//! workspace connection or an open `Transaction`.

pub mod attempts;
pub mod examinations;
pub mod papers;
pub mod people;
pub mod questions;
