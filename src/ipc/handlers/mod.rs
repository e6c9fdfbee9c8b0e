pub mod attempts;
pub mod core;
pub mod examinations;
pub mod papers;
pub mod people;
pub mod questions;
