//! SQLite repository functions, one module per aggregate

pub mod credential;
pub mod credit;
pub mod usage;
pub mod workspace;
