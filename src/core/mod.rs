//! Core domain types: errors, validated options, listen addresses, and the
//! accounts database.

pub mod accounts;
pub mod errors;
pub mod listen;
pub mod options;
