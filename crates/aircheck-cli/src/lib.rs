//! Shared helpers for the aircheck binaries

pub mod output;
