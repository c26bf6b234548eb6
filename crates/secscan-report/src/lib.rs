//! Renderers for the outcome ledger produced by a secscan run.

pub mod json;
pub mod text;
