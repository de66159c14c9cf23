// src/edgar/mod.rs
pub mod identity;

pub use identity::FilingIdentity;
