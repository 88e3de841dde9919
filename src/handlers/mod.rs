//! AI request handling
//!
//! - **`assistant`**: request building, the provider client, reply parsing and dispatch
//! - **`fence`**: fenced code block extraction from reply text

pub mod assistant;
pub mod fence;
