//! Network boundary of the test-taking session.
//!
//! The session core talks to the portal backend exclusively through the
//! [`SessionGateway`] trait. Two implementations live here: [`HttpGateway`]
//! for the real REST API and [`InMemoryGateway`], a reference server that
//! enforces the same contract for tests and local runs.

pub mod contract;
pub mod dto;
pub mod error;
pub mod http;
pub mod memory;

pub use contract::SessionGateway;
pub use error::GatewayError;
pub use http::{GatewayConfig, HttpGateway};
pub use memory::InMemoryGateway;
