//! Cluster Topology Module
//!
//! Static description of cluster members plus live, shared health state,
//! and the selection policy for read routing.

mod registry;
mod selector;

pub use registry::{Node, NodeHealth, NodeRegistry, NodeRole, NodeReport};
pub use selector::NodeSelector;
