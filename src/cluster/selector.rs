//! Node Selector
//!
//! Chooses the node for a new read session: uniformly random among
//! healthy secondaries, with priority for a preferred node when it is
//! eligible. Writes always go to the primary.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;

use super::{Node, NodeRegistry};
use crate::error::{Error, Result};

/// Read-node selection over the shared registry
pub struct NodeSelector {
    registry: Arc<NodeRegistry>,
}

impl NodeSelector {
    /// Create a selector over a registry
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// The primary node (writes are never load balanced)
    pub fn primary(&self) -> Node {
        self.registry.primary().clone()
    }

    /// Pick a secondary for reads: the preferred node if eligible,
    /// otherwise uniform random among healthy candidates not in `exclude`
    pub async fn pick_secondary(&self, exclude: &HashSet<String>) -> Result<Node> {
        let candidates: Vec<Node> = self
            .registry
            .candidate_secondaries()
            .await
            .into_iter()
            .filter(|n| !exclude.contains(&n.name))
            .collect();

        if candidates.is_empty() {
            let tried = self
                .registry
                .secondaries()
                .iter()
                .map(|n| n.name.clone())
                .collect();
            return Err(Error::NoAvailableNode {
                role: "secondary",
                tried,
            });
        }

        if let Some(preferred) = candidates.iter().find(|n| n.preferred) {
            tracing::debug!(node = %preferred.name, "selected preferred secondary");
            return Ok(preferred.clone());
        }

        // non-empty per the check above
        let node = candidates.choose(&mut rand::thread_rng()).cloned();
        match node {
            Some(node) => {
                tracing::debug!(node = %node.name, "selected secondary");
                Ok(node)
            }
            None => Err(Error::NoAvailableNode {
                role: "secondary",
                tried: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeRole;
    use crate::config::RouterConfig;

    fn selector(preferred: bool) -> NodeSelector {
        let toml = format!(
            r#"
[[cluster.nodes]]
name = "db1"
host = "db1.local"
role = "primary"

[[cluster.nodes]]
name = "db2"
host = "db2.local"
preferred = {preferred}

[[cluster.nodes]]
name = "db3"
host = "db3.local"
"#
        );
        let config = RouterConfig::from_str(&toml).unwrap();
        let registry = Arc::new(NodeRegistry::from_config(&config.cluster).unwrap());
        NodeSelector::new(registry)
    }

    #[tokio::test]
    async fn test_never_picks_primary() {
        let selector = selector(false);
        for _ in 0..20 {
            let node = selector.pick_secondary(&HashSet::new()).await.unwrap();
            assert_eq!(node.role, NodeRole::Secondary);
        }
    }

    #[tokio::test]
    async fn test_preferred_wins() {
        let selector = selector(true);
        for _ in 0..10 {
            let node = selector.pick_secondary(&HashSet::new()).await.unwrap();
            assert_eq!(node.name, "db2");
        }
    }

    #[tokio::test]
    async fn test_preferred_skipped_when_excluded() {
        let selector = selector(true);
        let mut exclude = HashSet::new();
        exclude.insert("db2".to_string());
        let node = selector.pick_secondary(&exclude).await.unwrap();
        assert_eq!(node.name, "db3");
    }

    #[tokio::test]
    async fn test_preferred_skipped_when_unhealthy() {
        let selector = selector(true);
        selector.registry.mark_failed("db2").await;
        let node = selector.pick_secondary(&HashSet::new()).await.unwrap();
        assert_eq!(node.name, "db3");
    }

    #[tokio::test]
    async fn test_empty_candidate_set_is_fatal() {
        let selector = selector(false);
        selector.registry.mark_failed("db2").await;
        selector.registry.mark_failed("db3").await;
        let err = selector.pick_secondary(&HashSet::new()).await.unwrap_err();
        assert!(matches!(err, Error::NoAvailableNode { .. }));
    }
}
