//! Graph traversal retriever
//!
//! Neighbor expansion and shortest-path search run as breadth-first walks
//! over [`GraphStore::neighbors`], one store round-trip per hop. Edges are
//! followed in both directions.

use crate::error::{bounded, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use talkgraph_core::{
    Adjacent, GraphConnection, GraphStore, HopLimit, IdentityMatch, MultiHopPath, NodeRef,
    PathNode,
};
use tracing::{debug, instrument};

pub const MAX_CONNECTIONS: usize = 50;
pub const MAX_PATHS: usize = 5;

/// One partial walk out of a source node
struct Walk {
    source: usize,
    at: String,
    chain: Vec<String>,
}

pub struct GraphRetriever {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
}

impl GraphRetriever {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            timeout: Duration::from_secs(crate::config::DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn resolve(&self, needle: &str, mode: IdentityMatch) -> Result<Vec<NodeRef>> {
        bounded("node lookup", self.timeout, self.store.find_nodes(needle, mode)).await
    }

    /// Edges around each of `keys`, grouped by the node they were seen from
    async fn adjacency(&self, keys: Vec<String>) -> Result<HashMap<String, Vec<Adjacent>>> {
        let adjacent = bounded("adjacency lookup", self.timeout, self.store.neighbors(&keys)).await?;
        let mut by_node: HashMap<String, Vec<Adjacent>> = HashMap::new();
        for adj in adjacent {
            by_node.entry(adj.origin.clone()).or_default().push(adj);
        }
        Ok(by_node)
    }

    /// Every node within `max_depth` hops of the named entities, reported
    /// once per (source, first relationship, neighbor) at its shortest
    /// distance, nearest first.
    #[instrument(skip(self))]
    pub async fn expand_neighbors(
        &self,
        entity_names: &[String],
        max_depth: HopLimit,
    ) -> Result<Vec<GraphConnection>> {
        let mut sources: Vec<NodeRef> = Vec::new();
        let mut seen_sources = HashSet::new();
        for name in entity_names.iter().filter(|n| !n.trim().is_empty()) {
            for node in self.resolve(name, IdentityMatch::Contains).await? {
                if seen_sources.insert(node.key.clone()) {
                    sources.push(node);
                }
            }
        }
        if sources.is_empty() {
            debug!("no seed entities resolved");
            return Ok(Vec::new());
        }

        let mut frontier: Vec<Walk> = sources
            .iter()
            .enumerate()
            .map(|(source, node)| Walk {
                source,
                at: node.key.clone(),
                chain: Vec::new(),
            })
            .collect();
        // (source, first relationship, node) already reported
        let mut visited: HashSet<(usize, String, String)> = HashSet::new();
        let mut found: Vec<(usize, NodeRef, Vec<String>)> = Vec::new();

        for _depth in 1..=max_depth.get() {
            if frontier.is_empty() || found.len() >= MAX_CONNECTIONS {
                break;
            }
            let keys: Vec<String> = frontier
                .iter()
                .map(|w| w.at.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            let adjacency = self.adjacency(keys).await?;

            let mut next = Vec::new();
            for walk in &frontier {
                for adj in adjacency.get(&walk.at).into_iter().flatten() {
                    let other = &adj.node;
                    if other.key == sources[walk.source].key {
                        continue;
                    }
                    let first = walk.chain.first().unwrap_or(&adj.rel_type).clone();
                    if !visited.insert((walk.source, first, other.key.clone())) {
                        continue;
                    }
                    let mut chain = walk.chain.clone();
                    chain.push(adj.rel_type.clone());
                    found.push((walk.source, other.clone(), chain.clone()));
                    next.push(Walk {
                        source: walk.source,
                        at: other.key.clone(),
                        chain,
                    });
                }
            }
            frontier = next;
        }

        found.truncate(MAX_CONNECTIONS);
        let connections: Vec<GraphConnection> = found
            .into_iter()
            .map(|(source, neighbor, chain)| {
                let source = &sources[source];
                GraphConnection {
                    source_type: source.node_type,
                    source_identity: source.display_name(),
                    relationship: chain.first().cloned().unwrap_or_default(),
                    path_length: chain.len(),
                    relationship_chain: chain,
                    neighbor_type: neighbor.node_type,
                    neighbor_identity: neighbor.display_name(),
                }
            })
            .collect();

        debug!(count = connections.len(), "graph connections");
        Ok(connections)
    }

    /// Shortest undirected paths between two exactly named entities
    #[instrument(skip(self))]
    pub async fn find_path(
        &self,
        start: &str,
        target: &str,
        max_hops: HopLimit,
    ) -> Result<Vec<MultiHopPath>> {
        let starts = self.resolve(start, IdentityMatch::Exact).await?;
        let targets = self.resolve(target, IdentityMatch::Exact).await?;
        let target_keys: HashSet<String> = targets.iter().map(|n| n.key.clone()).collect();

        let mut refs: HashMap<String, NodeRef> = HashMap::new();
        let mut raw_paths: Vec<(Vec<String>, Vec<String>)> = Vec::new();
        for origin in &starts {
            if target_keys.contains(&origin.key) {
                continue;
            }
            refs.insert(origin.key.clone(), origin.clone());
            let found = self
                .shortest_from(
                    &origin.key,
                    &target_keys,
                    max_hops.get(),
                    MAX_PATHS - raw_paths.len(),
                    &mut refs,
                )
                .await?;
            raw_paths.extend(found);
            if raw_paths.len() >= MAX_PATHS {
                break;
            }
        }
        if raw_paths.is_empty() {
            return Ok(Vec::new());
        }
        raw_paths.sort_by_key(|(nodes, _)| nodes.len());

        Ok(raw_paths
            .into_iter()
            .map(|(nodes, relationship_types)| MultiHopPath {
                length: relationship_types.len(),
                nodes: nodes
                    .iter()
                    .map(|key| match refs.get(key) {
                        Some(node) => PathNode {
                            node_type: node.node_type,
                            name: node.display_name(),
                        },
                        None => PathNode {
                            node_type: talkgraph_core::NodeType::Unknown,
                            name: "Unknown".to_string(),
                        },
                    })
                    .collect(),
                relationship_types,
            })
            .collect())
    }

    /// Layered BFS keeping every same-layer parent, then backtracking from
    /// the first layer that reaches a target. Nodes met on the way are
    /// recorded in `refs`.
    async fn shortest_from(
        &self,
        origin: &str,
        targets: &HashSet<String>,
        max_hops: usize,
        limit: usize,
        refs: &mut HashMap<String, NodeRef>,
    ) -> Result<Vec<(Vec<String>, Vec<String>)>> {
        let mut depth_of: HashMap<String, usize> = HashMap::from([(origin.to_string(), 0)]);
        let mut parents: HashMap<String, Vec<(String, String)>> = HashMap::new();
        let mut frontier = vec![origin.to_string()];
        let mut reached: Vec<String> = Vec::new();

        for depth in 1..=max_hops {
            if frontier.is_empty() {
                break;
            }
            let adjacency = self.adjacency(frontier.clone()).await?;
            let mut next = Vec::new();
            for key in &frontier {
                for adj in adjacency.get(key).into_iter().flatten() {
                    let other = &adj.node.key;
                    match depth_of.get(other) {
                        Some(&d) if d < depth => continue,
                        Some(_) => {}
                        None => {
                            depth_of.insert(other.clone(), depth);
                            refs.insert(other.clone(), adj.node.clone());
                            next.push(other.clone());
                        }
                    }
                    parents
                        .entry(other.clone())
                        .or_default()
                        .push((key.clone(), adj.rel_type.clone()));
                }
            }
            reached = next.iter().filter(|k| targets.contains(*k)).cloned().collect();
            if !reached.is_empty() {
                break;
            }
            frontier = next;
        }

        let mut paths = Vec::new();
        for end in reached {
            let mut stack = vec![(end.clone(), vec![end], Vec::<String>::new())];
            while let Some((at, nodes, rels)) = stack.pop() {
                if paths.len() >= limit {
                    return Ok(paths);
                }
                if at == origin {
                    let mut nodes = nodes;
                    let mut rels = rels;
                    nodes.reverse();
                    rels.reverse();
                    paths.push((nodes, rels));
                    continue;
                }
                for (parent, rel_type) in parents.get(&at).into_iter().flatten().rev() {
                    let mut nodes = nodes.clone();
                    let mut rels = rels.clone();
                    nodes.push(parent.clone());
                    rels.push(rel_type.clone());
                    stack.push((parent.clone(), nodes, rels));
                }
            }
        }
        Ok(paths)
    }
}
