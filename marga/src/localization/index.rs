//! Per-map embedding index.
//!
//! The index holds every embedding that identifies a node on one map:
//! - the node's taught place embeddings
//! - the first waypoint of each path, owned by the path's start node
//! - the last waypoint of each path, owned by the path's end node
//!
//! Intermediate waypoints are left out. They lie between two nodes and belong
//! to neither, so a match on one cannot name a node. Position along a route is
//! found by [`best_waypoint`](super::best_waypoint) during navigation instead.
//!
//! Search is a linear cosine scan.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::core::{Embedding, MapId, NodeId, Waypoint};
use crate::error::Result;
use crate::store::PathStore;

/// One searchable embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub node_id: NodeId,
    /// Tie-breaker: waypoint sequence number, or position in the node's
    /// place-embedding list.
    pub sequence: u32,
    pub embedding: Embedding,
}

/// Best entry for a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub node_id: NodeId,
    pub similarity: f32,
    pub sequence: u32,
}

impl IndexHit {
    /// Higher similarity wins; equal similarity goes to the earlier sequence.
    pub fn beats(&self, other: &IndexHit) -> bool {
        match self.similarity.total_cmp(&other.similarity) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.sequence < other.sequence,
        }
    }
}

/// Searchable embeddings of one map.
#[derive(Debug, Clone)]
pub struct WaypointIndex {
    map_id: MapId,
    entries: Vec<IndexEntry>,
    node_names: HashMap<NodeId, String>,
}

impl WaypointIndex {
    pub fn new(
        map_id: MapId,
        entries: Vec<IndexEntry>,
        node_names: HashMap<NodeId, String>,
    ) -> Self {
        Self {
            map_id,
            entries,
            node_names,
        }
    }

    /// Load the index for `map` from the store.
    ///
    /// Paths whose waypoints cannot be read are skipped with a warning so one
    /// corrupt recording does not disable localization for the whole map.
    pub fn build(store: &dyn PathStore, map: MapId) -> Result<Self> {
        let node_names: HashMap<NodeId, String> = store
            .nodes(map)?
            .into_iter()
            .map(|n| (n.id, n.name))
            .collect();

        let mut entries = Vec::new();
        let mut per_node: HashMap<NodeId, u32> = HashMap::new();
        for place in store.place_embeddings(map)? {
            let position = per_node.entry(place.node_id).or_insert(0);
            entries.push(IndexEntry {
                node_id: place.node_id,
                sequence: *position,
                embedding: place.embedding,
            });
            *position += 1;
        }

        for path in store.paths_on_map(map)? {
            let waypoints = match store.waypoints(path.id) {
                Ok(w) => w,
                Err(e) => {
                    warn!("Skipping path {} in index: {}", path.id, e);
                    continue;
                }
            };
            if let Some(first) = waypoints.first() {
                entries.push(endpoint_entry(path.start_node, first));
            }
            if let Some(last) = waypoints.last() {
                entries.push(endpoint_entry(path.end_node, last));
            }
        }

        debug!(
            "Built index for map {}: {} entries over {} nodes",
            map,
            entries.len(),
            node_names.len()
        );
        Ok(Self::new(map, entries, node_names))
    }

    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn node_name(&self, node: NodeId) -> Option<&str> {
        self.node_names.get(&node).map(String::as_str)
    }

    /// Entry most similar to `query`.
    pub fn best_match(&self, query: &Embedding) -> Option<IndexHit> {
        let mut best: Option<IndexHit> = None;
        for entry in &self.entries {
            let hit = IndexHit {
                node_id: entry.node_id,
                similarity: query.similarity(&entry.embedding),
                sequence: entry.sequence,
            };
            if best.is_none_or(|b| hit.beats(&b)) {
                best = Some(hit);
            }
        }
        best
    }

    /// Best hit per node for `query`.
    pub fn node_scores(&self, query: &Embedding) -> HashMap<NodeId, IndexHit> {
        let mut scores: HashMap<NodeId, IndexHit> = HashMap::new();
        for entry in &self.entries {
            let hit = IndexHit {
                node_id: entry.node_id,
                similarity: query.similarity(&entry.embedding),
                sequence: entry.sequence,
            };
            scores
                .entry(entry.node_id)
                .and_modify(|best| {
                    if hit.beats(best) {
                        *best = hit;
                    }
                })
                .or_insert(hit);
        }
        scores
    }
}

fn endpoint_entry(node_id: NodeId, waypoint: &Waypoint) -> IndexEntry {
    IndexEntry {
        node_id,
        sequence: waypoint.sequence_number(),
        embedding: waypoint.embedding().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PathDraft, TurnDirection, WaypointDraft};
    use crate::store::MemoryStore;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    fn waypoint(seq: u32, values: &[f32]) -> WaypointDraft {
        WaypointDraft {
            sequence_number: seq,
            embedding: emb(values),
            heading: 0.0,
            heading_change: 0.0,
            turn: TurnDirection::Straight,
            is_decision_point: false,
            landmark: None,
            distance_from_previous_m: None,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_build_uses_places_and_path_endpoints() {
        let store = MemoryStore::new();
        let map = store.add_map("Office").unwrap();
        let a = store.add_node(map, "Lobby", 0.0, 0.0, None).unwrap();
        let b = store.add_node(map, "Lab", 5.0, 0.0, None).unwrap();
        store.add_place_embedding(a, None, emb(&[1.0, 0.0, 0.0])).unwrap();
        store
            .insert_path(PathDraft {
                map_id: map,
                name: "Lobby to Lab".into(),
                start_node: a,
                end_node: b,
                estimated_distance_m: 3.0,
                estimated_steps: 5,
                waypoints: vec![
                    waypoint(0, &[0.9, 0.1, 0.0]),
                    waypoint(1, &[0.5, 0.5, 0.0]),
                    waypoint(2, &[0.0, 0.0, 1.0]),
                ],
            })
            .unwrap();

        let index = WaypointIndex::build(&store, map).unwrap();
        // Place embedding + first + last, the middle waypoint is not indexed
        assert_eq!(index.len(), 3);
        assert_eq!(index.node_name(b), Some("Lab"));

        let hit = index.best_match(&emb(&[0.0, 0.1, 1.0])).unwrap();
        assert_eq!(hit.node_id, b);
        assert_eq!(hit.sequence, 2);
    }

    #[test]
    fn test_tie_goes_to_earliest_sequence() {
        let index = WaypointIndex::new(
            MapId(1),
            vec![
                IndexEntry {
                    node_id: NodeId(7),
                    sequence: 4,
                    embedding: emb(&[1.0, 0.0]),
                },
                IndexEntry {
                    node_id: NodeId(8),
                    sequence: 1,
                    embedding: emb(&[2.0, 0.0]),
                },
            ],
            HashMap::new(),
        );
        let hit = index.best_match(&emb(&[1.0, 0.0])).unwrap();
        assert_eq!(hit.node_id, NodeId(8));
    }

    #[test]
    fn test_node_scores_keep_best_per_node() {
        let index = WaypointIndex::new(
            MapId(1),
            vec![
                IndexEntry {
                    node_id: NodeId(1),
                    sequence: 0,
                    embedding: emb(&[1.0, 0.0]),
                },
                IndexEntry {
                    node_id: NodeId(1),
                    sequence: 1,
                    embedding: emb(&[0.0, 1.0]),
                },
                IndexEntry {
                    node_id: NodeId(2),
                    sequence: 0,
                    embedding: emb(&[1.0, 1.0]),
                },
            ],
            HashMap::new(),
        );
        let scores = index.node_scores(&emb(&[0.0, 1.0]));
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[&NodeId(1)].sequence, 1);
        assert!(scores[&NodeId(1)].similarity > scores[&NodeId(2)].similarity);
    }

    #[test]
    fn test_empty_index_has_no_match() {
        let index = WaypointIndex::new(MapId(1), vec![], HashMap::new());
        assert!(index.is_empty());
        assert!(index.best_match(&emb(&[1.0])).is_none());
    }
}
