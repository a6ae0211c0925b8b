//! Service support graph.
//!
//! Connectivity services at adjacent layers support each other: an ODU
//! service carries the DSR services built on it. [`SupportGraph`] holds that
//! relation as a directed graph with edges pointing from supporter to
//! supported service. The propagator asks it which services a changed
//! service supports; teardown asks which dependents a removed service leaves.
//!
//! References to services that are not in the graph are ignored, since a
//! dangling support reference must not block propagation for the rest.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use lumen_core::ServiceId;

use crate::error::{Error, Result};
use crate::model::ConnectivityService;

/// Directed supporter → supported graph over connectivity services.
#[derive(Debug, Clone, Default)]
pub struct SupportGraph {
    graph: DiGraph<ServiceId, ()>,
    index_map: HashMap<ServiceId, NodeIndex>,
}

impl SupportGraph {
    /// Builds the graph from a set of services.
    ///
    /// Nodes are inserted in the order given, which is also the tie-breaking
    /// order of every query result.
    #[must_use]
    pub fn build<'a>(services: impl IntoIterator<Item = &'a ConnectivityService>) -> Self {
        let services: Vec<&ConnectivityService> = services.into_iter().collect();
        let mut graph = Self::default();
        for service in &services {
            graph.add_node(service.id.clone());
        }
        for service in &services {
            let Some(&supported) = graph.index_map.get(&service.id) else {
                continue;
            };
            for supporter_id in &service.supporting_services {
                match graph.index_map.get(supporter_id) {
                    Some(&supporter) => {
                        graph.graph.add_edge(supporter, supported, ());
                    }
                    None => tracing::warn!(
                        service_id = %service.id,
                        supporting_service_id = %supporter_id,
                        "supporting service not found; reference ignored"
                    ),
                }
            }
        }
        graph
    }

    fn add_node(&mut self, id: ServiceId) -> NodeIndex {
        if let Some(&idx) = self.index_map.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.index_map.insert(id, idx);
        idx
    }

    fn neighbors(&self, id: &ServiceId, direction: Direction) -> Vec<ServiceId> {
        let Some(&idx) = self.index_map.get(id) else {
            return Vec::new();
        };
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        // NodeIndex order is insertion order.
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect()
    }

    /// Returns the services directly supported by `id`.
    #[must_use]
    pub fn supported_by(&self, id: &ServiceId) -> Vec<ServiceId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Returns an error if the support relation contains a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] naming one service on the cycle.
    pub fn check_acyclic(&self) -> Result<()> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|_| ())
            .map_err(|cycle| Error::CycleDetected {
                cycle: vec![
                    self.graph
                        .node_weight(cycle.node_id())
                        .map_or_else(|| "unknown".to_string(), ToString::to_string),
                ],
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LayerProtocolName;

    fn svc(id: &str, layer: LayerProtocolName, supporters: &[&str]) -> ConnectivityService {
        supporters.iter().fold(
            ConnectivityService::new(ServiceId::new(id), id, layer),
            |s, sup| s.supported_by(ServiceId::new(*sup)),
        )
    }

    fn ids(values: &[&str]) -> Vec<ServiceId> {
        values.iter().map(|v| ServiceId::new(*v)).collect()
    }

    #[test]
    fn supported_services_follow_references() {
        let services = [
            svc("ODU", LayerProtocolName::Odu, &[]),
            svc("DSR-1", LayerProtocolName::Dsr, &["ODU"]),
            svc("DSR-2", LayerProtocolName::Dsr, &["ODU"]),
        ];
        let graph = SupportGraph::build(&services);
        assert_eq!(
            graph.supported_by(&ServiceId::new("ODU")),
            ids(&["DSR-1", "DSR-2"])
        );
        assert!(graph.supported_by(&ServiceId::new("DSR-1")).is_empty());
        assert!(graph.supported_by(&ServiceId::new("unknown")).is_empty());
        assert!(graph.check_acyclic().is_ok());
    }

    #[test]
    fn dangling_reference_is_ignored() {
        let services = [svc("DSR", LayerProtocolName::Dsr, &["GONE"])];
        let graph = SupportGraph::build(&services);
        assert!(graph.supported_by(&ServiceId::new("GONE")).is_empty());
        assert!(graph.check_acyclic().is_ok());
    }

    #[test]
    fn cycle_is_reported() {
        let services = [
            svc("A", LayerProtocolName::Odu, &["B"]),
            svc("B", LayerProtocolName::Dsr, &["A"]),
        ];
        let graph = SupportGraph::build(&services);
        assert!(matches!(
            graph.check_acyclic(),
            Err(Error::CycleDetected { .. })
        ));
    }
}
