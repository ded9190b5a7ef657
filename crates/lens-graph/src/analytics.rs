//! Structural analysis of a connection's entity graph.
//!
//! Everything here works on an [`EntityGraph`] snapshot, so Neo4j and the
//! in-memory store share the same algorithms.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::store::EntityGraph;

/// Default degree above which an entity counts as a hub.
pub const DEFAULT_HUB_THRESHOLD: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hub {
    pub name: String,
    pub degree: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Good,
    Warning,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Good => "GOOD",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuralReport {
    pub connection_id: String,
    pub entities: usize,
    pub isolated: Vec<String>,
    pub max_depth: usize,
    pub hubs: Vec<Hub>,
    pub score: u32,
    pub status: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactedEntity {
    pub name: String,
    pub hops: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImpactReport {
    pub seeds: Vec<String>,
    /// Reachable entities other than the seeds, nearest first.
    pub affected: Vec<ImpactedEntity>,
    pub max_hops: usize,
}

/// Adjacency lists over entity names.
struct Adjacency<'a> {
    outgoing: BTreeMap<&'a str, BTreeSet<&'a str>>,
    incoming: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> Adjacency<'a> {
    fn new(graph: &'a EntityGraph) -> Self {
        let mut outgoing: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut incoming: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (s, t) in &graph.edges {
            outgoing.entry(s.as_str()).or_default().insert(t.as_str());
            incoming.entry(t.as_str()).or_default().insert(s.as_str());
        }
        Self { outgoing, incoming }
    }

    fn out(&self, node: &str) -> impl Iterator<Item = &'a str> + '_ {
        self.outgoing.get(node).into_iter().flatten().copied()
    }

    fn neighbours(&self, node: &str) -> BTreeSet<&'a str> {
        self.outgoing
            .get(node)
            .into_iter()
            .chain(self.incoming.get(node))
            .flatten()
            .copied()
            .collect()
    }
}

/// Entities with no `REFERENCES` edge in either direction.
pub fn isolated_entities(graph: &EntityGraph) -> Vec<String> {
    let touched: HashSet<&str> = graph
        .edges
        .iter()
        .flat_map(|(s, t)| [s.as_str(), t.as_str()])
        .collect();
    let mut out: Vec<String> = graph
        .entities
        .iter()
        .filter(|e| !touched.contains(e.as_str()))
        .cloned()
        .collect();
    out.sort();
    out
}

/// Length, in edges, of the longest simple directed path.
pub fn max_depth(graph: &EntityGraph) -> usize {
    let adj = Adjacency::new(graph);
    let mut best = 0;
    let mut on_path = HashSet::new();
    for start in adj.outgoing.keys() {
        on_path.insert(*start);
        best = best.max(longest_from(&adj, start, &mut on_path));
        on_path.remove(start);
    }
    best
}

fn longest_from<'a>(adj: &Adjacency<'a>, node: &str, on_path: &mut HashSet<&'a str>) -> usize {
    let mut best = 0;
    for next in adj.out(node) {
        if on_path.contains(next) {
            continue;
        }
        on_path.insert(next);
        best = best.max(1 + longest_from(adj, next, on_path));
        on_path.remove(next);
    }
    best
}

/// Entities whose in plus out `REFERENCES` degree exceeds `threshold`,
/// highest degree first.
pub fn hubs(graph: &EntityGraph, threshold: usize) -> Vec<Hub> {
    let mut degree: HashMap<&str, usize> = HashMap::new();
    for (s, t) in &graph.edges {
        *degree.entry(s.as_str()).or_default() += 1;
        *degree.entry(t.as_str()).or_default() += 1;
    }
    let mut out: Vec<Hub> = degree
        .into_iter()
        .filter(|(_, d)| *d > threshold)
        .map(|(name, degree)| Hub {
            name: name.to_string(),
            degree,
        })
        .collect();
    out.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.name.cmp(&b.name)));
    out
}

/// 100, minus 10 per isolated entity (at most 40), minus 5 per hub.
pub fn health_score(isolated: usize, hubs: usize) -> u32 {
    let penalty = (isolated * 10).min(40) + hubs * 5;
    100u32.saturating_sub(u32::try_from(penalty).unwrap_or(u32::MAX))
}

pub fn health_status(score: u32) -> HealthStatus {
    if score > 80 {
        HealthStatus::Good
    } else if score > 50 {
        HealthStatus::Warning
    } else {
        HealthStatus::Critical
    }
}

pub fn structural_report(graph: &EntityGraph, hub_threshold: usize) -> StructuralReport {
    let isolated = isolated_entities(graph);
    let hubs = hubs(graph, hub_threshold);
    let score = health_score(isolated.len(), hubs.len());
    StructuralReport {
        connection_id: graph.connection_id.clone(),
        entities: graph.entities.len(),
        max_depth: max_depth(graph),
        status: health_status(score),
        score,
        isolated,
        hubs,
    }
}

/// Entities reachable from `seeds` through outgoing `REFERENCES`.
pub fn impact(graph: &EntityGraph, seeds: &[String]) -> ImpactReport {
    let adj = Adjacency::new(graph);
    let known: HashSet<&str> = graph.entities.iter().map(String::as_str).collect();

    let mut hops: HashMap<&str, usize> = HashMap::new();
    let mut queue = VecDeque::new();
    for seed in seeds.iter().filter(|s| known.contains(s.as_str())) {
        if hops.insert(seed.as_str(), 0).is_none() {
            queue.push_back(seed.as_str());
        }
    }

    while let Some(node) = queue.pop_front() {
        let depth = hops[node];
        for next in adj.out(node) {
            if !hops.contains_key(next) {
                hops.insert(next, depth + 1);
                queue.push_back(next);
            }
        }
    }

    let mut affected: Vec<ImpactedEntity> = hops
        .into_iter()
        .filter(|(_, h)| *h > 0)
        .map(|(name, hops)| ImpactedEntity {
            name: name.to_string(),
            hops,
        })
        .collect();
    affected.sort_by(|a, b| a.hops.cmp(&b.hops).then_with(|| a.name.cmp(&b.name)));

    ImpactReport {
        seeds: seeds.to_vec(),
        max_hops: affected.iter().map(|a| a.hops).max().unwrap_or(0),
        affected,
    }
}

/// Shortest chain of entities joining `from` to `to`, following
/// `REFERENCES` in either direction. `None` when unconnected or unknown.
pub fn join_path(graph: &EntityGraph, from: &str, to: &str) -> Option<Vec<String>> {
    if !graph.entities.iter().any(|e| e == from) || !graph.entities.iter().any(|e| e == to) {
        return None;
    }
    if from == to {
        return Some(vec![from.to_string()]);
    }

    let adj = Adjacency::new(graph);
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    let mut seen: HashSet<&str> = HashSet::from([from]);

    while let Some(node) = queue.pop_front() {
        for next in adj.neighbours(node) {
            if !seen.insert(next) {
                continue;
            }
            parent.insert(next, node);
            if next == to {
                let mut path = vec![to.to_string()];
                let mut cur = to;
                while let Some(&prev) = parent.get(cur) {
                    path.push(prev.to_string());
                    cur = prev;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}

/// Direct `REFERENCES` neighbours of `entity`, either direction.
pub fn related_entities(graph: &EntityGraph, entity: &str) -> Vec<String> {
    Adjacency::new(graph)
        .neighbours(entity)
        .into_iter()
        .filter(|n| *n != entity)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(entities: &[&str], edges: &[(&str, &str)]) -> EntityGraph {
        EntityGraph {
            connection_id: "c1".into(),
            entities: entities.iter().map(|s| s.to_string()).collect(),
            edges: edges.iter().map(|(s, t)| (s.to_string(), t.to_string())).collect(),
        }
    }

    fn shop() -> EntityGraph {
        graph(
            &["customers", "order_items", "orders", "products", "audit_log"],
            &[
                ("order_items", "orders"),
                ("order_items", "products"),
                ("orders", "customers"),
            ],
        )
    }

    #[test]
    fn test_isolated_and_depth() {
        let g = shop();
        assert_eq!(isolated_entities(&g), vec!["audit_log".to_string()]);
        assert_eq!(max_depth(&g), 2);
    }

    #[test]
    fn test_depth_terminates_on_cycles() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a"), ("a", "a")]);
        assert_eq!(max_depth(&g), 2);
        assert!(isolated_entities(&g).is_empty());
    }

    #[test]
    fn test_hub_needs_degree_above_threshold() {
        let spokes = ["s1", "s2", "s3", "s4", "s5", "s6"];
        let mut entities = vec!["hub"];
        entities.extend(spokes);
        let edges: Vec<(&str, &str)> = spokes.iter().map(|s| (*s, "hub")).collect();

        let g = graph(&entities, &edges[..5]);
        assert!(hubs(&g, DEFAULT_HUB_THRESHOLD).is_empty());

        let g = graph(&entities, &edges);
        assert_eq!(
            hubs(&g, DEFAULT_HUB_THRESHOLD),
            vec![Hub {
                name: "hub".into(),
                degree: 6
            }]
        );
    }

    #[test]
    fn test_health_score_and_status() {
        assert_eq!(health_score(0, 0), 100);
        assert_eq!(health_score(7, 0), 60);
        assert_eq!(health_score(4, 3), 45);
        assert_eq!(health_status(100), HealthStatus::Good);
        assert_eq!(health_status(81), HealthStatus::Good);
        assert_eq!(health_status(80), HealthStatus::Warning);
        assert_eq!(health_status(50), HealthStatus::Critical);

        let report = structural_report(&shop(), DEFAULT_HUB_THRESHOLD);
        assert_eq!(report.score, 90);
        assert_eq!(report.status.to_string(), "GOOD");
    }

    #[test]
    fn test_impact_follows_outgoing_references() {
        let report = impact(&shop(), &["order_items".to_string()]);
        let got: Vec<(&str, usize)> = report.affected.iter().map(|a| (a.name.as_str(), a.hops)).collect();
        assert_eq!(got, vec![("orders", 1), ("products", 1), ("customers", 2)]);
        assert_eq!(report.max_hops, 2);

        let none = impact(&shop(), &["customers".to_string()]);
        assert!(none.affected.is_empty());
        assert_eq!(none.max_hops, 0);
    }

    #[test]
    fn test_join_path_ignores_direction() {
        let g = shop();
        assert_eq!(
            join_path(&g, "customers", "products").unwrap(),
            vec!["customers", "orders", "order_items", "products"]
        );
        assert_eq!(join_path(&g, "customers", "audit_log"), None);
        assert_eq!(join_path(&g, "customers", "nope"), None);
    }

    #[test]
    fn test_related_entities_are_one_hop() {
        assert_eq!(related_entities(&shop(), "orders"), vec!["customers", "order_items"]);
    }
}
