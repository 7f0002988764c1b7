use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap};

const MAX_ITERATIONS: usize = 10;
const MAX_LEVELS: usize = 10;
const MIN_GAIN: f64 = 1e-12;

/// Weighted adjacency with self-loops kept apart, so aggregated community
/// graphs keep their internal weight in the node degree.
#[derive(Debug, Clone)]
struct Adjacency {
    neighbors: Vec<BTreeMap<usize, f64>>,
    self_loops: Vec<f64>,
}

impl Adjacency {
    fn from_graph<N>(graph: &UnGraph<N, f64>) -> Self {
        let n = graph.node_count();
        let mut adjacency = Self {
            neighbors: vec![BTreeMap::new(); n],
            self_loops: vec![0.0; n],
        };

        for edge in graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            adjacency.connect(a, b, *edge.weight());
        }

        adjacency
    }

    fn len(&self) -> usize {
        self.neighbors.len()
    }

    fn connect(&mut self, a: usize, b: usize, weight: f64) {
        if a == b {
            self.self_loops[a] += weight;
        } else {
            *self.neighbors[a].entry(b).or_insert(0.0) += weight;
            *self.neighbors[b].entry(a).or_insert(0.0) += weight;
        }
    }

    fn degree(&self, node: usize) -> f64 {
        self.neighbors[node].values().sum::<f64>() + 2.0 * self.self_loops[node]
    }
}

pub struct LouvainDetector<'a, N> {
    graph: &'a UnGraph<N, f64>,
}

impl<'a, N> LouvainDetector<'a, N> {
    pub fn new(graph: &'a UnGraph<N, f64>) -> Self {
        Self { graph }
    }

    /// Multi-level Louvain.
    ///
    /// Returns one assignment per level, finest first: `levels[l][node]` is
    /// the community of `node` at level `l`. Ids are contiguous per level and
    /// every level-l community sits inside exactly one level-(l+1) community.
    /// A graph without edges yields a single level of singletons.
    pub fn detect_hierarchy(&self) -> Vec<Vec<usize>> {
        let n = self.graph.node_count();
        if n == 0 {
            return Vec::new();
        }

        let mut current = Adjacency::from_graph(self.graph);
        let mut membership: Vec<usize> = (0..n).collect();
        let mut levels = Vec::new();

        while levels.len() < MAX_LEVELS {
            let (assignment, community_count) = local_moving(&current);
            let merged = community_count < current.len();

            if levels.is_empty() || merged {
                membership = membership.iter().map(|&node| assignment[node]).collect();
                levels.push(membership.clone());
            }
            if !merged {
                break;
            }

            current = aggregate(&current, &assignment, community_count);
        }

        levels
    }
}

/// One Louvain phase: move nodes between neighbouring communities while
/// modularity improves. Returns the renumbered assignment and community count.
fn local_moving(graph: &Adjacency) -> (Vec<usize>, usize) {
    let n = graph.len();
    let degrees: Vec<f64> = (0..n).map(|node| graph.degree(node)).collect();
    let two_m: f64 = degrees.iter().sum();

    let mut communities: Vec<usize> = (0..n).collect();
    if two_m <= 0.0 {
        return (communities, n);
    }

    let mut totals = degrees.clone();
    let mut iteration = 0;
    let mut improved = true;

    while improved && iteration < MAX_ITERATIONS {
        improved = false;
        iteration += 1;

        for node in 0..n {
            let current_comm = communities[node];
            let k_i = degrees[node];

            // Weight from node into each neighbouring community
            let mut neighbor_comms: BTreeMap<usize, f64> = BTreeMap::new();
            for (&neighbor, &weight) in &graph.neighbors[node] {
                *neighbor_comms.entry(communities[neighbor]).or_insert(0.0) += weight;
            }

            totals[current_comm] -= k_i;

            let gain = |comm: usize, weight_to_comm: f64| weight_to_comm - totals[comm] * k_i / two_m;
            let mut best_comm = current_comm;
            let mut best_gain = gain(current_comm, neighbor_comms.get(&current_comm).copied().unwrap_or(0.0));

            for (&comm, &weight_to_comm) in &neighbor_comms {
                let candidate = gain(comm, weight_to_comm);
                if candidate > best_gain + MIN_GAIN {
                    best_gain = candidate;
                    best_comm = comm;
                }
            }

            totals[best_comm] += k_i;
            if best_comm != current_comm {
                communities[node] = best_comm;
                improved = true;
            }
        }
    }

    renumber(&communities)
}

/// Contiguous ids in order of first appearance, so output is deterministic
fn renumber(communities: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    let assignment = communities
        .iter()
        .map(|&old| {
            let next = mapping.len();
            *mapping.entry(old).or_insert(next)
        })
        .collect();
    (assignment, mapping.len())
}

/// Collapse each community into a single node
fn aggregate(graph: &Adjacency, assignment: &[usize], community_count: usize) -> Adjacency {
    let mut collapsed = Adjacency {
        neighbors: vec![BTreeMap::new(); community_count],
        self_loops: vec![0.0; community_count],
    };

    for node in 0..graph.len() {
        let from = assignment[node];
        collapsed.self_loops[from] += graph.self_loops[node];
        for (&neighbor, &weight) in &graph.neighbors[node] {
            // each undirected edge is visited from both ends
            if neighbor > node {
                collapsed.connect(from, assignment[neighbor], weight);
            }
        }
    }

    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: usize, edges: &[(usize, usize)]) -> UnGraph<(), f64> {
        let mut graph = UnGraph::new_undirected();
        let indices: Vec<_> = (0..nodes).map(|_| graph.add_node(())).collect();
        for &(a, b) in edges {
            graph.add_edge(indices[a], indices[b], 1.0);
        }
        graph
    }

    #[test]
    fn test_two_cliques_split() {
        // two triangles joined by a single bridge
        let g = graph(6, &[(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)]);
        let levels = LouvainDetector::new(&g).detect_hierarchy();

        let finest = &levels[0];
        assert_eq!(finest[0], finest[1]);
        assert_eq!(finest[1], finest[2]);
        assert_eq!(finest[3], finest[4]);
        assert_eq!(finest[4], finest[5]);
        assert_ne!(finest[0], finest[3]);
    }

    #[test]
    fn test_no_edges_gives_singletons() {
        let g = graph(4, &[]);
        let levels = LouvainDetector::new(&g).detect_hierarchy();

        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0], vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_levels_are_nested() {
        let g = graph(
            9,
            &[(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (6, 7), (7, 8), (6, 8), (2, 3), (5, 6), (1, 7)],
        );
        let levels = LouvainDetector::new(&g).detect_hierarchy();

        for pair in levels.windows(2) {
            let (fine, coarse) = (&pair[0], &pair[1]);
            let mut parent_of: HashMap<usize, usize> = HashMap::new();
            for node in 0..9 {
                let parent = *parent_of.entry(fine[node]).or_insert(coarse[node]);
                assert_eq!(parent, coarse[node], "community split across parents");
            }
        }
    }

    #[test]
    fn test_empty_graph() {
        let g = graph(0, &[]);
        assert!(LouvainDetector::new(&g).detect_hierarchy().is_empty());
    }
}
