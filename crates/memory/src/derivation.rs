//! The memory derivation graph.

use covenant_core::MemoryReference;
use std::collections::{HashMap, HashSet, VecDeque};

/// Parent → children edges built from `derived_from` lists.
///
/// References are caller-supplied and may contain cycles despite the
/// derivation graph being acyclic in principle; traversal tolerates them.
#[derive(Debug, Default, Clone)]
pub struct DerivationGraph {
    children: HashMap<String, Vec<String>>,
}

impl DerivationGraph {
    pub fn from_references<'a>(memories: impl IntoIterator<Item = &'a MemoryReference>) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for memory in memories {
            for parent in &memory.derived_from {
                let edges = children.entry(parent.clone()).or_default();
                if !edges.contains(&memory.memory_id) {
                    edges.push(memory.memory_id.clone());
                }
            }
        }
        Self { children }
    }

    /// Direct children of `memory_id`.
    pub fn children_of(&self, memory_id: &str) -> &[String] {
        self.children.get(memory_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every memory transitively derived from any root, in breadth-first
    /// order. Roots themselves are never included.
    pub fn descendants_of<'a>(&self, roots: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let roots: Vec<&str> = roots.into_iter().collect();
        let root_set: HashSet<&str> = roots.iter().copied().collect();
        let mut visited: HashSet<&str> = root_set.clone();
        let mut queue: VecDeque<&str> = roots.into_iter().collect();
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            for child in self.children_of(current) {
                if visited.insert(child.as_str()) {
                    found.push(child.clone());
                    queue.push_back(child.as_str());
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<MemoryReference> {
        vec![
            MemoryReference::direct("A", "lc_1", 1),
            MemoryReference::derived("B", "lc_2", 1, ["A"]),
            MemoryReference::derived("C", "lc_3", 1, ["B"]),
            MemoryReference::direct("D", "lc_1", 1),
        ]
    }

    #[test]
    fn transitive_descendants() {
        let graph = DerivationGraph::from_references(&chain());
        assert_eq!(graph.descendants_of(["A"]), vec!["B".to_string(), "C".to_string()]);
        assert!(graph.descendants_of(["D"]).is_empty());
        assert!(graph.descendants_of(["missing"]).is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let memories = vec![
            MemoryReference::derived("A", "lc_1", 1, ["C"]),
            MemoryReference::derived("B", "lc_1", 1, ["A"]),
            MemoryReference::derived("C", "lc_1", 1, ["B"]),
        ];
        let graph = DerivationGraph::from_references(&memories);
        assert_eq!(graph.descendants_of(["A"]), vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn diamond_visits_each_memory_once() {
        let memories = vec![
            MemoryReference::direct("A", "lc_1", 1),
            MemoryReference::derived("B", "lc_1", 1, ["A"]),
            MemoryReference::derived("C", "lc_1", 1, ["A"]),
            MemoryReference::derived("D", "lc_1", 1, ["B", "C"]),
        ];
        let graph = DerivationGraph::from_references(&memories);
        assert_eq!(graph.descendants_of(["A"]).len(), 3);
        assert_eq!(graph.children_of("A"), ["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn roots_are_excluded_even_when_derived_from_each_other() {
        let graph = DerivationGraph::from_references(&chain());
        assert_eq!(graph.descendants_of(["A", "B"]), vec!["C".to_string()]);
    }
}
