use std::collections::{HashMap, HashSet, VecDeque};

/// Graph structure for traversal and analysis.
///
/// Edges are referenced by their index in the flow's declared edge list so
/// that outgoing edges keep declaration order.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  /// Adjacency list: node_id -> indices of outgoing edges.
  outgoing: HashMap<String, Vec<usize>>,
  /// (from, to) per edge index.
  endpoints: Vec<(String, String)>,
}

impl Graph {
  /// Build a graph from node ids and (from, to) edge pairs.
  pub fn new<'a>(
    node_ids: impl IntoIterator<Item = &'a str>,
    edges: impl IntoIterator<Item = (&'a str, &'a str)>,
  ) -> Self {
    let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();

    // Initialize all nodes
    for node_id in node_ids {
      outgoing.entry(node_id.to_string()).or_default();
    }

    let mut endpoints = Vec::new();
    for (index, (from, to)) in edges.into_iter().enumerate() {
      outgoing.entry(from.to_string()).or_default().push(index);
      endpoints.push((from.to_string(), to.to_string()));
    }

    Self {
      outgoing,
      endpoints,
    }
  }

  /// Indices of edges leaving `node_id`, in declaration order.
  pub fn outgoing(&self, node_id: &str) -> &[usize] {
    self
      .outgoing
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get downstream node ids for a given node.
  pub fn downstream(&self, node_id: &str) -> impl Iterator<Item = &str> {
    self
      .outgoing(node_id)
      .iter()
      .map(|&i| self.endpoints[i].1.as_str())
  }

  /// Every node reachable from `start` (including `start`), ignoring conditions.
  pub fn reachable_from(&self, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start.to_string()]);

    while let Some(node) = queue.pop_front() {
      if !seen.insert(node.clone()) {
        continue;
      }
      for next in self.downstream(&node) {
        if !seen.contains(next) {
          queue.push_back(next.to_string());
        }
      }
    }

    seen
  }

  /// Cycles found by DFS from `start`, each as the node path closing the loop.
  ///
  /// The walk keeps an explicit frame stack, so graph depth is bounded only
  /// by memory.
  pub fn find_cycles(&self, start: &str) -> Vec<Vec<String>> {
    // 0 = unvisited, 1 = on stack, 2 = done
    let mut color: HashMap<&str, u8> = HashMap::new();
    // (node, next outgoing position)
    let mut frames: Vec<(&str, usize)> = Vec::new();
    let mut cycles = Vec::new();

    let Some((start, _)) = self.outgoing.get_key_value(start) else {
      return cycles;
    };
    color.insert(start.as_str(), 1);
    frames.push((start.as_str(), 0));

    while let Some(frame) = frames.last_mut() {
      let (node, cursor) = *frame;
      let Some(&edge) = self.outgoing(node).get(cursor) else {
        frames.pop();
        color.insert(node, 2);
        continue;
      };
      frame.1 += 1;

      let next = self.endpoints[edge].1.as_str();
      match color.get(next).copied().unwrap_or(0) {
        1 => {
          // Back edge: the cycle is the stack suffix starting at `next`.
          if let Some(pos) = frames.iter().position(|(n, _)| *n == next) {
            cycles.push(frames[pos..].iter().map(|(n, _)| n.to_string()).collect());
          }
        }
        0 => {
          color.insert(next, 1);
          frames.push((next, 0));
        }
        _ => {}
      }
    }
    cycles
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn graph(nodes: &[&'static str], edges: &[(&'static str, &'static str)]) -> Graph {
    Graph::new(nodes.iter().copied(), edges.iter().copied())
  }

  #[test]
  fn test_outgoing_keeps_declaration_order() {
    let g = graph(&["a", "b", "c"], &[("a", "c"), ("a", "b")]);
    let targets: Vec<&str> = g.downstream("a").collect();
    assert_eq!(targets, vec!["c", "b"]);
    assert!(g.outgoing("c").is_empty());
  }

  #[test]
  fn test_reachable_from() {
    let g = graph(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c")]);
    let reachable = g.reachable_from("a");
    assert!(reachable.contains("c"));
    assert!(!reachable.contains("d"));
  }

  #[test]
  fn test_find_cycles() {
    let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "b")]);
    let cycles = g.find_cycles("a");
    assert_eq!(cycles, vec![vec!["b".to_string(), "c".to_string()]]);

    let acyclic = graph(&["a", "b"], &[("a", "b")]);
    assert!(acyclic.find_cycles("a").is_empty());
  }

  #[test]
  fn test_find_cycles_on_long_chain() {
    let ids: Vec<String> = (0..200_000).map(|i| format!("n{}", i)).collect();
    let mut edges: Vec<(&str, &str)> = ids.windows(2).map(|w| (w[0].as_str(), w[1].as_str())).collect();
    edges.push((ids[ids.len() - 1].as_str(), ids[0].as_str()));
    let g = Graph::new(ids.iter().map(String::as_str), edges);

    let cycles = g.find_cycles("n0");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].len(), ids.len());
  }
}
