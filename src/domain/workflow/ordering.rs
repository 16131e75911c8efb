//! Dependency ordering of steps

use std::collections::{BTreeSet, HashMap, HashSet};

use super::error::{CompileError, DependencyKind};

/// What the sorter needs to know about one step
#[derive(Debug, Clone, Copy)]
pub struct OrderNode<'a> {
    pub id: Option<&'a str>,
    pub depends_on: &'a [String],
}

/// Stable topological order of `nodes` by `depends_on`.
///
/// Ties keep declaration order. Dependencies on ids in `dropped` are ignored;
/// dependencies on ids that were never declared are errors.
pub fn topological_order(
    nodes: &[OrderNode<'_>],
    dropped: &HashSet<String>,
) -> Result<Vec<usize>, CompileError> {
    let mut by_id: HashMap<&str, usize> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        if let Some(id) = node.id {
            if by_id.insert(id, index).is_some() {
                return Err(CompileError::DuplicateStepId(id.to_string()));
            }
        }
    }

    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree = vec![0usize; nodes.len()];

    for (index, node) in nodes.iter().enumerate() {
        for dependency in node.depends_on {
            match by_id.get(dependency.as_str()) {
                Some(&target) => {
                    edges[target].push(index);
                    in_degree[index] += 1;
                }
                None if dropped.contains(dependency) => {}
                None => {
                    let label = node.id.unwrap_or("<anonymous>");
                    return Err(CompileError::unknown_dependency(label, dependency.clone()));
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|i| in_degree[*i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(index) = ready.pop_first() {
        order.push(index);
        for &next in &edges[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < nodes.len() {
        let cycle = find_cycle(&edges)
            .unwrap_or_default()
            .into_iter()
            .map(|i| nodes[i].id.unwrap_or("<anonymous>").to_string())
            .collect();
        return Err(CompileError::cyclic_dependency(DependencyKind::Steps, cycle));
    }

    Ok(order)
}

/// Reject cycles and undeclared dependencies before any step is filtered out.
///
/// Repeated ids are allowed here: mutually exclusive alternatives may share an
/// id, and every node carrying it satisfies a dependency on it.
pub fn check_acyclic(nodes: &[OrderNode<'_>]) -> Result<(), CompileError> {
    let by_id = nodes_by_id(nodes);

    for node in nodes {
        for dependency in node.depends_on {
            if !by_id.contains_key(dependency.as_str()) {
                let label = node.id.unwrap_or("<anonymous>");
                return Err(CompileError::unknown_dependency(label, dependency.clone()));
            }
        }
    }

    match step_cycle(nodes, &by_id) {
        Some(cycle) => Err(CompileError::cyclic_dependency(DependencyKind::Steps, cycle)),
        None => Ok(()),
    }
}

/// A cycle among `nodes`; dependencies on ids outside them are ignored
pub fn find_step_cycle(nodes: &[OrderNode<'_>]) -> Option<Vec<String>> {
    step_cycle(nodes, &nodes_by_id(nodes))
}

fn nodes_by_id<'a>(nodes: &[OrderNode<'a>]) -> HashMap<&'a str, Vec<usize>> {
    let mut by_id: HashMap<&'a str, Vec<usize>> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        if let Some(id) = node.id {
            by_id.entry(id).or_default().push(index);
        }
    }
    by_id
}

fn step_cycle(nodes: &[OrderNode<'_>], by_id: &HashMap<&str, Vec<usize>>) -> Option<Vec<String>> {
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (index, node) in nodes.iter().enumerate() {
        for dependency in node.depends_on {
            for &target in by_id.get(dependency.as_str()).into_iter().flatten() {
                edges[target].push(index);
            }
        }
    }

    find_cycle(&edges).map(|cycle| {
        cycle
            .into_iter()
            .map(|i| nodes[i].id.unwrap_or("<anonymous>").to_string())
            .collect()
    })
}

/// One cycle in a directed graph as a closed path `a -> b -> a`
pub(crate) fn find_cycle(edges: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::Active;
        path.push(node);

        for &next in &edges[node] {
            match marks[next] {
                Mark::Active => {
                    let start = path.iter().position(|n| *n == next).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Mark::New => {
                    if let Some(cycle) = visit(next, edges, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::New; edges.len()];
    let mut path = Vec::new();
    for node in 0..edges.len() {
        if marks[node] == Mark::New {
            if let Some(cycle) = visit(node, edges, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}
