/// Dependency ordering — a generic topological sort over an edge list.
///
/// Used at compile time to give the thunk arena a deterministic layout and
/// to reject mutually-recursive definitions. Deliberate self-references
/// are pre-broken into lazy wrappers before this runs, so any cycle seen
/// here is an error.

use rustc_hash::FxHashMap;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OrderError<T: Debug> {
    /// A closed chain of dependencies, listed in traversal order with the
    /// starting node repeated at the end.
    #[error("closed chain: {0:?}")]
    ClosedChain(Vec<T>),
}

/// Order `nodes` so that for every edge `(from, to)`, `to` precedes
/// `from`. Input slices may list edges whose endpoints are absent from
/// `nodes`; such endpoints are ignored. The result is deterministic for a
/// given input.
pub fn topo_sort<T>(nodes: &[T], edges: &[(T, T)]) -> Result<Vec<T>, OrderError<T>>
where
    T: Eq + Hash + Clone + Ord + Debug,
{
    let mut deps: FxHashMap<&T, Vec<&T>> = FxHashMap::default();
    for node in nodes {
        deps.entry(node).or_default();
    }
    for (from, to) in edges {
        if !deps.contains_key(to) {
            continue;
        }
        if let Some(list) = deps.get_mut(from) {
            list.push(to);
        }
    }
    for list in deps.values_mut() {
        list.sort();
        list.dedup();
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut order = Vec::with_capacity(nodes.len());
    let mut marks: FxHashMap<&T, Mark> = FxHashMap::default();
    let mut sorted_nodes: Vec<&T> = nodes.iter().collect();
    sorted_nodes.sort();
    sorted_nodes.dedup();

    fn visit<'a, T>(
        node: &'a T,
        deps: &FxHashMap<&'a T, Vec<&'a T>>,
        marks: &mut FxHashMap<&'a T, Mark>,
        stack: &mut Vec<&'a T>,
        order: &mut Vec<T>,
    ) -> Result<(), OrderError<T>>
    where
        T: Eq + Hash + Clone + Ord + Debug,
    {
        match marks.get(node).copied() {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                // Closed chain: report from the first occurrence of the
                // repeated node, with that node repeated at the end.
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut chain: Vec<T> = stack[start..].iter().map(|n| (*n).clone()).collect();
                chain.push(node.clone());
                return Err(OrderError::ClosedChain(chain));
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        if let Some(children) = deps.get(node) {
            for &child in children.iter() {
                visit(child, deps, marks, stack, order)?;
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        order.push(node.clone());
        Ok(())
    }

    let mut stack = Vec::new();
    for node in sorted_nodes {
        visit(node, &deps, &mut marks, &mut stack, &mut order)?;
    }

    Ok(order)
}
