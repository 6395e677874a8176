use alloc::collections::BTreeMap;
use alloc::vec::Vec;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Open,
    Closed,
}

/// Non-weak references seen while a graph is rebuilt, keyed by object id.
///
/// Objects are filled one after another, so a referencing field may receive
/// an object that is filled later. Cycles among these references are found
/// once every object is filled.
#[derive(Default)]
pub(crate) struct StrongEdges {
    edges: BTreeMap<u32, Vec<u32>>,
}

impl StrongEdges {
    #[inline]
    pub fn insert(&mut self, from: u32, to: u32) {
        self.edges.entry(from).or_default().push(to);
    }

    /// Returns the objects that close a cycle, each once, in discovery order.
    ///
    /// Depth-first from the lowest id, with an explicit stack.
    pub fn cycle_targets(&self) -> Vec<u32> {
        let mut marks: BTreeMap<u32, Mark> = BTreeMap::new();
        let mut targets = Vec::new();
        let mut stack: Vec<(u32, usize)> = Vec::new();

        for &start in self.edges.keys() {
            if marks.contains_key(&start) {
                continue;
            }
            marks.insert(start, Mark::Open);
            stack.push((start, 0));

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                let out = self.edges.get(&node).map_or(&[][..], Vec::as_slice);
                let Some(&to) = out.get(*next) else {
                    marks.insert(node, Mark::Closed);
                    stack.pop();
                    continue;
                };
                *next += 1;
                match marks.get(&to) {
                    None => {
                        marks.insert(to, Mark::Open);
                        stack.push((to, 0));
                    }
                    Some(Mark::Open) if !targets.contains(&to) => targets.push(to),
                    Some(_) => {}
                }
            }
        }
        targets
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::StrongEdges;

    #[test]
    fn chains_and_diamonds_have_no_cycle() {
        let mut edges = StrongEdges::default();
        for id in 1..10_000 {
            edges.insert(id, id + 1);
        }
        edges.insert(0, 1);
        edges.insert(0, 2);
        assert!(edges.cycle_targets().is_empty());
    }

    #[test]
    fn each_cycle_is_reported_where_it_closes() {
        let mut edges = StrongEdges::default();
        edges.insert(1, 3);
        edges.insert(3, 2);
        edges.insert(2, 1);
        edges.insert(2, 1);
        edges.insert(4, 4);
        assert_eq!(edges.cycle_targets(), [1, 4]);
    }
}
