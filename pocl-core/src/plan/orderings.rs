use std::collections::HashMap;

use crate::domain::StepId;

use super::chain::Chain;
use super::steps::{Ordering, GOAL_ID, INIT_ID};

/// Precedence constraints between plan steps, kept transitively closed.
///
/// Steps get a dense index the first time they appear in an ordering; the
/// reachability matrix is indexed by it. The initial step precedes and the
/// goal step follows every other step without being stored.
#[derive(Debug, Clone, Default)]
pub struct Orderings {
    orderings: Chain<Ordering>,
    id_map: HashMap<StepId, usize>,
    ids: Vec<StepId>,
    order: Vec<Vec<bool>>,
}

impl Orderings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if `a` is necessarily before `b`.
    pub fn before(&self, a: StepId, b: StepId) -> bool {
        if a == b {
            return false;
        }
        if a == INIT_ID || b == GOAL_ID {
            return true;
        }
        if a == GOAL_ID || b == INIT_ID {
            return false;
        }
        match (self.id_map.get(&a), self.id_map.get(&b)) {
            (Some(&i), Some(&j)) => self.order[i][j],
            _ => false,
        }
    }

    /// Checks if `a` is necessarily after `b`.
    pub fn after(&self, a: StepId, b: StepId) -> bool {
        self.before(b, a)
    }

    pub fn possibly_before(&self, a: StepId, b: StepId) -> bool {
        a != b && !self.after(a, b)
    }

    pub fn possibly_after(&self, a: StepId, b: StepId) -> bool {
        a != b && !self.before(a, b)
    }

    /// Copy of these orderings with `ordering` added and the closure updated.
    ///
    /// # Panics
    ///
    /// If the reverse ordering already holds. Callers probe with
    /// [`possibly_before`](Self::possibly_before) first.
    pub fn refine(&self, ordering: Ordering) -> Orderings {
        let (u, v) = (ordering.before_id, ordering.after_id);
        assert!(
            self.possibly_before(u, v),
            "ordering {u} < {v} would introduce a cycle"
        );
        let mut refined = self.clone();
        refined.orderings = self.orderings.cons(ordering);
        if u == INIT_ID || v == GOAL_ID || self.before(u, v) {
            return refined;
        }
        let iu = refined.index(u);
        let iv = refined.index(v);
        let preds: Vec<usize> = (0..refined.ids.len())
            .filter(|&a| a == iu || refined.order[a][iu])
            .collect();
        let succs: Vec<usize> = (0..refined.ids.len())
            .filter(|&b| b == iv || refined.order[iv][b])
            .collect();
        for &a in &preds {
            for &b in &succs {
                refined.order[a][b] = true;
            }
        }
        refined
    }

    fn index(&mut self, id: StepId) -> usize {
        if let Some(&index) = self.id_map.get(&id) {
            return index;
        }
        let index = self.ids.len();
        self.id_map.insert(id, index);
        self.ids.push(id);
        for row in &mut self.order {
            row.push(false);
        }
        self.order.push(vec![false; index + 1]);
        index
    }

    /// Explicit orderings, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Ordering> {
        self.orderings.iter()
    }

    pub fn len(&self) -> usize {
        self.orderings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orderings.is_empty()
    }

    /// All stored `(before, after)` pairs of the closure, sorted. Implicit
    /// orderings against the initial and goal steps are left out.
    pub fn closure(&self) -> Vec<(StepId, StepId)> {
        let mut pairs = Vec::new();
        for (i, row) in self.order.iter().enumerate() {
            for (j, set) in row.iter().enumerate() {
                if *set {
                    pairs.push((self.ids[i], self.ids[j]));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::steps::Reason;

    fn order(before: StepId, after: StepId) -> Ordering {
        Ordering::new(before, after, Reason::Establish)
    }

    #[test]
    fn sentinels_bound_every_step() {
        let orderings = Orderings::new();
        assert!(orderings.before(INIT_ID, 5));
        assert!(orderings.before(5, GOAL_ID));
        assert!(orderings.after(GOAL_ID, INIT_ID));
        assert!(!orderings.possibly_before(GOAL_ID, 5));
        assert!(orderings.possibly_before(3, 5));
        assert!(orderings.possibly_before(5, 3));
        assert!(!orderings.possibly_before(3, 3));
    }

    #[test]
    fn refine_propagates_transitively() {
        let orderings = Orderings::new()
            .refine(order(1, 2))
            .refine(order(3, 4))
            .refine(order(2, 3));
        assert!(orderings.before(1, 4));
        assert!(orderings.after(4, 1));
        assert!(!orderings.possibly_before(4, 1));
        assert_eq!(
            orderings.closure(),
            vec![(1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (3, 4)]
        );
        assert_eq!(orderings.len(), 3);
    }

    #[test]
    fn refine_leaves_original_untouched() {
        let base = Orderings::new().refine(order(1, 2));
        let refined = base.refine(order(2, 3));
        assert!(!base.before(1, 3));
        assert!(refined.before(1, 3));
    }

    #[test]
    #[should_panic(expected = "cycle")]
    fn reverse_ordering_panics() {
        Orderings::new().refine(order(1, 2)).refine(order(2, 1));
    }
}
