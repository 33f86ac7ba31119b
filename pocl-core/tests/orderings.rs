use std::collections::BTreeSet;

use pocl_core::plan::{Orderings, Ordering, Reason, GOAL_ID, INIT_ID};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

const MAX_ID: usize = 8;

fn naive_closure(edges: &[(usize, usize)]) -> BTreeSet<(usize, usize)> {
    let mut reach = [[false; MAX_ID + 1]; MAX_ID + 1];
    for &(u, v) in edges {
        reach[u][v] = true;
    }
    for k in 1..=MAX_ID {
        for i in 1..=MAX_ID {
            for j in 1..=MAX_ID {
                if reach[i][k] && reach[k][j] {
                    reach[i][j] = true;
                }
            }
        }
    }
    let mut pairs = BTreeSet::new();
    for i in 1..=MAX_ID {
        for j in 1..=MAX_ID {
            if reach[i][j] {
                pairs.insert((i, j));
            }
        }
    }
    pairs
}

/// Applies every candidate edge that keeps the order acyclic.
fn build(candidates: &[(usize, usize)]) -> (Orderings, Vec<(usize, usize)>) {
    let mut orderings = Orderings::new();
    let mut accepted = Vec::new();
    for &(u, v) in candidates {
        if orderings.possibly_before(u, v) {
            orderings = orderings.refine(Ordering::new(u, v, Reason::Establish));
            accepted.push((u, v));
        }
    }
    (orderings, accepted)
}

fn arb_edges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((1..=MAX_ID, 1..=MAX_ID), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig {
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn closure_matches_naive_transitive_closure(edges in arb_edges()) {
        let (orderings, accepted) = build(&edges);
        let expected = naive_closure(&accepted);
        let actual: BTreeSet<(usize, usize)> = orderings.closure().into_iter().collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn relations_stay_consistent(edges in arb_edges()) {
        let (orderings, _) = build(&edges);
        for a in 1..=MAX_ID {
            prop_assert!(orderings.before(INIT_ID, a));
            prop_assert!(orderings.before(a, GOAL_ID));
            for b in 1..=MAX_ID {
                prop_assert_eq!(orderings.before(a, b), orderings.after(b, a));
                // never cyclic
                prop_assert!(!(orderings.before(a, b) && orderings.before(b, a)));
                if a != b {
                    prop_assert_eq!(orderings.possibly_before(a, b), !orderings.after(a, b));
                    prop_assert_eq!(orderings.possibly_after(a, b), !orderings.before(a, b));
                } else {
                    prop_assert!(!orderings.possibly_before(a, b));
                }
            }
        }
    }

    #[test]
    fn refinement_never_changes_parent(edges in arb_edges(), extra in (1..=MAX_ID, 1..=MAX_ID)) {
        let (orderings, _) = build(&edges);
        let before = orderings.closure();
        if orderings.possibly_before(extra.0, extra.1) {
            let refined = orderings.refine(Ordering::new(extra.0, extra.1, Reason::Promote));
            prop_assert!(refined.before(extra.0, extra.1));
            prop_assert_eq!(refined.len(), orderings.len() + 1);
        }
        prop_assert_eq!(orderings.closure(), before);
    }
}
