use linearize::compose::comm::alternatives;
use linearize::term::{Action, CommRule, DataExpr, MultiAction, Sort, Specification, Variable};
use linearize::{
    Context, Lpe, NextState, Options, Rewriter, Simplifier, Summand, SummandAction, cluster,
};
use proptest::prelude::*;

const NAMES: [&str; 3] = ["a", "b", "c"];

fn arb_actions() -> impl Strategy<Value = Vec<Action>> {
    proptest::collection::vec((0..NAMES.len(), 0..3i64), 0..5).prop_map(|items| {
        items
            .into_iter()
            .map(|(name, value)| Action::new(NAMES[name], vec![DataExpr::number(value, Sort::Nat)]))
            .collect()
    })
}

fn arb_summands() -> impl Strategy<Value = Vec<Summand>> {
    proptest::collection::vec((0..NAMES.len(), 0..4i64, 0..4i64), 1..8).prop_map(|items| {
        items
            .into_iter()
            .map(|(name, arg, next)| Summand {
                sum_vars: vec![],
                condition: DataExpr::Bool(true),
                action: SummandAction::Multi(MultiAction::single(Action::new(
                    NAMES[name],
                    vec![DataExpr::number(arg, Sort::Nat)],
                ))),
                time: None,
                next: NextState::State(vec![DataExpr::number(next, Sort::Nat)]),
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn test_communication_alternatives_partition(actions in arb_actions()) {
        let rules = vec![CommRule::new(&["a", "b"], "c"), CommRule::new(&["c", "c"], "a")];
        let simplifier = Simplifier::default();
        let holding = alternatives(&actions, &rules)
            .into_iter()
            .map(|(guard, _)| simplifier.rewrite(&guard))
            .filter(DataExpr::is_true)
            .count();
        prop_assert_eq!(holding, 1);
    }

    #[test]
    fn test_clustering_is_idempotent(summands in arb_summands()) {
        let mut ctx = Context::new(Specification::new(), Options::default());
        let lpe = Lpe {
            name: "P".into(),
            globals: vec![],
            params: vec![Variable::new("n", Sort::Nat)],
            summands,
            init: vec![DataExpr::number(0, Sort::Nat)],
        };
        let once = cluster(&mut ctx, lpe).unwrap();
        let twice = cluster(&mut ctx, once.clone()).unwrap();
        prop_assert_eq!(once.summands.len(), twice.summands.len());
        prop_assert!(once.summands.len() <= NAMES.len());
        prop_assert!(twice.check_invariants().is_ok());
    }
}
