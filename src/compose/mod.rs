//! Operators on linear processes: hiding, renaming, blocking, allowing,
//! communication and parallel composition.

pub mod comm;
pub mod parallel;

pub use parallel::parallel;

use crate::context::Context;
use crate::lpe::{Lpe, NextState, Summand, SummandAction};
use crate::summands::insert_summand;
use crate::term::{Action, CommRule, DataExpr, Ident, MultiAction, RenameRule};

/// Marks successful termination of an operand of a parallel composition.
pub const TERMINATE: &str = "Terminate";

/// Which multiactions a parallel composition may combine from one step of
/// each side, given the operators around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncContext {
    Unrestricted,
    /// Combined names must form a sub-multiset of one of these.
    Only(Vec<Vec<Ident>>),
}

impl SyncContext {
    pub fn top() -> Self {
        SyncContext::Only(vec![])
    }

    pub fn allow(sets: &[Vec<Ident>]) -> Self {
        SyncContext::Only(
            sets.iter()
                .map(|set| {
                    let mut set = set.clone();
                    set.sort();
                    set
                })
                .collect(),
        )
    }

    /// The context inside `comm(rules, _)` when `self` is the context
    /// outside.
    pub fn comm(&self, rules: &[CommRule]) -> Self {
        let SyncContext::Only(elements) = self else {
            return SyncContext::Unrestricted;
        };
        let mut out: Vec<Vec<Ident>> = rules.iter().map(|r| r.lhs.clone()).collect();
        for element in elements {
            for expanded in expand(element, rules) {
                if !out.contains(&expanded) {
                    out.push(expanded);
                }
            }
        }
        SyncContext::Only(out)
    }

    pub fn permits(&self, names: &[Ident]) -> bool {
        let names: Vec<&Ident> = names.iter().filter(|n| &***n != TERMINATE).collect();
        match self {
            SyncContext::Unrestricted => true,
            SyncContext::Only(_) if names.is_empty() => true,
            SyncContext::Only(elements) => elements.iter().any(|e| is_sub_multiset(&names, e)),
        }
    }
}

fn is_sub_multiset(names: &[&Ident], of: &[Ident]) -> bool {
    let mut remaining: Vec<&Ident> = of.iter().collect();
    for name in names {
        match remaining.iter().position(|r| r == name) {
            Some(i) => {
                remaining.swap_remove(i);
            }
            None => return false,
        }
    }
    true
}

/// Every way of replacing results of `rules` in `element` by their
/// left-hand sides.
fn expand(element: &[Ident], rules: &[CommRule]) -> Vec<Vec<Ident>> {
    let mut out: Vec<Vec<Ident>> = vec![vec![]];
    for name in element {
        let mut next = vec![];
        for prefix in &out {
            let mut kept = prefix.clone();
            kept.push(name.clone());
            next.push(kept);
            for rule in rules.iter().filter(|r| r.rhs == *name) {
                let mut replaced = prefix.clone();
                replaced.extend(rule.lhs.iter().cloned());
                next.push(replaced);
            }
        }
        out = next;
    }
    for e in &mut out {
        e.sort();
    }
    out
}

fn identity_state(lpe: &Lpe) -> NextState {
    NextState::State(lpe.params.iter().map(DataExpr::var).collect())
}

fn map_actions(lpe: Lpe, mut f: impl FnMut(Vec<Action>) -> Vec<Action>) -> Lpe {
    let summands = lpe
        .summands
        .into_iter()
        .map(|mut s| {
            if let SummandAction::Multi(m) = s.action {
                s.action = SummandAction::Multi(MultiAction::new(f(m.into_actions())));
            }
            s
        })
        .collect();
    Lpe { summands, ..lpe }
}

pub fn hide(lpe: Lpe, names: &[Ident]) -> Lpe {
    map_actions(lpe, |actions| {
        actions
            .into_iter()
            .filter(|a| &*a.name == TERMINATE || !names.contains(&a.name))
            .collect()
    })
}

pub fn rename(lpe: Lpe, rules: &[RenameRule]) -> Lpe {
    map_actions(lpe, |actions| {
        actions
            .into_iter()
            .map(|mut a| {
                if let Some(rule) = rules.iter().find(|r| r.from == a.name)
                    && &*a.name != TERMINATE
                {
                    a.name = rule.to.clone();
                }
                a
            })
            .collect()
    })
}

/// Keeps the summands `keep` accepts; a rejected timed summand still
/// bounds time and becomes a deadlock.
fn restrict(lpe: Lpe, keep: impl Fn(&MultiAction) -> bool) -> Lpe {
    let identity = identity_state(&lpe);
    let mut summands = vec![];
    for mut s in lpe.summands {
        let kept = match &s.action {
            SummandAction::Delta => true,
            SummandAction::Multi(m) => keep(m),
        };
        if kept {
            summands.push(s);
        } else if s.is_timed() {
            s.action = SummandAction::Delta;
            s.next = identity.clone();
            summands.push(s);
        }
    }
    Lpe { summands, ..lpe }
}

pub fn block(lpe: Lpe, names: &[Ident]) -> Lpe {
    restrict(lpe, |m| {
        !m.actions()
            .iter()
            .any(|a| &*a.name != TERMINATE && names.contains(&a.name))
    })
}

pub fn allow(lpe: Lpe, sets: &[Vec<Ident>]) -> Lpe {
    restrict(lpe, |m| {
        let mut names: Vec<Ident> = m
            .names()
            .into_iter()
            .filter(|n| &**n != TERMINATE)
            .collect();
        if names.is_empty() {
            return true;
        }
        names.sort();
        sets.iter().any(|set| {
            let mut set = set.clone();
            set.sort();
            set == names
        })
    })
}

/// Applies `rules` to every multiaction, splitting a summand into one
/// summand per way its actions can communicate.
pub fn communicate(ctx: &mut Context, lpe: Lpe, rules: &[CommRule]) -> Lpe {
    let mut summands: Vec<Summand> = vec![];
    for s in &lpe.summands {
        let SummandAction::Multi(m) = &s.action else {
            insert_summand(ctx, &mut summands, s.clone());
            continue;
        };
        for (condition, actions) in comm::alternatives(m.actions(), rules) {
            let condition = ctx.rewrite(&DataExpr::and(s.condition.clone(), condition));
            if condition.is_false() {
                continue;
            }
            let mut summand = Summand {
                condition,
                action: SummandAction::Multi(MultiAction::new(actions)),
                ..s.clone()
            };
            summand.prune_sum_vars();
            insert_summand(ctx, &mut summands, summand);
        }
    }
    log::debug!(
        "communication turned {} summands into {}",
        lpe.summands.len(),
        summands.len()
    );
    Lpe { summands, ..lpe }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::term::{Sort, Specification, Variable};

    fn ident(names: &[&str]) -> Vec<Ident> {
        names.iter().map(|n| Ident::from(*n)).collect()
    }

    fn step(names: &[&str], time: Option<DataExpr>) -> Summand {
        Summand {
            sum_vars: vec![],
            condition: DataExpr::Bool(true),
            action: SummandAction::Multi(MultiAction::new(
                names.iter().map(|n| Action::new(n, vec![])).collect(),
            )),
            time,
            next: NextState::State(vec![]),
        }
    }

    fn lpe(summands: Vec<Summand>) -> Lpe {
        Lpe {
            name: "P".into(),
            globals: vec![],
            params: vec![],
            summands,
            init: vec![],
        }
    }

    #[test]
    fn test_top_level_permits_nothing_but_single_steps() {
        let top = SyncContext::top();
        assert!(!top.permits(&ident(&["a", "b"])));
        assert!(top.permits(&ident(&[TERMINATE])));
        assert!(SyncContext::Unrestricted.permits(&ident(&["a", "b"])));
    }

    #[test]
    fn test_comm_inside_allow_expands_results() {
        let rules = vec![CommRule::new(&["a", "b"], "c")];
        let inner = SyncContext::allow(&[ident(&["c", "d"])]).comm(&rules);
        assert!(inner.permits(&ident(&["a", "b"])));
        assert!(inner.permits(&ident(&["b", "d"])));
        assert!(!inner.permits(&ident(&["a", "a"])));
    }

    #[test]
    fn test_hide_turns_actions_into_tau() {
        let hidden = hide(lpe(vec![step(&["a", "b"], None)]), &ident(&["a", "b"]));
        assert_eq!(hidden.summands[0].action, SummandAction::Multi(MultiAction::tau()));
    }

    #[test]
    fn test_block_drops_untimed_and_keeps_timed_as_deadlock() {
        let t = Variable::new("t", Sort::Real);
        let blocked = block(
            lpe(vec![
                step(&["a"], None),
                step(&["a"], Some(DataExpr::var(&t))),
                step(&["b"], None),
            ]),
            &ident(&["a"]),
        );
        assert_eq!(blocked.summands.len(), 2);
        assert!(blocked.summands[0].is_delta());
        assert!(blocked.summands[0].is_timed());
    }

    #[test]
    fn test_allow_matches_whole_multiactions() {
        let allowed = allow(
            lpe(vec![step(&["a", "b"], None), step(&["a"], None), step(&[], None)]),
            &[ident(&["b", "a"])],
        );
        assert_eq!(allowed.summands.len(), 2);
    }

    #[test]
    fn test_terminate_survives_renaming_and_blocking() {
        let out = rename(lpe(vec![step(&[TERMINATE], None)]), &[RenameRule {
            from: TERMINATE.into(),
            to: "x".into(),
        }]);
        let out = block(out, &ident(&[TERMINATE]));
        assert_eq!(out.summands.len(), 1);
        assert!(out.summands[0].action.multi().unwrap().contains_name(TERMINATE));
    }

    #[test]
    fn test_communication_replaces_the_pair() {
        let mut ctx = Context::new(Specification::new(), Options::default());
        let out = communicate(
            &mut ctx,
            lpe(vec![step(&["a", "b"], None)]),
            &[CommRule::new(&["a", "b"], "c")],
        );
        assert_eq!(out.summands.len(), 1);
        assert_eq!(out.summands[0].action.multi().unwrap().to_string(), "c");
    }
}
