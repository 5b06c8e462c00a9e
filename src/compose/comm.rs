//! Partitioning a multiaction by a communication table.

use crate::compose::TERMINATE;
use crate::term::{Action, CommRule, DataExpr, Ident};

/// A guard and the actions that result under it.
pub type Alternative = (DataExpr, Vec<Action>);

/// The ways `actions` communicate under `rules`. The guards are mutually
/// exclusive and together cover every valuation; a group of actions
/// communicates whenever its arguments agree.
pub fn alternatives(actions: &[Action], rules: &[CommRule]) -> Vec<Alternative> {
    let Some((first, rest)) = actions.split_first() else {
        return vec![(DataExpr::Bool(true), vec![])];
    };
    let mut out = vec![];
    let mut excluded: Vec<DataExpr> = vec![];

    if &*first.name != TERMINATE {
        for rule in rules.iter().filter(|r| r.lhs.contains(&first.name)) {
            for partners in partner_sets(first, rest, rule) {
                let agree = DataExpr::conjunction(partners.iter().flat_map(|i| {
                    first
                        .args
                        .iter()
                        .zip(&rest[*i].args)
                        .map(|(x, y)| DataExpr::equal(x.clone(), y.clone()))
                }));
                let guard = DataExpr::conjunction(
                    excluded.iter().cloned().chain(std::iter::once(agree.clone())),
                );
                if !guard.is_false() {
                    let remaining: Vec<Action> = rest
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| !partners.contains(i))
                        .map(|(_, a)| a.clone())
                        .collect();
                    for (condition, mut result) in alternatives(&remaining, rules) {
                        if &*rule.rhs != "tau" {
                            result.push(Action {
                                name: rule.rhs.clone(),
                                args: first.args.clone(),
                            });
                        }
                        out.push((DataExpr::and(guard.clone(), condition), result));
                    }
                }
                excluded.push(DataExpr::not(agree));
            }
        }
    }

    let guard = DataExpr::conjunction(excluded);
    if !guard.is_false() {
        for (condition, mut result) in alternatives(rest, rules) {
            result.insert(0, first.clone());
            out.push((DataExpr::and(guard.clone(), condition), result));
        }
    }
    out
}

/// Positions in `rest` that complete `first` to the left-hand side of
/// `rule`.
fn partner_sets(first: &Action, rest: &[Action], rule: &CommRule) -> Vec<Vec<usize>> {
    let mut needed = rule.lhs.clone();
    let Some(pos) = needed.iter().position(|n| *n == first.name) else {
        return vec![];
    };
    needed.remove(pos);
    let mut out = vec![];
    choose(rest, first.args.len(), &mut needed, 0, &mut vec![], &mut out);
    out
}

fn choose(
    rest: &[Action],
    arity: usize,
    needed: &mut Vec<Ident>,
    from: usize,
    picked: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if needed.is_empty() {
        out.push(picked.clone());
        return;
    }
    for i in from..rest.len() {
        if rest[i].args.len() != arity || &*rest[i].name == TERMINATE {
            continue;
        }
        if let Some(pos) = needed.iter().position(|n| *n == rest[i].name) {
            let name = needed.remove(pos);
            picked.push(i);
            choose(rest, arity, needed, i + 1, picked, out);
            picked.pop();
            needed.insert(pos, name);
        }
    }
}
