//! Merges summands with the same action pattern into one summand per class.
//!
//! A class of `n` summands becomes `sum e: Enum_n. C(e, c1, ..., cn) -> ...`
//! where `C` is the case function of the enumeration; fields that agree
//! across the class are kept as they are.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::context::Context;
use crate::error::Result;
use crate::lpe::{Lpe, NextState, Summand, SummandAction};
use crate::term::{Action, DataExpr, Ident, MultiAction, Sort, Substitute, Substitution, Variable};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClassKey {
    signature: Option<Vec<(Ident, Vec<Sort>)>>,
    timed: bool,
    terminating: bool,
}

impl ClassKey {
    fn of(summand: &Summand) -> Self {
        Self {
            signature: summand.action.multi().map(MultiAction::signature),
            timed: summand.is_timed(),
            terminating: summand.is_terminating(),
        }
    }
}

pub fn cluster(ctx: &mut Context, lpe: Lpe) -> Result<Lpe> {
    let mut classes: IndexMap<ClassKey, Vec<Summand>> = IndexMap::new();
    for summand in lpe.summands {
        classes.entry(ClassKey::of(&summand)).or_default().push(summand);
    }
    let mut summands = Vec::with_capacity(classes.len());
    for (_, members) in classes {
        if members.len() == 1 {
            summands.extend(members);
        } else {
            summands.push(merge(ctx, members)?);
        }
    }
    log::info!("clustered {} into {} summands", lpe.name, summands.len());
    Ok(Lpe { summands, ..lpe })
}

struct Selector<'a> {
    ctx: &'a mut Context,
    var: Variable,
    n: usize,
}

impl Selector<'_> {
    /// One expression choosing the `i`-th of `fields` for the `i`-th member.
    fn select(&mut self, fields: Vec<DataExpr>, sort: &Sort) -> Result<DataExpr> {
        if fields.iter().all(|f| *f == fields[0]) {
            return Ok(fields.into_iter().next().unwrap_or(DataExpr::Bool(true)));
        }
        let case = self.ctx.case_function(self.n, sort)?;
        let mut args = vec![DataExpr::var(&self.var)];
        args.extend(fields);
        Ok(DataExpr::apply(&case, args))
    }
}

/// Gives every member its sum variables from shared per-sort slots.
fn share_sum_vars(ctx: &mut Context, members: Vec<Summand>) -> (Vec<Variable>, Vec<Summand>) {
    let mut slots: HashMap<Sort, Vec<Variable>> = HashMap::new();
    let mut order: Vec<Variable> = vec![];
    let mut renamed = Vec::with_capacity(members.len());
    for member in members {
        let mut used: HashMap<Sort, usize> = HashMap::new();
        let mut sigma = Substitution::new();
        for var in &member.sum_vars {
            let k = used.entry(var.sort.clone()).or_default();
            let slot = slots.entry(var.sort.clone()).or_default();
            if slot.len() == *k {
                let fresh = ctx.fresh_var(&var.name, var.sort.clone());
                slot.push(fresh.clone());
                order.push(fresh);
            }
            sigma.insert(var.clone(), DataExpr::var(&slot[*k]));
            *k += 1;
        }
        let names = &mut ctx.names;
        let mut member = member.map_data(&mut |e| e.substitute(&sigma, names));
        member.sum_vars.clear();
        renamed.push(member);
    }
    (order, renamed)
}

fn merge(ctx: &mut Context, members: Vec<Summand>) -> Result<Summand> {
    let n = members.len();
    let (shared, members) = share_sum_vars(ctx, members);
    let enumeration = ctx.enumerated_type(n)?;
    let var = ctx.fresh_var("e", enumeration.sort.clone());
    let first = members[0].clone();
    let mut selector = Selector {
        ctx: &mut *ctx,
        var: var.clone(),
        n,
    };

    let condition = selector.select(
        members.iter().map(|m| m.condition.clone()).collect(),
        &Sort::Bool,
    )?;

    let action = match &first.action {
        SummandAction::Delta => SummandAction::Delta,
        SummandAction::Multi(m) => {
            let mut actions = Vec::with_capacity(m.actions().len());
            for (j, a) in m.actions().iter().enumerate() {
                let mut args = Vec::with_capacity(a.args.len());
                for (k, arg) in a.args.iter().enumerate() {
                    let fields = members
                        .iter()
                        .filter_map(|s| s.action.multi())
                        .map(|m| m.actions()[j].args[k].clone())
                        .collect();
                    args.push(selector.select(fields, &arg.sort())?);
                }
                actions.push(Action {
                    name: a.name.clone(),
                    args,
                });
            }
            SummandAction::Multi(MultiAction::new(actions))
        }
    };

    let time = match &first.time {
        None => None,
        Some(_) => Some(selector.select(
            members.iter().filter_map(|s| s.time.clone()).collect(),
            &Sort::Real,
        )?),
    };

    let next = match &first.next {
        NextState::Terminated => NextState::Terminated,
        NextState::State(state) => {
            let mut values = Vec::with_capacity(state.len());
            for (i, value) in state.iter().enumerate() {
                let fields = members
                    .iter()
                    .map(|s| match &s.next {
                        NextState::State(values) => values[i].clone(),
                        NextState::Terminated => value.clone(),
                    })
                    .collect();
                values.push(selector.select(fields, &value.sort())?);
            }
            NextState::State(values)
        }
    };

    let mut sum_vars = vec![var];
    sum_vars.extend(shared);
    let mut summand = Summand {
        sum_vars,
        condition: ctx.rewrite(&condition),
        action,
        time,
        next,
    };
    summand.prune_sum_vars();
    log::debug!(
        "merged {n} summands into {}",
        summand
            .action
            .multi()
            .map_or_else(|| "delta".to_string(), ToString::to_string)
    );
    Ok(summand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::term::Specification;

    fn step(action: &str, arg: i64, next: i64) -> Summand {
        Summand {
            sum_vars: vec![],
            condition: DataExpr::Bool(true),
            action: SummandAction::Multi(MultiAction::single(Action::new(
                action,
                vec![DataExpr::number(arg, Sort::Nat)],
            ))),
            time: None,
            next: NextState::State(vec![DataExpr::number(next, Sort::Nat)]),
        }
    }

    fn lpe(summands: Vec<Summand>) -> Lpe {
        Lpe {
            name: "P".into(),
            globals: vec![],
            params: vec![Variable::new("n", Sort::Nat)],
            summands,
            init: vec![DataExpr::number(0, Sort::Nat)],
        }
    }

    #[test]
    fn test_same_action_summands_merge() {
        let mut ctx = Context::new(Specification::new(), Options::default());
        let summands = vec![step("a", 1, 2), step("a", 3, 2), step("b", 0, 0)];
        let out = cluster(&mut ctx, lpe(summands)).unwrap();
        assert_eq!(out.summands.len(), 2);
        let merged = &out.summands[0];
        assert_eq!(merged.sum_vars.len(), 1);
        assert_eq!(merged.sum_vars[0].sort, Sort::Bool);
        assert_eq!(merged.next, NextState::State(vec![DataExpr::number(2, Sort::Nat)]));
        assert!(out.check_invariants().is_ok());
    }

    #[test]
    fn test_clustering_is_idempotent() {
        let mut ctx = Context::new(Specification::new(), Options::default());
        let once = cluster(
            &mut ctx,
            lpe(vec![step("a", 1, 2), step("a", 3, 4), step("a", 5, 6), step("b", 0, 0)]),
        )
        .unwrap();
        let twice = cluster(&mut ctx, once.clone()).unwrap();
        assert_eq!(once.summands.len(), 2);
        assert_eq!(twice.summands.len(), once.summands.len());
        assert!(!ctx.decls.sorts.is_empty());
    }

    #[test]
    fn test_sum_variables_share_slots_per_sort() {
        let mut ctx = Context::new(Specification::new(), Options::default());
        let (d, e) = (Variable::new("d", Sort::Nat), Variable::new("e", Sort::Nat));
        let with_var = |v: &Variable| Summand {
            sum_vars: vec![v.clone()],
            condition: DataExpr::Bool(true),
            action: SummandAction::Multi(MultiAction::single(Action::new(
                "a",
                vec![DataExpr::var(v)],
            ))),
            time: None,
            next: NextState::State(vec![DataExpr::var(v)]),
        };
        let out = cluster(&mut ctx, lpe(vec![with_var(&d), with_var(&e)])).unwrap();
        assert_eq!(out.summands.len(), 1);
        // both members read the same slot, so the selector is unused
        assert_eq!(out.summands[0].sum_vars.len(), 1);
        assert_eq!(out.summands[0].sum_vars[0].sort, Sort::Nat);
    }
}
