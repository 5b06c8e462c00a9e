//! Reads the summands of an LPE off the normal forms of a process group.

use indexmap::IndexSet;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::gnf::{Gnf, Leaf};
use crate::lpe::{NextState, Summand, SummandAction};
use crate::state::StateLayout;
use crate::term::subst::alpha_convert;
use crate::term::{DataExpr, Substitute, Substitution, Variable};

pub fn collect(ctx: &mut Context, layout: &StateLayout) -> Result<Vec<Summand>> {
    let mut avoid: IndexSet<Variable> = ctx.global_vars();
    avoid.extend(layout.params.iter().cloned());

    let mut out = vec![];
    for id in &layout.members {
        let gnf = ctx.gnf.body(*id).cloned().ok_or_else(|| {
            Error::Consistency(format!(
                "process {} has no normal form",
                ctx.table.get(*id).name
            ))
        })?;
        let sigma = layout.param_substitution(ctx, *id);
        let gnf = gnf.substitute(&sigma, &mut ctx.names);
        let condition = layout.state_condition(*id)?;
        let mut walk = Walk {
            ctx: &mut *ctx,
            layout,
            out: &mut out,
        };
        walk.visit(gnf, vec![], condition, &avoid)?;
    }
    log::debug!("collected {} summands", out.len());
    Ok(out)
}

struct Walk<'a> {
    ctx: &'a mut Context,
    layout: &'a StateLayout,
    out: &'a mut Vec<Summand>,
}

impl Walk<'_> {
    fn visit(
        &mut self,
        gnf: Gnf,
        sum_vars: Vec<Variable>,
        condition: DataExpr,
        avoid: &IndexSet<Variable>,
    ) -> Result<()> {
        match gnf {
            Gnf::Choice(l, r) => {
                self.visit(*l, sum_vars.clone(), condition.clone(), avoid)?;
                self.visit(*r, sum_vars, condition, avoid)
            }
            Gnf::Cond(c, l, r) => {
                let negated = DataExpr::not(c.clone());
                self.visit(*l, sum_vars.clone(), DataExpr::and(condition.clone(), c), avoid)?;
                self.visit(*r, sum_vars, DataExpr::and(condition, negated), avoid)
            }
            Gnf::Sum(vars, body) => {
                let (vars, sigma) = alpha_convert(&vars, avoid, &mut self.ctx.names);
                let body = body.substitute(&sigma, &mut self.ctx.names);
                let mut inner = avoid.clone();
                inner.extend(vars.iter().cloned());
                let mut sum_vars = sum_vars;
                sum_vars.extend(vars);
                self.visit(body, sum_vars, condition, &inner)
            }
            Gnf::Leaf(leaf) => self.leaf(leaf, sum_vars, condition),
        }
    }

    fn leaf(&mut self, leaf: Leaf, sum_vars: Vec<Variable>, condition: DataExpr) -> Result<()> {
        let Some(action) = leaf.action else {
            // An untimed deadlock adds no behaviour.
            if leaf.time.is_some() {
                let summand = Summand {
                    sum_vars,
                    condition,
                    action: SummandAction::Delta,
                    time: leaf.time,
                    next: NextState::State(self.layout.identity()),
                };
                self.emit(summand);
            }
            return Ok(());
        };
        let action = SummandAction::Multi(action);

        if leaf.continuation.is_empty()
            && let Some((popped, stack)) = self.layout.popped()
        {
            let empty = stack.is_empty(popped.clone());
            self.emit(Summand {
                sum_vars: sum_vars.clone(),
                condition: DataExpr::and(condition.clone(), DataExpr::not(empty.clone())),
                action: action.clone(),
                time: leaf.time.clone(),
                next: NextState::State(vec![popped]),
            });
            self.emit(Summand {
                sum_vars,
                condition: DataExpr::and(condition, empty),
                action,
                time: leaf.time,
                next: NextState::Terminated,
            });
            return Ok(());
        }

        let next = self.layout.next_state(self.ctx, &leaf.continuation)?;
        self.emit(Summand {
            sum_vars,
            condition,
            action,
            time: leaf.time,
            next,
        });
        Ok(())
    }

    fn emit(&mut self, summand: Summand) {
        let ctx = &*self.ctx;
        let mut summand = summand.map_data(&mut |e| ctx.rewrite(e));
        if summand.condition.is_false() {
            return;
        }
        summand.prune_sum_vars();
        insert_summand(self.ctx, self.out, summand);
    }
}

/// Adds `summand`, or widens the condition of an existing summand that
/// differs from it only in its condition and the names of its sum
/// variables.
pub fn insert_summand(ctx: &mut Context, summands: &mut Vec<Summand>, summand: Summand) {
    for existing in summands.iter_mut() {
        if existing.sum_vars.len() != summand.sum_vars.len()
            || existing
                .sum_vars
                .iter()
                .zip(&summand.sum_vars)
                .any(|(a, b)| a.sort != b.sort)
        {
            continue;
        }
        let mut sigma = Substitution::new();
        for (theirs, ours) in existing.sum_vars.iter().zip(&summand.sum_vars) {
            sigma.insert(ours.clone(), DataExpr::var(theirs));
        }
        let names = &mut ctx.names;
        let renamed = summand.map_data(&mut |e| e.substitute(&sigma, names));
        if renamed.action == existing.action
            && renamed.time == existing.time
            && renamed.next == existing.next
        {
            let widened = DataExpr::or(existing.condition.clone(), renamed.condition);
            existing.condition = ctx.rewrite(&widened);
            return;
        }
    }
    summands.push(summand);
}
