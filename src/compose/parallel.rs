//! Parallel composition of two linear processes.

use indexmap::IndexSet;

use crate::compose::{SyncContext, TERMINATE};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::lpe::{Lpe, NextState, Summand, SummandAction};
use crate::summands::insert_summand;
use crate::term::{
    DataEquation, DataExpr, MultiAction, OpId, Sort, Substitute, Substitution, Variable,
};

/// `left || right`. Steps of one side leave the parameters of the other
/// unchanged; pairs of steps the context permits are combined into one
/// multiaction.
pub fn parallel(ctx: &mut Context, left: Lpe, right: Lpe, sync: &SyncContext) -> Result<Lpe> {
    let right = rename_params(ctx, right, &left.params);

    let left_params: IndexSet<Variable> = left.params.iter().cloned().collect();
    let right_params: IndexSet<Variable> = right.params.iter().cloned().collect();
    let lefts: Vec<Summand> = left
        .summands
        .iter()
        .map(|s| s.avoid_names(&right_params, &mut ctx.names))
        .collect();
    let rights: Vec<Summand> = right
        .summands
        .iter()
        .map(|s| s.avoid_names(&left_params, &mut ctx.names))
        .collect();

    let left_delay = ultimate_delay(ctx, &left)?;
    let right_delay = ultimate_delay(ctx, &right)?;

    let mut summands = vec![];
    for s in &lefts {
        if let Some(step) = independent(ctx, s, &right, right_delay.as_ref(), Side::Left)? {
            insert_summand(ctx, &mut summands, step);
        }
    }
    for s in &rights {
        if let Some(step) = independent(ctx, s, &left, left_delay.as_ref(), Side::Right)? {
            insert_summand(ctx, &mut summands, step);
        }
    }
    for l in &lefts {
        for r in &rights {
            if let Some(step) = synchronize(ctx, l, r, sync)? {
                insert_summand(ctx, &mut summands, step);
            }
        }
    }

    let mut globals = left.globals.clone();
    for g in &right.globals {
        if !globals.contains(g) {
            globals.push(g.clone());
        }
    }
    let mut params = left.params;
    params.extend(right.params);
    let mut init = left.init;
    init.extend(right.init);
    log::info!(
        "parallel composition: {} summands, {} parameters",
        summands.len(),
        params.len()
    );
    Ok(Lpe {
        name: left.name,
        globals,
        params,
        summands,
        init,
    })
}

/// Renames parameters of `lpe` whose names occur in `taken`.
fn rename_params(ctx: &mut Context, lpe: Lpe, taken: &[Variable]) -> Lpe {
    let mut sigma = Substitution::new();
    let params: Vec<Variable> = lpe
        .params
        .iter()
        .map(|p| {
            if taken.iter().any(|t| t.name == p.name) {
                let fresh = ctx.fresh_var(&p.name, p.sort.clone());
                sigma.insert(p.clone(), DataExpr::var(&fresh));
                fresh
            } else {
                p.clone()
            }
        })
        .collect();
    if sigma.is_empty() {
        return lpe;
    }
    let summands = lpe
        .summands
        .iter()
        .map(|s| s.substitute(&sigma, &mut ctx.names))
        .collect();
    Lpe {
        params,
        summands,
        ..lpe
    }
}

/// A mapping `ud(params, t)` that holds when `lpe` can still act at time
/// `t` or later. Only needed when `lpe` has timed summands.
fn ultimate_delay(ctx: &mut Context, lpe: &Lpe) -> Result<Option<OpId>> {
    if !lpe.has_timed_summands() {
        return Ok(None);
    }
    let t = ctx.fresh_var("t", Sort::Real);
    let mut domain = lpe.param_sorts();
    domain.push(Sort::Real);
    let op = OpId::new(&ctx.fresh("ud"), domain, Sort::Bool);
    ctx.declare_mapping(op.clone());

    let rhs = DataExpr::disjunction(lpe.summands.iter().map(|s| {
        let enabled = match &s.time {
            None => s.condition.clone(),
            Some(time) => DataExpr::and(
                s.condition.clone(),
                DataExpr::less_eq(DataExpr::var(&t), time.clone()),
            ),
        };
        DataExpr::exists(s.sum_vars.clone(), enabled)
    }));
    let mut vars = lpe.params.clone();
    vars.push(t.clone());
    let mut args: Vec<DataExpr> = lpe.params.iter().map(DataExpr::var).collect();
    args.push(DataExpr::var(&t));
    ctx.add_equation(DataEquation::new(vars, DataExpr::apply(&op, args), rhs));
    Ok(Some(op))
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

fn is_terminate(s: &Summand) -> bool {
    s.action.multi().is_some_and(|m| m.contains_name(TERMINATE))
}

/// A step of one side; `other` keeps its state and, when it has deadlines,
/// must not have passed them.
fn independent(
    ctx: &mut Context,
    s: &Summand,
    other: &Lpe,
    delay: Option<&OpId>,
    side: Side,
) -> Result<Option<Summand>> {
    if is_terminate(s) {
        return Ok(None);
    }
    let NextState::State(next) = &s.next else {
        return Err(Error::Consistency(format!(
            "summand {} terminates inside a parallel composition",
            s.action.multi().map(ToString::to_string).unwrap_or_default()
        )));
    };
    let unchanged = other.params.iter().map(DataExpr::var);
    let next = match side {
        Side::Left => next.iter().cloned().chain(unchanged).collect(),
        Side::Right => unchanged.chain(next.iter().cloned()).collect(),
    };
    let mut step = Summand {
        next: NextState::State(next),
        ..s.clone()
    };
    if let Some(ud) = delay {
        let time = match &step.time {
            Some(time) => time.clone(),
            None => {
                let t = ctx.fresh_var("t", Sort::Real);
                step.sum_vars.push(t.clone());
                step.time = Some(DataExpr::var(&t));
                DataExpr::var(&t)
            }
        };
        let mut args: Vec<DataExpr> = other.params.iter().map(DataExpr::var).collect();
        args.push(time);
        step.condition = DataExpr::and(step.condition, DataExpr::apply(ud, args));
    }
    step.condition = ctx.rewrite(&step.condition);
    Ok((!step.condition.is_false()).then_some(step))
}

/// One step of each side taken together.
fn synchronize(
    ctx: &mut Context,
    l: &Summand,
    r: &Summand,
    sync: &SyncContext,
) -> Result<Option<Summand>> {
    let (SummandAction::Multi(lm), SummandAction::Multi(rm)) = (&l.action, &r.action) else {
        return Ok(None);
    };
    let (l_term, r_term) = (lm.contains_name(TERMINATE), rm.contains_name(TERMINATE));
    if l_term != r_term {
        return Ok(None);
    }
    let mut action = lm.union(rm);
    if l_term {
        let mut actions = action.into_actions();
        if let Some(i) = actions.iter().position(|a| &*a.name == TERMINATE) {
            actions.remove(i);
        }
        action = MultiAction::new(actions);
    } else if !sync.permits(&action.names()) {
        return Ok(None);
    }

    let mut avoid: IndexSet<Variable> = l.sum_vars.iter().cloned().collect();
    avoid.extend(l.body_free_vars());
    let r = r.avoid_names(&avoid, &mut ctx.names);

    let next = match (&l.next, &r.next) {
        (NextState::State(a), NextState::State(b)) => {
            NextState::State(a.iter().chain(b).cloned().collect())
        }
        (NextState::Terminated, NextState::Terminated) => NextState::Terminated,
        _ if l_term => return Ok(None),
        _ => {
            return Err(Error::Consistency(format!(
                "summand {action} terminates inside a parallel composition"
            )));
        }
    };
    let mut condition = DataExpr::and(l.condition.clone(), r.condition.clone());
    let time = match (&l.time, &r.time) {
        (Some(a), Some(b)) => {
            condition = DataExpr::and(condition, DataExpr::equal(a.clone(), b.clone()));
            Some(a.clone())
        }
        (a, b) => a.clone().or_else(|| b.clone()),
    };
    let condition = ctx.rewrite(&condition);
    if condition.is_false() {
        return Ok(None);
    }
    let mut sum_vars = l.sum_vars.clone();
    sum_vars.extend(r.sum_vars.iter().cloned());
    Ok(Some(Summand {
        sum_vars,
        condition,
        action: SummandAction::Multi(action),
        time,
        next,
    }))
}
