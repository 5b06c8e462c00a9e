//! Runs the linearization stages in order.

use std::fmt;

use serde::Serialize;

use crate::classify::classify;
use crate::cluster::cluster;
use crate::compose::{self, SyncContext, TERMINATE};
use crate::context::{Context, Declarations};
use crate::error::{Result, Warning};
use crate::gnf;
use crate::lpe::Lpe;
use crate::options::Options;
use crate::state::StateLayout;
use crate::summands;
use crate::term::{
    DataExpr, FreeVars, ProcExpr, ProcId, Specification, Status, Substitute, Substitution,
    Variable,
};
use crate::termination;
use crate::validate::validate;

/// The result of a run: the LPE and everything generated for it.
#[derive(Debug, Clone, Serialize)]
pub struct Linearization {
    pub lpe: Lpe,
    pub declarations: Declarations,
    pub warnings: Vec<Warning>,
}

impl fmt::Display for Linearization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.declarations.is_empty() {
            writeln!(f, "{}", self.declarations)?;
        }
        write!(f, "{}", self.lpe)
    }
}

pub fn linearize(mut spec: Specification, options: Options) -> Result<Linearization> {
    options.check()?;
    let mut warnings = validate(&mut spec)?;
    let init = std::mem::take(&mut spec.init);

    let mut ctx = Context::new(spec, options);
    let pcrl = classify(&mut ctx.table, &init)?;
    termination::analyze(&mut ctx.table);
    let bodies: Vec<ProcExpr> = pcrl
        .iter()
        .map(|id| ctx.table.get(*id).body.clone())
        .chain(std::iter::once(init.clone()))
        .collect();
    gnf::set_sequence_limit(&mut ctx, &bodies);

    log::info!("linearizing {} pCRL equations", pcrl.len());
    let name = ctx.fresh("P");
    let mut lpe = term(&mut ctx, &init, &SyncContext::top(), false)?;
    if ctx.options.cluster {
        lpe = cluster(&mut ctx, lpe)?;
    }
    lpe.name = name;
    lpe.globals = ctx.global_vars().into_iter().collect();
    lpe.check_invariants()?;
    log::info!(
        "{} has {} parameters and {} summands",
        lpe.name,
        lpe.params.len(),
        lpe.summands.len()
    );

    warnings.append(&mut ctx.warnings);
    Ok(Linearization {
        lpe,
        declarations: ctx.decls,
        warnings,
    })
}

/// Linearizes `expr`; `in_merge` is set below a parallel composition.
fn term(ctx: &mut Context, expr: &ProcExpr, sync: &SyncContext, in_merge: bool) -> Result<Lpe> {
    match expr {
        ProcExpr::Merge(l, r) => {
            let left = operand(ctx, l, sync)?;
            let right = operand(ctx, r, sync)?;
            compose::parallel(ctx, left, right, sync)
        }
        ProcExpr::Hide(names, p) => {
            let lpe = term(ctx, p, &SyncContext::Unrestricted, in_merge)?;
            Ok(compose::hide(lpe, names))
        }
        ProcExpr::Rename(rules, p) => {
            let lpe = term(ctx, p, &SyncContext::Unrestricted, in_merge)?;
            Ok(compose::rename(lpe, rules))
        }
        ProcExpr::Allow(sets, p) => {
            let lpe = term(ctx, p, &SyncContext::allow(sets), in_merge)?;
            Ok(compose::allow(lpe, sets))
        }
        ProcExpr::Block(names, p) => {
            let lpe = term(ctx, p, sync, in_merge)?;
            Ok(compose::block(lpe, names))
        }
        ProcExpr::Comm(rules, p) => {
            let lpe = term(ctx, p, &sync.comm(rules), in_merge)?;
            Ok(compose::communicate(ctx, lpe, rules))
        }
        ProcExpr::Call(id, args) if ctx.table.get(*id).status == Some(Status::Mcrl) => {
            let eq = ctx.table.get(*id);
            let sigma = Substitution::from_pairs(eq.params.iter().zip(args));
            let body = eq.body.clone().substitute(&sigma, &mut ctx.names);
            term(ctx, &body, sync, in_merge)
        }
        _ => sequential(ctx, expr, in_merge),
    }
}

fn operand(ctx: &mut Context, expr: &ProcExpr, sync: &SyncContext) -> Result<Lpe> {
    let lpe = term(ctx, expr, sync, true)?;
    if ctx.options.no_cluster {
        Ok(lpe)
    } else {
        cluster(ctx, lpe)
    }
}

/// The process announcing that an operand of `||` is done, shared by every
/// operand that needs it.
fn terminated(ctx: &mut Context) -> ProcId {
    ctx.declare_action(TERMINATE, vec![]);
    ctx.add_process("Terminated", vec![], ProcExpr::action(TERMINATE, vec![]))
}

/// Linearizes a pCRL term through its normal form.
fn sequential(ctx: &mut Context, expr: &ProcExpr, in_merge: bool) -> Result<Lpe> {
    let expr = if in_merge && termination::can_terminate(&ctx.table, expr) {
        let done = terminated(ctx);
        ProcExpr::seq(expr.clone(), ProcExpr::call(done, vec![]))
    } else {
        expr.clone()
    };
    let (entry, args) = match expr {
        ProcExpr::Call(id, args) => (id, args),
        expr => {
            let globals = ctx.global_vars();
            let params: Vec<Variable> = expr
                .free_vars()
                .into_iter()
                .filter(|v| !globals.contains(v))
                .collect();
            let args: Vec<DataExpr> = params.iter().map(DataExpr::var).collect();
            (ctx.add_process("P", params, expr), args)
        }
    };

    gnf::transform(ctx, entry)?;
    termination::analyze(&mut ctx.table);
    let layout = StateLayout::allocate(ctx, entry)?;
    let summands = summands::collect(ctx, &layout)?;
    let init = layout.initial_state(ctx, &args)?;
    Ok(Lpe {
        name: ctx.table.get(entry).name.clone(),
        globals: ctx.global_vars().into_iter().collect(),
        params: layout.params,
        summands,
        init,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::term::{CommRule, Ident, Sort};

    fn a() -> ProcExpr {
        ProcExpr::action("a", vec![])
    }

    #[test]
    fn test_action_loop_has_one_summand() {
        let mut spec = Specification::new();
        spec.declare_action("a", vec![]);
        let p = spec.declare_process("P", vec![]);
        spec.define(p, ProcExpr::seq(a(), ProcExpr::call(p, vec![])));
        spec.init = ProcExpr::call(p, vec![]);
        let out = linearize(spec, Options::default()).unwrap();
        assert_eq!(out.lpe.summands.len(), 1);
        assert!(out.lpe.params.is_empty());
        assert!(out.declarations.is_empty());
    }

    #[test]
    fn test_binary_with_stack_is_rejected() {
        let options = Options {
            binary: true,
            regular: false,
            ..Options::default()
        };
        let result = linearize(Specification::new(), options);
        assert!(matches!(result, Err(Error::Encoding(_))));
    }

    #[test]
    fn test_merge_operands_that_terminate_synchronize_on_termination() {
        let mut spec = Specification::new();
        spec.declare_action("a", vec![]);
        spec.declare_action("b", vec![]);
        spec.init = ProcExpr::merge(a(), ProcExpr::action("b", vec![]));
        let out = linearize(spec, Options::default()).unwrap();
        let terminating: Vec<_> = out.lpe.summands.iter().filter(|s| s.is_terminating()).collect();
        assert_eq!(terminating.len(), 1);
        assert!(
            out.declarations
                .actions
                .iter()
                .any(|action| &*action.name == TERMINATE)
        );
        assert!(out.lpe.check_invariants().is_ok());
    }

    #[test]
    fn test_communication_in_a_merge() {
        let mut spec = Specification::new();
        let n = Variable::new("n", Sort::Nat);
        for name in ["s", "r", "c"] {
            spec.declare_action(name, vec![Sort::Nat]);
        }
        let p = spec.declare_process("P", vec![]);
        let q = spec.declare_process("Q", vec![]);
        spec.define(
            p,
            ProcExpr::seq(
                ProcExpr::action("s", vec![DataExpr::number(1, Sort::Nat)]),
                ProcExpr::call(p, vec![]),
            ),
        );
        spec.define(
            q,
            ProcExpr::sum(
                vec![n.clone()],
                ProcExpr::seq(
                    ProcExpr::action("r", vec![DataExpr::var(&n)]),
                    ProcExpr::call(q, vec![]),
                ),
            ),
        );
        spec.init = ProcExpr::allow(
            &[&["c"]],
            ProcExpr::comm(
                vec![CommRule::new(&["s", "r"], "c")],
                ProcExpr::merge(ProcExpr::call(p, vec![]), ProcExpr::call(q, vec![])),
            ),
        );
        let out = linearize(spec, Options::default()).unwrap();
        assert_eq!(out.lpe.summands.len(), 1);
        let summand = &out.lpe.summands[0];
        assert_eq!(summand.action.multi().unwrap().names(), vec![Ident::from("c")]);
        assert_eq!(summand.condition.to_string(), "n == 1");
    }
}
