//! Greibach normal form of pCRL bodies.
//!
//! Every path of a normalized body ends in a [`Leaf`]: deadlock, a possibly
//! timed multiaction, or a multiaction followed by a sequence of process
//! references. References at the head of a body are replaced by the normal
//! form of the referenced body; references behind an action stay references.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexSet;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::term::subst::alpha_convert;
use crate::term::{
    Action, DataExpr, FreeVars, MultiAction, NameGen, ProcExpr, ProcId, Substitute, Substitution,
    Variable,
};
use crate::termination;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Continuation {
    pub proc: ProcId,
    pub args: Vec<DataExpr>,
}

impl Continuation {
    pub fn call(&self) -> ProcExpr {
        ProcExpr::call(self.proc, self.args.clone())
    }
}

/// `action @ time . continuation`; no action means deadlock and no
/// continuation means successful termination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Leaf {
    pub action: Option<MultiAction>,
    pub time: Option<DataExpr>,
    pub continuation: Vec<Continuation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Gnf {
    Choice(Box<Gnf>, Box<Gnf>),
    Cond(DataExpr, Box<Gnf>, Box<Gnf>),
    Sum(Vec<Variable>, Box<Gnf>),
    Leaf(Leaf),
}

impl Gnf {
    pub fn delta() -> Self {
        Gnf::Leaf(Leaf {
            action: None,
            time: None,
            continuation: vec![],
        })
    }

    pub fn action(action: MultiAction) -> Self {
        Gnf::Leaf(Leaf {
            action: Some(action),
            time: None,
            continuation: vec![],
        })
    }

    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = vec![];
        let mut stack = vec![self];
        while let Some(g) = stack.pop() {
            match g {
                Gnf::Choice(l, r) | Gnf::Cond(_, l, r) => {
                    stack.push(r);
                    stack.push(l);
                }
                Gnf::Sum(_, body) => stack.push(body),
                Gnf::Leaf(leaf) => out.push(leaf),
            }
        }
        out
    }

    /// Processes referenced behind an action, in order of occurrence.
    pub fn successors(&self) -> Vec<ProcId> {
        let mut out: IndexSet<ProcId> = IndexSet::new();
        for leaf in self.leaves() {
            out.extend(leaf.continuation.iter().map(|c| c.proc));
        }
        out.into_iter().collect()
    }
}

impl Substitute for Continuation {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self {
        Continuation {
            proc: self.proc,
            args: self.args.substitute(sigma, names),
        }
    }
}

impl FreeVars for Continuation {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>) {
        self.args.collect_free_vars(out);
    }
}

impl Substitute for Gnf {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self {
        if sigma.is_empty() {
            return self.clone();
        }
        match self {
            Gnf::Choice(l, r) => Gnf::Choice(
                Box::new(l.substitute(sigma, names)),
                Box::new(r.substitute(sigma, names)),
            ),
            Gnf::Cond(c, l, r) => Gnf::Cond(
                c.substitute(sigma, names),
                Box::new(l.substitute(sigma, names)),
                Box::new(r.substitute(sigma, names)),
            ),
            Gnf::Sum(vars, body) => {
                let (vars, inner) = sigma.enter_binder(vars, names);
                Gnf::Sum(vars, Box::new(body.substitute(&inner, names)))
            }
            Gnf::Leaf(leaf) => Gnf::Leaf(Leaf {
                action: leaf.action.substitute(sigma, names),
                time: leaf.time.substitute(sigma, names),
                continuation: leaf.continuation.substitute(sigma, names),
            }),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct GnfCache {
    bodies: HashMap<ProcId, Gnf>,
    in_progress: HashSet<ProcId>,
    /// Members of each equation generated for a folded sequence, expressed
    /// over that equation's parameters.
    folded: HashMap<ProcId, Vec<Continuation>>,
    by_members: HashMap<Vec<ProcId>, ProcId>,
    sequence_limit: usize,
}

impl GnfCache {
    pub fn body(&self, id: ProcId) -> Option<&Gnf> {
        self.bodies.get(&id)
    }
}

/// Bounds the length of continuation sequences in regular mode by the number
/// of sequential compositions in `bodies`, plus one. Each operand of `||`
/// counts once more, for the termination that may follow it.
pub fn set_sequence_limit<'a>(ctx: &mut Context, bodies: impl IntoIterator<Item = &'a ProcExpr>) {
    let mut count = 0;
    for body in bodies {
        body.for_each(&mut |node| match node {
            ProcExpr::Seq(..) => count += 1,
            ProcExpr::Merge(..) => count += 2,
            _ => {}
        });
    }
    ctx.gnf.sequence_limit = count + 1;
}

/// Normalizes `entry` and every process reachable from it through
/// continuations.
pub fn transform(ctx: &mut Context, entry: ProcId) -> Result<()> {
    termination::analyze(&mut ctx.table);
    let mut queue = VecDeque::from([entry]);
    let mut seen = HashSet::from([entry]);
    while let Some(id) = queue.pop_front() {
        let gnf = gnf_of(ctx, id)?;
        for next in gnf.successors() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    log::debug!(
        "normal form of {} covers {} processes",
        ctx.table.get(entry).name,
        seen.len()
    );
    Ok(())
}

fn gnf_of(ctx: &mut Context, id: ProcId) -> Result<Gnf> {
    if let Some(gnf) = ctx.gnf.bodies.get(&id) {
        return Ok(gnf.clone());
    }
    if !ctx.gnf.in_progress.insert(id) {
        return Err(Error::Guardedness(format!(
            "process {} is recursive without a preceding action",
            ctx.table.get(id).name
        )));
    }
    let body = ctx.table.get(id).body.clone();
    let gnf = head(ctx, &body)?;
    ctx.gnf.in_progress.remove(&id);
    ctx.gnf.bodies.insert(id, gnf.clone());
    Ok(gnf)
}

fn head(ctx: &mut Context, expr: &ProcExpr) -> Result<Gnf> {
    match expr {
        ProcExpr::Delta => Ok(Gnf::delta()),
        ProcExpr::Tau => Ok(Gnf::action(MultiAction::tau())),
        ProcExpr::Action(a) => Ok(Gnf::action(MultiAction::single(a.clone()))),
        ProcExpr::Sync(..) => {
            let mut actions = vec![];
            if sync_actions(expr, &mut actions)? {
                Ok(Gnf::action(MultiAction::new(actions)))
            } else {
                Ok(Gnf::delta())
            }
        }
        ProcExpr::Choice(l, r) => Ok(Gnf::Choice(
            Box::new(head(ctx, l)?),
            Box::new(head(ctx, r)?),
        )),
        ProcExpr::Cond(c, l, r) => Ok(Gnf::Cond(
            c.clone(),
            Box::new(head(ctx, l)?),
            Box::new(head(ctx, r)?),
        )),
        ProcExpr::Sum(vars, body) => Ok(Gnf::Sum(vars.clone(), Box::new(head(ctx, body)?))),
        ProcExpr::At(p, t) => {
            let gnf = head(ctx, p)?;
            at(ctx, gnf, t)
        }
        ProcExpr::Seq(l, r) => {
            let gnf = head(ctx, l)?;
            let continuation = later(ctx, r)?;
            put_behind(ctx, gnf, &continuation)
        }
        ProcExpr::Call(id, args) => {
            let gnf = gnf_of(ctx, *id)?;
            let params = ctx.table.get(*id).params.clone();
            let sigma = Substitution::from_pairs(params.iter().zip(args));
            Ok(gnf.substitute(&sigma, &mut ctx.names))
        }
        _ => Err(Error::Structural(format!(
            "operator cannot occur in a pCRL process: {expr}"
        ))),
    }
}

/// Flattens a synchronization of actions; `false` when it contains `delta`.
fn sync_actions(expr: &ProcExpr, out: &mut Vec<Action>) -> Result<bool> {
    match expr {
        ProcExpr::Tau => Ok(true),
        ProcExpr::Delta => Ok(false),
        ProcExpr::Action(a) => {
            out.push(a.clone());
            Ok(true)
        }
        ProcExpr::Sync(l, r) => {
            let left = sync_actions(l, out)?;
            let right = sync_actions(r, out)?;
            Ok(left && right)
        }
        _ => Err(Error::Structural(format!(
            "synchronization of a non-action process: {expr}"
        ))),
    }
}

fn at(ctx: &mut Context, gnf: Gnf, t: &DataExpr) -> Result<Gnf> {
    Ok(match gnf {
        Gnf::Choice(l, r) => Gnf::Choice(Box::new(at(ctx, *l, t)?), Box::new(at(ctx, *r, t)?)),
        Gnf::Cond(c, l, r) => Gnf::Cond(c, Box::new(at(ctx, *l, t)?), Box::new(at(ctx, *r, t)?)),
        Gnf::Sum(vars, body) => {
            let (vars, body) = rename_bound(ctx, &vars, *body, &t.free_vars());
            Gnf::Sum(vars, Box::new(at(ctx, body, t)?))
        }
        Gnf::Leaf(mut leaf) => match leaf.time.replace(t.clone()) {
            None => Gnf::Leaf(leaf),
            Some(u) => Gnf::Cond(
                DataExpr::equal(u, t.clone()),
                Box::new(Gnf::Leaf(leaf)),
                Box::new(Gnf::delta()),
            ),
        },
    })
}

fn rename_bound(
    ctx: &mut Context,
    vars: &[Variable],
    body: Gnf,
    avoid: &IndexSet<Variable>,
) -> (Vec<Variable>, Gnf) {
    let (vars, sigma) = alpha_convert(vars, avoid, &mut ctx.names);
    let body = body.substitute(&sigma, &mut ctx.names);
    (vars, body)
}

/// The process references standing for `expr` behind an action.
fn later(ctx: &mut Context, expr: &ProcExpr) -> Result<Vec<Continuation>> {
    match expr {
        ProcExpr::Call(id, args) => Ok(vec![Continuation {
            proc: *id,
            args: args.clone(),
        }]),
        ProcExpr::Seq(l, r) => {
            let mut sequence = later(ctx, l)?;
            sequence.extend(later(ctx, r)?);
            Ok(sequence)
        }
        _ => {
            let globals = ctx.global_vars();
            let params: Vec<Variable> = expr
                .free_vars()
                .into_iter()
                .filter(|v| !globals.contains(v))
                .collect();
            let args = params.iter().map(DataExpr::var).collect();
            let proc = add_process(ctx, "P", params, expr.clone());
            Ok(vec![Continuation { proc, args }])
        }
    }
}

fn put_behind(ctx: &mut Context, gnf: Gnf, continuation: &[Continuation]) -> Result<Gnf> {
    Ok(match gnf {
        Gnf::Choice(l, r) => Gnf::Choice(
            Box::new(put_behind(ctx, *l, continuation)?),
            Box::new(put_behind(ctx, *r, continuation)?),
        ),
        Gnf::Cond(c, l, r) => Gnf::Cond(
            c,
            Box::new(put_behind(ctx, *l, continuation)?),
            Box::new(put_behind(ctx, *r, continuation)?),
        ),
        Gnf::Sum(vars, body) => {
            let (vars, body) = rename_bound(ctx, &vars, *body, &continuation.free_vars());
            Gnf::Sum(vars, Box::new(put_behind(ctx, body, continuation)?))
        }
        Gnf::Leaf(leaf) if leaf.action.is_none() => Gnf::Leaf(leaf),
        Gnf::Leaf(mut leaf) => {
            let mut sequence = std::mem::take(&mut leaf.continuation);
            sequence.extend(continuation.iter().cloned());
            leaf.continuation = fold(ctx, reachable_prefix(ctx, sequence))?;
            Gnf::Leaf(leaf)
        }
    })
}

/// Drops the members behind the first one that can never terminate.
fn reachable_prefix(ctx: &Context, mut sequence: Vec<Continuation>) -> Vec<Continuation> {
    if let Some(pos) = sequence
        .iter()
        .position(|c| !ctx.table.get(c.proc).can_terminate)
    {
        sequence.truncate(pos + 1);
    }
    sequence
}

/// Adds a generated equation and refreshes the termination flags.
fn add_process(ctx: &mut Context, hint: &str, params: Vec<Variable>, body: ProcExpr) -> ProcId {
    let proc = ctx.add_process(hint, params, body);
    termination::analyze(&mut ctx.table);
    proc
}

/// Expands references to folded sequences into their members.
fn flatten(ctx: &mut Context, sequence: Vec<Continuation>) -> Vec<Continuation> {
    let mut out = vec![];
    for c in sequence {
        match ctx.gnf.folded.get(&c.proc).cloned() {
            Some(members) => {
                let params = ctx.table.get(c.proc).params.clone();
                let sigma = Substitution::from_pairs(params.iter().zip(&c.args));
                let members = members.substitute(&sigma, &mut ctx.names);
                out.extend(flatten(ctx, members));
            }
            None => out.push(c),
        }
    }
    out
}

/// In regular mode, replaces a sequence of references by one reference to a
/// generated equation for the whole sequence.
fn fold(ctx: &mut Context, sequence: Vec<Continuation>) -> Result<Vec<Continuation>> {
    if !ctx.options.regular || sequence.len() <= 1 {
        return Ok(sequence);
    }
    let members = flatten(ctx, sequence);
    let members = reachable_prefix(ctx, members);
    if members.len() <= 1 {
        return Ok(members);
    }
    if members.len() > ctx.gnf.sequence_limit {
        return Err(Error::Encoding(format!(
            "the process is not regular: a sequence of {} processes arises; use the stack encoding",
            members.len()
        )));
    }
    let hint = members
        .iter()
        .map(|c| ctx.table.get(c.proc).name.to_string())
        .collect::<Vec<_>>()
        .join("_");

    if ctx.options.regular2 {
        let ids: Vec<ProcId> = members.iter().map(|c| c.proc).collect();
        let proc = match ctx.gnf.by_members.get(&ids) {
            Some(proc) => *proc,
            None => {
                let mut params = vec![];
                let mut formal_members = vec![];
                for c in &members {
                    let formals = ctx.table.get(c.proc).params.clone();
                    let fresh: Vec<Variable> = formals
                        .iter()
                        .map(|p| ctx.fresh_var(&p.name, p.sort.clone()))
                        .collect();
                    formal_members.push(Continuation {
                        proc: c.proc,
                        args: fresh.iter().map(DataExpr::var).collect(),
                    });
                    params.extend(fresh);
                }
                let proc = add_process(ctx, &hint, params, sequence_body(&formal_members));
                ctx.gnf.by_members.insert(ids, proc);
                ctx.gnf.folded.insert(proc, formal_members);
                proc
            }
        };
        let args = members.into_iter().flat_map(|c| c.args).collect();
        return Ok(vec![Continuation { proc, args }]);
    }

    let body = sequence_body(&members);
    let globals = ctx.global_vars();
    let params: Vec<Variable> = body
        .free_vars()
        .into_iter()
        .filter(|v| !globals.contains(v))
        .collect();
    let args = params.iter().map(DataExpr::var).collect();
    let proc = add_process(ctx, &hint, params, body);
    ctx.gnf.folded.entry(proc).or_insert(members);
    Ok(vec![Continuation { proc, args }])
}

fn sequence_body(members: &[Continuation]) -> ProcExpr {
    members
        .iter()
        .rev()
        .map(Continuation::call)
        .reduce(|rest, call| ProcExpr::seq(call, rest))
        .unwrap_or(ProcExpr::Delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::term::{Sort, Specification};

    fn a() -> ProcExpr {
        ProcExpr::action("a", vec![])
    }

    fn b() -> ProcExpr {
        ProcExpr::action("b", vec![])
    }

    fn context(spec: Specification, options: Options) -> Context {
        let bodies: Vec<ProcExpr> = spec.equations.iter().map(|eq| eq.body.clone()).collect();
        let mut ctx = Context::new(spec, options);
        set_sequence_limit(&mut ctx, &bodies);
        ctx
    }

    #[test]
    fn test_unguarded_recursion_is_rejected() {
        let mut spec = Specification::new();
        let p = spec.declare_process("P", vec![]);
        spec.define(p, ProcExpr::call(p, vec![]));
        let mut ctx = context(spec, Options::default());
        assert!(matches!(transform(&mut ctx, p), Err(Error::Guardedness(_))));
    }

    #[test]
    fn test_head_references_are_inlined() {
        let mut spec = Specification::new();
        let n = Variable::new("n", Sort::Nat);
        let p = spec.declare_process("P", vec![]);
        let q = spec.declare_process("Q", vec![n.clone()]);
        spec.define(p, ProcExpr::call(q, vec![DataExpr::number(1, Sort::Nat)]));
        spec.define(
            q,
            ProcExpr::seq(
                ProcExpr::action("a", vec![DataExpr::var(&n)]),
                ProcExpr::call(q, vec![DataExpr::var(&n)]),
            ),
        );
        let mut ctx = context(spec, Options::default());
        transform(&mut ctx, p).unwrap();
        let Some(Gnf::Leaf(leaf)) = ctx.gnf.body(p) else {
            panic!("expected a single leaf");
        };
        assert_eq!(leaf.action.as_ref().unwrap().to_string(), "a(1)");
        assert_eq!(leaf.continuation[0].proc, q);
        assert_eq!(leaf.continuation[0].args, vec![DataExpr::number(1, Sort::Nat)]);
    }

    #[test]
    fn test_sequences_fold_into_one_reference() {
        let mut spec = Specification::new();
        let p = spec.declare_process("P", vec![]);
        let q = spec.declare_process("Q", vec![]);
        spec.define(
            p,
            ProcExpr::seq(
                a(),
                ProcExpr::seq(ProcExpr::call(q, vec![]), ProcExpr::call(p, vec![])),
            ),
        );
        spec.define(q, b());
        let mut ctx = context(spec, Options::default());
        transform(&mut ctx, p).unwrap();
        let Some(Gnf::Leaf(leaf)) = ctx.gnf.body(p) else {
            panic!("expected a single leaf");
        };
        assert_eq!(leaf.continuation.len(), 1);
        let folded = leaf.continuation[0].proc;
        assert_eq!(&*ctx.table.get(folded).name, "Q_P");
        let Some(Gnf::Leaf(inner)) = ctx.gnf.body(folded) else {
            panic!("expected a single leaf");
        };
        assert_eq!(inner.continuation[0].proc, p);
    }

    #[test]
    fn test_stack_mode_keeps_sequences() {
        let mut spec = Specification::new();
        let p = spec.declare_process("P", vec![]);
        let q = spec.declare_process("Q", vec![]);
        spec.define(
            p,
            ProcExpr::seq(
                a(),
                ProcExpr::seq(ProcExpr::call(q, vec![]), ProcExpr::call(p, vec![])),
            ),
        );
        spec.define(q, b());
        let options = Options {
            regular: false,
            ..Options::default()
        };
        let mut ctx = context(spec, options);
        transform(&mut ctx, p).unwrap();
        let Some(Gnf::Leaf(leaf)) = ctx.gnf.body(p) else {
            panic!("expected a single leaf");
        };
        let procs: Vec<ProcId> = leaf.continuation.iter().map(|c| c.proc).collect();
        assert_eq!(procs, vec![q, p]);
    }

    #[test]
    fn test_calls_behind_a_non_terminating_process_are_dropped() {
        let mut spec = Specification::new();
        let x = spec.declare_process("X", vec![]);
        let y = spec.declare_process("Y", vec![]);
        spec.define(
            x,
            ProcExpr::seq(
                a(),
                ProcExpr::seq(ProcExpr::call(y, vec![]), ProcExpr::call(x, vec![])),
            ),
        );
        spec.define(y, ProcExpr::seq(b(), ProcExpr::call(x, vec![])));
        for regular in [true, false] {
            let options = Options {
                regular,
                ..Options::default()
            };
            let mut ctx = context(spec.clone(), options);
            transform(&mut ctx, x).unwrap();
            let Some(Gnf::Leaf(leaf)) = ctx.gnf.body(x) else {
                panic!("expected a single leaf");
            };
            let procs: Vec<ProcId> = leaf.continuation.iter().map(|c| c.proc).collect();
            assert_eq!(procs, vec![y]);
        }
    }

    #[test]
    fn test_non_regular_process_needs_the_stack() {
        let mut spec = Specification::new();
        let p = spec.declare_process("P", vec![]);
        spec.define(
            p,
            ProcExpr::choice(
                ProcExpr::seq(a(), ProcExpr::seq(ProcExpr::call(p, vec![]), b())),
                b(),
            ),
        );
        let mut ctx = context(spec, Options::default());
        assert!(matches!(transform(&mut ctx, p), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_double_time_becomes_a_condition() {
        let mut spec = Specification::new();
        let (u, t) = (Variable::new("u", Sort::Real), Variable::new("t", Sort::Real));
        let p = spec.declare_process("P", vec![u.clone(), t.clone()]);
        spec.define(
            p,
            ProcExpr::at(ProcExpr::at(a(), DataExpr::var(&u)), DataExpr::var(&t)),
        );
        let mut ctx = context(spec, Options::default());
        transform(&mut ctx, p).unwrap();
        let Some(Gnf::Cond(c, then, _)) = ctx.gnf.body(p) else {
            panic!("expected a condition");
        };
        assert_eq!(c.to_string(), "u == t");
        let Gnf::Leaf(leaf) = &**then else {
            panic!("expected a leaf");
        };
        assert_eq!(leaf.time, Some(DataExpr::var(&t)));
    }

    #[test]
    fn test_sum_variables_are_not_captured_by_continuations() {
        let mut spec = Specification::new();
        let d = Variable::new("d", Sort::Nat);
        let p = spec.declare_process("P", vec![d.clone()]);
        let q = spec.declare_process("Q", vec![]);
        let r = spec.declare_process("R", vec![d.clone()]);
        spec.define(
            q,
            ProcExpr::sum(vec![d.clone()], ProcExpr::action("a", vec![DataExpr::var(&d)])),
        );
        spec.define(r, ProcExpr::seq(b(), ProcExpr::call(r, vec![DataExpr::var(&d)])));
        spec.define(
            p,
            ProcExpr::seq(ProcExpr::call(q, vec![]), ProcExpr::call(r, vec![DataExpr::var(&d)])),
        );
        let mut ctx = context(spec, Options::default());
        transform(&mut ctx, p).unwrap();
        let Some(Gnf::Sum(vars, body)) = ctx.gnf.body(p) else {
            panic!("expected a sum");
        };
        assert_ne!(vars[0].name, d.name);
        let Gnf::Leaf(leaf) = &**body else {
            panic!("expected a leaf");
        };
        assert_eq!(leaf.continuation[0].args, vec![DataExpr::var(&d)]);
    }
}
