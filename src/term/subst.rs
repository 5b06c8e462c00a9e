//! Capture-avoiding substitution and free variables over every term kind.

use std::collections::HashMap;

use indexmap::IndexSet;

use super::{Action, DataExpr, MultiAction, NameGen, ProcExpr, Variable};

#[derive(Debug, Clone, Default)]
pub struct Substitution {
    map: HashMap<Variable, DataExpr>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs formal parameters with actual arguments.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a Variable, &'a DataExpr)>) -> Self {
        let mut sigma = Self::new();
        for (v, e) in pairs {
            sigma.insert(v.clone(), e.clone());
        }
        sigma
    }

    pub fn insert(&mut self, var: Variable, expr: DataExpr) {
        if expr == DataExpr::Var(var.clone()) {
            self.map.remove(&var);
        } else {
            self.map.insert(var, expr);
        }
    }

    pub fn get(&self, var: &Variable) -> Option<&DataExpr> {
        self.map.get(var)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn without(&self, vars: &[Variable]) -> Self {
        let mut sigma = self.clone();
        for v in vars {
            sigma.map.remove(v);
        }
        sigma
    }

    /// Variables occurring free in the substituted expressions.
    pub fn range_free_vars(&self) -> IndexSet<Variable> {
        let mut out = IndexSet::new();
        for e in self.map.values() {
            e.collect_free_vars(&mut out);
        }
        out
    }

    /// Prepares `sigma` for use under a binder of `vars`: drops mappings for
    /// the bound variables and renames bound variables that would capture a
    /// variable of the range.
    pub fn enter_binder(
        &self,
        vars: &[Variable],
        names: &mut NameGen,
    ) -> (Vec<Variable>, Substitution) {
        let mut inner = self.without(vars);
        if inner.is_empty() {
            return (vars.to_vec(), inner);
        }
        let captured = inner.range_free_vars();
        let mut bound = Vec::with_capacity(vars.len());
        for v in vars {
            if captured.contains(v) {
                let fresh = names.fresh_var(&v.name, v.sort.clone());
                inner.map.insert(v.clone(), DataExpr::Var(fresh.clone()));
                bound.push(fresh);
            } else {
                bound.push(v.clone());
            }
        }
        (bound, inner)
    }
}

/// Renames those `vars` that occur in `avoid`, returning the new binder list
/// and the renaming to apply to the bound body.
pub fn alpha_convert(
    vars: &[Variable],
    avoid: &IndexSet<Variable>,
    names: &mut NameGen,
) -> (Vec<Variable>, Substitution) {
    let mut sigma = Substitution::new();
    let mut bound = Vec::with_capacity(vars.len());
    for v in vars {
        if avoid.iter().any(|a| a.name == v.name) {
            let fresh = names.fresh_var(&v.name, v.sort.clone());
            sigma.insert(v.clone(), DataExpr::Var(fresh.clone()));
            bound.push(fresh);
        } else {
            bound.push(v.clone());
        }
    }
    (bound, sigma)
}

pub trait Substitute: Sized {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self;
}

pub trait FreeVars {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>);

    fn free_vars(&self) -> IndexSet<Variable> {
        let mut out = IndexSet::new();
        self.collect_free_vars(&mut out);
        out
    }
}

impl Substitute for DataExpr {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self {
        if sigma.is_empty() {
            return self.clone();
        }
        match self {
            DataExpr::Var(v) => sigma.get(v).cloned().unwrap_or_else(|| self.clone()),
            DataExpr::Exists(vars, body) => {
                let (vars, inner) = sigma.enter_binder(vars, names);
                DataExpr::Exists(vars, Box::new(body.substitute(&inner, names)))
            }
            _ => self.map_children(&mut |child| child.substitute(sigma, names)),
        }
    }
}

impl FreeVars for DataExpr {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>) {
        match self {
            DataExpr::Var(v) => {
                out.insert(v.clone());
            }
            DataExpr::Exists(vars, body) => {
                let mut inner = IndexSet::new();
                body.collect_free_vars(&mut inner);
                out.extend(inner.into_iter().filter(|v| !vars.contains(v)));
            }
            DataExpr::Bool(_) | DataExpr::Number { .. } => {}
            DataExpr::Apply(_, args) => args.iter().for_each(|a| a.collect_free_vars(out)),
            DataExpr::Not(e) => e.collect_free_vars(out),
            DataExpr::And(l, r)
            | DataExpr::Or(l, r)
            | DataExpr::Eq(l, r)
            | DataExpr::Less(l, r)
            | DataExpr::LessEq(l, r) => {
                l.collect_free_vars(out);
                r.collect_free_vars(out);
            }
            DataExpr::If(c, t, e) => {
                c.collect_free_vars(out);
                t.collect_free_vars(out);
                e.collect_free_vars(out);
            }
        }
    }
}

impl<T: Substitute> Substitute for Vec<T> {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self {
        self.iter().map(|t| t.substitute(sigma, names)).collect()
    }
}

impl<T: Substitute> Substitute for Option<T> {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self {
        self.as_ref().map(|t| t.substitute(sigma, names))
    }
}

impl<T: FreeVars> FreeVars for [T] {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>) {
        self.iter().for_each(|t| t.collect_free_vars(out));
    }
}

impl<T: FreeVars> FreeVars for Vec<T> {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>) {
        self.as_slice().collect_free_vars(out);
    }
}

impl<T: FreeVars> FreeVars for Option<T> {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>) {
        if let Some(t) = self {
            t.collect_free_vars(out);
        }
    }
}

impl Substitute for Action {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self {
        Action {
            name: self.name.clone(),
            args: self.args.substitute(sigma, names),
        }
    }
}

impl FreeVars for Action {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>) {
        self.args.collect_free_vars(out);
    }
}

impl Substitute for MultiAction {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self {
        MultiAction::new(self.actions().to_vec().substitute(sigma, names))
    }
}

impl FreeVars for MultiAction {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>) {
        self.actions().collect_free_vars(out);
    }
}

impl Substitute for ProcExpr {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self {
        if sigma.is_empty() {
            return self.clone();
        }
        match self {
            ProcExpr::Sum(vars, body) => {
                let (vars, inner) = sigma.enter_binder(vars, names);
                ProcExpr::Sum(vars, Box::new(body.substitute(&inner, names)))
            }
            ProcExpr::Seq(l, r) => {
                ProcExpr::seq(l.substitute(sigma, names), r.substitute(sigma, names))
            }
            ProcExpr::Choice(l, r) => {
                ProcExpr::choice(l.substitute(sigma, names), r.substitute(sigma, names))
            }
            ProcExpr::Sync(l, r) => {
                ProcExpr::sync(l.substitute(sigma, names), r.substitute(sigma, names))
            }
            ProcExpr::Merge(l, r) => {
                ProcExpr::merge(l.substitute(sigma, names), r.substitute(sigma, names))
            }
            ProcExpr::LeftMerge(l, r) => ProcExpr::LeftMerge(
                Box::new(l.substitute(sigma, names)),
                Box::new(r.substitute(sigma, names)),
            ),
            ProcExpr::BoundedInit(l, r) => ProcExpr::BoundedInit(
                Box::new(l.substitute(sigma, names)),
                Box::new(r.substitute(sigma, names)),
            ),
            ProcExpr::Cond(c, l, r) => ProcExpr::cond(
                c.substitute(sigma, names),
                l.substitute(sigma, names),
                r.substitute(sigma, names),
            ),
            ProcExpr::At(p, t) => {
                ProcExpr::at(p.substitute(sigma, names), t.substitute(sigma, names))
            }
            ProcExpr::Hide(set, p) => {
                ProcExpr::Hide(set.clone(), Box::new(p.substitute(sigma, names)))
            }
            ProcExpr::Rename(rules, p) => {
                ProcExpr::Rename(rules.clone(), Box::new(p.substitute(sigma, names)))
            }
            ProcExpr::Allow(sets, p) => {
                ProcExpr::Allow(sets.clone(), Box::new(p.substitute(sigma, names)))
            }
            ProcExpr::Block(set, p) => {
                ProcExpr::Block(set.clone(), Box::new(p.substitute(sigma, names)))
            }
            ProcExpr::Comm(rules, p) => {
                ProcExpr::Comm(rules.clone(), Box::new(p.substitute(sigma, names)))
            }
            ProcExpr::Delta | ProcExpr::Tau | ProcExpr::Action(_) | ProcExpr::Call(..) => {
                self.map_data(&mut |e| e.substitute(sigma, names))
            }
        }
    }
}

impl FreeVars for ProcExpr {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>) {
        match self {
            ProcExpr::Delta | ProcExpr::Tau => {}
            ProcExpr::Action(a) => a.collect_free_vars(out),
            ProcExpr::Call(_, args) => args.collect_free_vars(out),
            ProcExpr::Sum(vars, body) => {
                let inner = body.free_vars();
                out.extend(inner.into_iter().filter(|v| !vars.contains(v)));
            }
            ProcExpr::Cond(c, l, r) => {
                c.collect_free_vars(out);
                l.collect_free_vars(out);
                r.collect_free_vars(out);
            }
            ProcExpr::At(p, t) => {
                p.collect_free_vars(out);
                t.collect_free_vars(out);
            }
            ProcExpr::Seq(l, r)
            | ProcExpr::Choice(l, r)
            | ProcExpr::Sync(l, r)
            | ProcExpr::Merge(l, r)
            | ProcExpr::LeftMerge(l, r)
            | ProcExpr::BoundedInit(l, r) => {
                l.collect_free_vars(out);
                r.collect_free_vars(out);
            }
            ProcExpr::Hide(_, p)
            | ProcExpr::Rename(_, p)
            | ProcExpr::Allow(_, p)
            | ProcExpr::Block(_, p)
            | ProcExpr::Comm(_, p) => p.collect_free_vars(out),
        }
    }
}
