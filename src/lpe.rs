//! Linear process equations.

use std::fmt;

use indexmap::IndexSet;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::term::{
    DataExpr, FreeVars, Ident, MultiAction, NameGen, Sort, Substitute, Substitution, Variable,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SummandAction {
    Delta,
    Multi(MultiAction),
}

impl SummandAction {
    pub fn multi(&self) -> Option<&MultiAction> {
        match self {
            SummandAction::Delta => None,
            SummandAction::Multi(m) => Some(m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum NextState {
    State(Vec<DataExpr>),
    Terminated,
}

/// `sum sum_vars. condition -> action @ time . next`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Summand {
    pub sum_vars: Vec<Variable>,
    pub condition: DataExpr,
    pub action: SummandAction,
    pub time: Option<DataExpr>,
    pub next: NextState,
}

impl Summand {
    pub fn is_delta(&self) -> bool {
        matches!(self.action, SummandAction::Delta)
    }

    pub fn is_timed(&self) -> bool {
        self.time.is_some()
    }

    pub fn is_terminating(&self) -> bool {
        matches!(self.next, NextState::Terminated)
    }

    /// Applies `f` to every data expression outside the binder.
    pub fn map_data(&self, f: &mut impl FnMut(&DataExpr) -> DataExpr) -> Summand {
        Summand {
            sum_vars: self.sum_vars.clone(),
            condition: f(&self.condition),
            action: match &self.action {
                SummandAction::Delta => SummandAction::Delta,
                SummandAction::Multi(m) => SummandAction::Multi(MultiAction::new(
                    m.actions()
                        .iter()
                        .map(|a| crate::term::Action {
                            name: a.name.clone(),
                            args: a.args.iter().map(&mut *f).collect(),
                        })
                        .collect(),
                )),
            },
            time: self.time.as_ref().map(&mut *f),
            next: match &self.next {
                NextState::State(args) => NextState::State(args.iter().map(&mut *f).collect()),
                NextState::Terminated => NextState::Terminated,
            },
        }
    }

    /// Removes sum variables that occur nowhere in the summand.
    pub fn prune_sum_vars(&mut self) {
        let used = self.body_free_vars();
        self.sum_vars.retain(|v| used.contains(v));
    }

    /// Free variables of the summand body, sum variables included.
    pub fn body_free_vars(&self) -> IndexSet<Variable> {
        let mut out = IndexSet::new();
        self.condition.collect_free_vars(&mut out);
        if let SummandAction::Multi(m) = &self.action {
            m.collect_free_vars(&mut out);
        }
        self.time.collect_free_vars(&mut out);
        if let NextState::State(args) = &self.next {
            args.collect_free_vars(&mut out);
        }
        out
    }

    /// Renames the sum variables whose names occur in `avoid`.
    pub fn avoid_names(&self, avoid: &IndexSet<Variable>, names: &mut NameGen) -> Summand {
        let (sum_vars, sigma) = crate::term::subst::alpha_convert(&self.sum_vars, avoid, names);
        if sigma.is_empty() {
            return self.clone();
        }
        let mut renamed = self.map_data(&mut |e| e.substitute(&sigma, names));
        renamed.sum_vars = sum_vars;
        renamed
    }
}

impl Substitute for Summand {
    fn substitute(&self, sigma: &Substitution, names: &mut NameGen) -> Self {
        let (sum_vars, inner) = sigma.enter_binder(&self.sum_vars, names);
        let mut out = self.map_data(&mut |e| e.substitute(&inner, names));
        out.sum_vars = sum_vars;
        out
    }
}

impl FreeVars for Summand {
    fn collect_free_vars(&self, out: &mut IndexSet<Variable>) {
        let body = self.body_free_vars();
        out.extend(body.into_iter().filter(|v| !self.sum_vars.contains(v)));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lpe {
    pub name: Ident,
    /// Free variables the summands may refer to.
    pub globals: Vec<Variable>,
    pub params: Vec<Variable>,
    pub summands: Vec<Summand>,
    pub init: Vec<DataExpr>,
}

impl Lpe {
    pub fn param_sorts(&self) -> Vec<Sort> {
        self.params.iter().map(|p| p.sort.clone()).collect()
    }

    pub fn has_timed_summands(&self) -> bool {
        self.summands.iter().any(Summand::is_timed)
    }

    pub fn check_invariants(&self) -> Result<()> {
        if self.init.len() != self.params.len() {
            return Err(Error::Consistency(format!(
                "initial state of {} has {} values for {} parameters",
                self.name,
                self.init.len(),
                self.params.len()
            )));
        }
        for (i, summand) in self.summands.iter().enumerate() {
            if let NextState::State(args) = &summand.next
                && args.len() != self.params.len()
            {
                return Err(Error::Consistency(format!(
                    "summand {i} of {} has a next state of length {} for {} parameters",
                    self.name,
                    args.len(),
                    self.params.len()
                )));
            }
            if let Some(clash) = summand
                .sum_vars
                .iter()
                .find(|v| self.params.iter().any(|p| p.name == v.name))
            {
                return Err(Error::Consistency(format!(
                    "sum variable {} of summand {i} clashes with a parameter of {}",
                    clash.name, self.name
                )));
            }
        }
        Ok(())
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

impl Summand {
    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
        if !self.sum_vars.is_empty() {
            write!(f, "sum {}. ", join(&self.sum_vars, ", "))?;
        }
        if !self.condition.is_true() {
            write!(f, "{} -> ", self.condition)?;
        }
        match &self.action {
            SummandAction::Delta => write!(f, "delta")?,
            SummandAction::Multi(m) => write!(f, "{m}")?,
        }
        if let Some(t) = &self.time {
            write!(f, " @ {t}")?;
        }
        if let NextState::State(args) = &self.next {
            write!(f, " . {name}({})", join(args, ", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for Lpe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.globals.is_empty() {
            writeln!(f, "glob {};", join(&self.globals, ", "))?;
            writeln!(f)?;
        }
        writeln!(f, "proc {}({}) =", self.name, join(&self.params, ", "))?;
        if self.summands.is_empty() {
            writeln!(f, "       delta;")?;
        }
        for (i, summand) in self.summands.iter().enumerate() {
            write!(f, "{}", if i == 0 { "       " } else { "     + " })?;
            summand.fmt_with(f, &self.name)?;
            writeln!(f, "{}", if i + 1 == self.summands.len() { ";" } else { "" })?;
        }
        writeln!(f)?;
        writeln!(f, "init {}({});", self.name, join(&self.init, ", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Action;

    fn counter() -> Lpe {
        let n = Variable::new("n", Sort::Nat);
        Lpe {
            name: "P".into(),
            globals: vec![],
            params: vec![n.clone()],
            summands: vec![Summand {
                sum_vars: vec![],
                condition: DataExpr::Bool(true),
                action: SummandAction::Multi(MultiAction::single(Action::new(
                    "tick",
                    vec![DataExpr::var(&n)],
                ))),
                time: None,
                next: NextState::State(vec![DataExpr::var(&n)]),
            }],
            init: vec![DataExpr::number(0, Sort::Nat)],
        }
    }

    #[test]
    fn test_display_uses_process_notation() {
        let text = counter().to_string();
        assert!(text.contains("proc P(n: Nat) ="));
        assert!(text.contains("tick(n) . P(n);"));
        assert!(text.contains("init P(0);"));
    }

    #[test]
    fn test_next_state_length_is_checked() {
        let mut lpe = counter();
        lpe.summands[0].next = NextState::State(vec![]);
        assert!(matches!(lpe.check_invariants(), Err(Error::Consistency(_))));
        assert!(counter().check_invariants().is_ok());
    }

    #[test]
    fn test_prune_sum_vars_keeps_used_variables() {
        let (d, e) = (Variable::new("d", Sort::Nat), Variable::new("e", Sort::Nat));
        let mut summand = counter().summands[0].clone();
        summand.sum_vars = vec![d.clone(), e];
        summand.condition = DataExpr::less_eq(DataExpr::var(&d), DataExpr::number(3, Sort::Nat));
        summand.prune_sum_vars();
        assert_eq!(summand.sum_vars, vec![d]);
    }
}
