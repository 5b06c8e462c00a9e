//! Best-effort simplification of data expressions.

use std::collections::{HashMap, HashSet};

use crate::term::{DataEquation, DataExpr, Ident, OpId, Variable};

/// Maximum number of nested equation applications per rewrite.
const FUEL: usize = 64;

pub trait Rewriter {
    fn rewrite(&self, expr: &DataExpr) -> DataExpr;

    /// Makes a generated equation available to later rewrites.
    fn add_equation(&mut self, _equation: &DataEquation) {}

    fn add_constructor(&mut self, _op: &OpId) {}
}

/// Leaves every expression as it is.
#[derive(Debug, Default)]
pub struct Identity;

impl Rewriter for Identity {
    fn rewrite(&self, expr: &DataExpr) -> DataExpr {
        expr.clone()
    }
}

/// Folds boolean and numeric literals and applies unconditional data
/// equations innermost-first.
#[derive(Debug, Default)]
pub struct Simplifier {
    rules: HashMap<Ident, Vec<DataEquation>>,
    constructors: HashSet<Ident>,
}

impl Simplifier {
    pub fn new<'a>(
        equations: impl IntoIterator<Item = &'a DataEquation>,
        constructors: impl IntoIterator<Item = &'a OpId>,
    ) -> Self {
        let mut simplifier = Self::default();
        for op in constructors {
            simplifier.add_constructor(op);
        }
        for eq in equations {
            simplifier.add_equation(eq);
        }
        simplifier
    }

    fn simplify(&self, expr: &DataExpr, fuel: usize) -> DataExpr {
        expr.transform(&mut |node| self.step(node, fuel))
    }

    fn step(&self, node: DataExpr, fuel: usize) -> DataExpr {
        match node {
            DataExpr::Not(e) => DataExpr::not(*e),
            DataExpr::And(l, r) => {
                if l == r {
                    *l
                } else if is_negation_of(&l, &r) {
                    DataExpr::Bool(false)
                } else {
                    DataExpr::and(*l, *r)
                }
            }
            DataExpr::Or(l, r) => {
                if l == r {
                    *l
                } else if is_negation_of(&l, &r) {
                    DataExpr::Bool(true)
                } else {
                    DataExpr::or(*l, *r)
                }
            }
            DataExpr::Eq(l, r) => self.equality(*l, *r),
            DataExpr::Less(l, r) => match (&*l, &*r) {
                (DataExpr::Number { value: a, .. }, DataExpr::Number { value: b, .. }) => {
                    DataExpr::Bool(a < b)
                }
                _ if l == r => DataExpr::Bool(false),
                _ => DataExpr::Less(l, r),
            },
            DataExpr::LessEq(l, r) => match (&*l, &*r) {
                (DataExpr::Number { value: a, .. }, DataExpr::Number { value: b, .. }) => {
                    DataExpr::Bool(a <= b)
                }
                _ if l == r => DataExpr::Bool(true),
                _ => DataExpr::LessEq(l, r),
            },
            DataExpr::If(c, t, e) => {
                if t == e {
                    *t
                } else {
                    match (*c, *t, *e) {
                        (c, DataExpr::Bool(true), DataExpr::Bool(false)) => c,
                        (c, DataExpr::Bool(false), DataExpr::Bool(true)) => DataExpr::not(c),
                        (c, t, e) => DataExpr::if_then_else(c, t, e),
                    }
                }
            }
            DataExpr::Apply(op, args) => self.apply_rules(op, args, fuel),
            other => other,
        }
    }

    fn equality(&self, l: DataExpr, r: DataExpr) -> DataExpr {
        match (&l, &r) {
            _ if l == r => DataExpr::Bool(true),
            (DataExpr::Bool(true), e) | (e, DataExpr::Bool(true)) => e.clone(),
            (DataExpr::Bool(false), e) | (e, DataExpr::Bool(false)) => DataExpr::not(e.clone()),
            (DataExpr::Number { value: a, .. }, DataExpr::Number { value: b, .. }) => {
                DataExpr::Bool(a == b)
            }
            (DataExpr::Apply(f, xs), DataExpr::Apply(g, ys))
                if self.constructors.contains(&f.name) && self.constructors.contains(&g.name) =>
            {
                if f != g {
                    DataExpr::Bool(false)
                } else {
                    DataExpr::conjunction(
                        xs.iter()
                            .zip(ys)
                            .map(|(x, y)| self.equality(x.clone(), y.clone())),
                    )
                }
            }
            _ => DataExpr::Eq(Box::new(l), Box::new(r)),
        }
    }

    fn apply_rules(&self, op: OpId, args: Vec<DataExpr>, fuel: usize) -> DataExpr {
        let term = DataExpr::Apply(op, args);
        if fuel == 0 {
            return term;
        }
        let DataExpr::Apply(op, _) = &term else {
            return term;
        };
        let Some(rules) = self.rules.get(&op.name) else {
            return term;
        };
        for rule in rules {
            let mut sigma = HashMap::new();
            if matches(&rule.lhs, &term, &rule.vars, &mut sigma) {
                let instance = rule.rhs.transform(&mut |node| {
                    if let DataExpr::Var(v) = &node
                        && let Some(value) = sigma.get(v)
                    {
                        return value.clone();
                    }
                    node
                });
                return self.simplify(&instance, fuel - 1);
            }
        }
        term
    }
}

impl Rewriter for Simplifier {
    fn rewrite(&self, expr: &DataExpr) -> DataExpr {
        self.simplify(expr, FUEL)
    }

    fn add_equation(&mut self, equation: &DataEquation) {
        // Unfolding an `exists` into a condition is never wanted.
        let mut quantified = false;
        equation.rhs.for_each(&mut |e| {
            quantified |= matches!(e, DataExpr::Exists(..));
        });
        if quantified {
            return;
        }
        if let DataExpr::Apply(op, _) = &equation.lhs {
            self.rules
                .entry(op.name.clone())
                .or_default()
                .push(equation.clone());
        }
    }

    fn add_constructor(&mut self, op: &OpId) {
        self.constructors.insert(op.name.clone());
    }
}

fn is_negation_of(a: &DataExpr, b: &DataExpr) -> bool {
    matches!(a, DataExpr::Not(inner) if **inner == *b)
        || matches!(b, DataExpr::Not(inner) if **inner == *a)
}

/// Syntactic matching of `pattern` against `term`, binding `vars`.
fn matches(
    pattern: &DataExpr,
    term: &DataExpr,
    vars: &[Variable],
    sigma: &mut HashMap<Variable, DataExpr>,
) -> bool {
    match pattern {
        DataExpr::Var(v) if vars.contains(v) => match sigma.get(v) {
            Some(bound) => bound == term,
            None => {
                sigma.insert(v.clone(), term.clone());
                true
            }
        },
        DataExpr::Apply(f, ps) => match term {
            DataExpr::Apply(g, ts) if f == g && ps.len() == ts.len() => ps
                .iter()
                .zip(ts)
                .all(|(p, t)| matches(p, t, vars, sigma)),
            _ => false,
        },
        _ => pattern == term,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Sort;

    fn enum_sort() -> (OpId, OpId, Sort) {
        let sort = Sort::named("E");
        (
            OpId::constant("e1", sort.clone()),
            OpId::constant("e2", sort.clone()),
            sort,
        )
    }

    #[test]
    fn test_distinct_constructors_are_unequal() {
        let (e1, e2, _) = enum_sort();
        let simplifier = Simplifier::new([], [&e1, &e2]);
        let eq = DataExpr::Eq(
            Box::new(DataExpr::constant(&e1)),
            Box::new(DataExpr::constant(&e2)),
        );
        assert!(simplifier.rewrite(&eq).is_false());
    }

    #[test]
    fn test_equations_are_applied() {
        let (e1, e2, sort) = enum_sort();
        let case = OpId::new("C", vec![sort.clone(), Sort::Nat, Sort::Nat], Sort::Nat);
        let (x, y) = (Variable::new("x", Sort::Nat), Variable::new("y", Sort::Nat));
        let first = DataEquation::new(
            vec![x.clone(), y.clone()],
            DataExpr::apply(
                &case,
                vec![DataExpr::constant(&e1), DataExpr::var(&x), DataExpr::var(&y)],
            ),
            DataExpr::var(&x),
        );
        let simplifier = Simplifier::new([&first], [&e1, &e2]);
        let term = DataExpr::apply(
            &case,
            vec![
                DataExpr::constant(&e1),
                DataExpr::number(3, Sort::Nat),
                DataExpr::number(4, Sort::Nat),
            ],
        );
        assert_eq!(simplifier.rewrite(&term), DataExpr::number(3, Sort::Nat));
    }

    #[test]
    fn test_nonlinear_patterns_require_equal_arguments() {
        let (e1, _, sort) = enum_sort();
        let case = OpId::new("C", vec![sort.clone(), Sort::Nat, Sort::Nat], Sort::Nat);
        let (s, x) = (Variable::new("s", sort), Variable::new("x", Sort::Nat));
        let same = DataEquation::new(
            vec![s.clone(), x.clone()],
            DataExpr::apply(&case, vec![DataExpr::var(&s), DataExpr::var(&x), DataExpr::var(&x)]),
            DataExpr::var(&x),
        );
        let simplifier = Simplifier::new([&same], [&e1]);
        let n = Variable::new("n", Sort::Nat);
        let collapsing = DataExpr::apply(
            &case,
            vec![DataExpr::constant(&e1), DataExpr::var(&n), DataExpr::var(&n)],
        );
        assert_eq!(simplifier.rewrite(&collapsing), DataExpr::var(&n));
        let stuck = DataExpr::apply(
            &case,
            vec![DataExpr::constant(&e1), DataExpr::var(&n), DataExpr::number(0, Sort::Nat)],
        );
        assert_eq!(simplifier.rewrite(&stuck), stuck);
    }

    #[test]
    fn test_contradictions_fold() {
        let b = DataExpr::var(&Variable::new("b", Sort::Bool));
        let simplifier = Simplifier::default();
        let e = DataExpr::And(Box::new(b.clone()), Box::new(DataExpr::Not(Box::new(b))));
        assert!(simplifier.rewrite(&e).is_false());
    }

    #[test]
    fn test_numeric_comparisons_fold() {
        let simplifier = Simplifier::default();
        let e = DataExpr::Less(
            Box::new(DataExpr::number(1, Sort::Nat)),
            Box::new(DataExpr::number(2, Sort::Nat)),
        );
        assert!(simplifier.rewrite(&e).is_true());
    }
}
