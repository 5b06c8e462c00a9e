//! Data and process expressions.
//!
//! Identifiers are shared `Rc<str>` values and every term derives structural
//! `Eq`, `Ord` and `Hash`, so terms can be compared, sorted and used as map
//! keys directly.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub mod names;
pub mod spec;
pub mod subst;

pub use names::NameGen;
pub use spec::{
    ActionDecl, DataEquation, DataSpec, ProcId, ProcTable, ProcessEquation, Specification,
    Status,
};
pub use subst::{FreeVars, Substitute, Substitution};

pub type Ident = Rc<str>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sort {
    Bool,
    Pos,
    Nat,
    Int,
    Real,
    Named(Ident),
    Unknown,
}

impl Sort {
    pub fn named(name: &str) -> Self {
        Sort::Named(name.into())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Sort::Pos | Sort::Nat | Sort::Int | Sort::Real)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable {
    pub name: Ident,
    pub sort: Sort,
}

impl Variable {
    pub fn new(name: &str, sort: Sort) -> Self {
        Self {
            name: name.into(),
            sort,
        }
    }
}

/// A function symbol: constructor or mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId {
    pub name: Ident,
    pub domain: Vec<Sort>,
    pub codomain: Sort,
}

impl OpId {
    pub fn new(name: &str, domain: Vec<Sort>, codomain: Sort) -> Self {
        Self {
            name: name.into(),
            domain,
            codomain,
        }
    }

    pub fn constant(name: &str, sort: Sort) -> Self {
        Self::new(name, vec![], sort)
    }

    pub fn is_constant(&self) -> bool {
        self.domain.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataExpr {
    Var(Variable),
    Bool(bool),
    Number { value: i64, sort: Sort },
    Apply(OpId, Vec<DataExpr>),
    Not(Box<DataExpr>),
    And(Box<DataExpr>, Box<DataExpr>),
    Or(Box<DataExpr>, Box<DataExpr>),
    Eq(Box<DataExpr>, Box<DataExpr>),
    Less(Box<DataExpr>, Box<DataExpr>),
    LessEq(Box<DataExpr>, Box<DataExpr>),
    If(Box<DataExpr>, Box<DataExpr>, Box<DataExpr>),
    /// Only produced on the right-hand side of generated equations.
    Exists(Vec<Variable>, Box<DataExpr>),
}

impl DataExpr {
    pub fn var(v: &Variable) -> Self {
        DataExpr::Var(v.clone())
    }

    pub fn number(value: i64, sort: Sort) -> Self {
        DataExpr::Number { value, sort }
    }

    pub fn apply(op: &OpId, args: Vec<DataExpr>) -> Self {
        DataExpr::Apply(op.clone(), args)
    }

    pub fn constant(op: &OpId) -> Self {
        DataExpr::Apply(op.clone(), vec![])
    }

    pub fn is_true(&self) -> bool {
        matches!(self, DataExpr::Bool(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, DataExpr::Bool(false))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(e: DataExpr) -> Self {
        match e {
            DataExpr::Bool(b) => DataExpr::Bool(!b),
            DataExpr::Not(inner) => *inner,
            e => DataExpr::Not(Box::new(e)),
        }
    }

    pub fn and(a: DataExpr, b: DataExpr) -> Self {
        match (a, b) {
            (DataExpr::Bool(true), e) | (e, DataExpr::Bool(true)) => e,
            (DataExpr::Bool(false), _) | (_, DataExpr::Bool(false)) => DataExpr::Bool(false),
            (a, b) => DataExpr::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn or(a: DataExpr, b: DataExpr) -> Self {
        match (a, b) {
            (DataExpr::Bool(false), e) | (e, DataExpr::Bool(false)) => e,
            (DataExpr::Bool(true), _) | (_, DataExpr::Bool(true)) => DataExpr::Bool(true),
            (a, b) => DataExpr::Or(Box::new(a), Box::new(b)),
        }
    }

    pub fn equal(a: DataExpr, b: DataExpr) -> Self {
        if a == b {
            DataExpr::Bool(true)
        } else {
            DataExpr::Eq(Box::new(a), Box::new(b))
        }
    }

    pub fn less_eq(a: DataExpr, b: DataExpr) -> Self {
        DataExpr::LessEq(Box::new(a), Box::new(b))
    }

    pub fn if_then_else(c: DataExpr, t: DataExpr, e: DataExpr) -> Self {
        match c {
            DataExpr::Bool(true) => t,
            DataExpr::Bool(false) => e,
            c => DataExpr::If(Box::new(c), Box::new(t), Box::new(e)),
        }
    }

    pub fn exists(vars: Vec<Variable>, body: DataExpr) -> Self {
        if vars.is_empty() {
            body
        } else {
            DataExpr::Exists(vars, Box::new(body))
        }
    }

    pub fn conjunction(items: impl IntoIterator<Item = DataExpr>) -> Self {
        items.into_iter().fold(DataExpr::Bool(true), DataExpr::and)
    }

    pub fn disjunction(items: impl IntoIterator<Item = DataExpr>) -> Self {
        items.into_iter().fold(DataExpr::Bool(false), DataExpr::or)
    }

    pub fn sort(&self) -> Sort {
        match self {
            DataExpr::Var(v) => v.sort.clone(),
            DataExpr::Number { sort, .. } => sort.clone(),
            DataExpr::Apply(op, _) => op.codomain.clone(),
            DataExpr::If(_, t, _) => t.sort(),
            DataExpr::Bool(_)
            | DataExpr::Not(_)
            | DataExpr::And(..)
            | DataExpr::Or(..)
            | DataExpr::Eq(..)
            | DataExpr::Less(..)
            | DataExpr::LessEq(..)
            | DataExpr::Exists(..) => Sort::Bool,
        }
    }

    /// Rebuilds this node with `f` applied to each direct child.
    pub fn map_children(&self, f: &mut impl FnMut(&DataExpr) -> DataExpr) -> DataExpr {
        let mut b = |e: &DataExpr| Box::new(f(e));
        match self {
            DataExpr::Var(_) | DataExpr::Bool(_) | DataExpr::Number { .. } => self.clone(),
            DataExpr::Apply(op, args) => {
                DataExpr::Apply(op.clone(), args.iter().map(|a| *b(a)).collect())
            }
            DataExpr::Not(e) => DataExpr::Not(b(e)),
            DataExpr::And(l, r) => DataExpr::And(b(l), b(r)),
            DataExpr::Or(l, r) => DataExpr::Or(b(l), b(r)),
            DataExpr::Eq(l, r) => DataExpr::Eq(b(l), b(r)),
            DataExpr::Less(l, r) => DataExpr::Less(b(l), b(r)),
            DataExpr::LessEq(l, r) => DataExpr::LessEq(b(l), b(r)),
            DataExpr::If(c, t, e) => DataExpr::If(b(c), b(t), b(e)),
            DataExpr::Exists(vars, body) => DataExpr::Exists(vars.clone(), b(body)),
        }
    }

    /// Bottom-up rewrite of every node.
    pub fn transform(&self, f: &mut impl FnMut(DataExpr) -> DataExpr) -> DataExpr {
        let rebuilt = self.map_children(&mut |child| child.transform(f));
        f(rebuilt)
    }

    pub fn for_each(&self, f: &mut impl FnMut(&DataExpr)) {
        f(self);
        match self {
            DataExpr::Var(_) | DataExpr::Bool(_) | DataExpr::Number { .. } => {}
            DataExpr::Apply(_, args) => args.iter().for_each(|a| a.for_each(f)),
            DataExpr::Not(e) | DataExpr::Exists(_, e) => e.for_each(f),
            DataExpr::And(l, r)
            | DataExpr::Or(l, r)
            | DataExpr::Eq(l, r)
            | DataExpr::Less(l, r)
            | DataExpr::LessEq(l, r) => {
                l.for_each(f);
                r.for_each(f);
            }
            DataExpr::If(c, t, e) => {
                c.for_each(f);
                t.for_each(f);
                e.for_each(f);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Action {
    pub name: Ident,
    pub args: Vec<DataExpr>,
}

impl Action {
    pub fn new(name: &str, args: Vec<DataExpr>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn arg_sorts(&self) -> Vec<Sort> {
        self.args.iter().map(DataExpr::sort).collect()
    }
}

/// An ordered multiset of actions; the empty multiaction is `tau`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MultiAction(Vec<Action>);

impl MultiAction {
    pub fn new(mut actions: Vec<Action>) -> Self {
        actions.sort();
        Self(actions)
    }

    pub fn tau() -> Self {
        Self(vec![])
    }

    pub fn single(action: Action) -> Self {
        Self(vec![action])
    }

    pub fn actions(&self) -> &[Action] {
        &self.0
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.0
    }

    pub fn is_tau(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<Ident> {
        self.0.iter().map(|a| a.name.clone()).collect()
    }

    pub fn union(&self, other: &MultiAction) -> MultiAction {
        MultiAction::new(self.0.iter().chain(other.0.iter()).cloned().collect())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.0.iter().any(|a| &*a.name == name)
    }

    /// The action names paired with their argument sorts, in order.
    pub fn signature(&self) -> Vec<(Ident, Vec<Sort>)> {
        self.0
            .iter()
            .map(|a| (a.name.clone(), a.arg_sorts()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RenameRule {
    pub from: Ident,
    pub to: Ident,
}

/// `lhs -> rhs`; the left-hand side is a multiset of action names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommRule {
    pub lhs: Vec<Ident>,
    pub rhs: Ident,
}

impl CommRule {
    pub fn new(lhs: &[&str], rhs: &str) -> Self {
        let mut lhs: Vec<Ident> = lhs.iter().map(|n| Ident::from(*n)).collect();
        lhs.sort();
        Self {
            lhs,
            rhs: rhs.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcExpr {
    #[default]
    Delta,
    Tau,
    Action(Action),
    Call(ProcId, Vec<DataExpr>),
    Seq(Box<ProcExpr>, Box<ProcExpr>),
    Choice(Box<ProcExpr>, Box<ProcExpr>),
    Sum(Vec<Variable>, Box<ProcExpr>),
    /// `c -> then <> else`
    Cond(DataExpr, Box<ProcExpr>, Box<ProcExpr>),
    At(Box<ProcExpr>, DataExpr),
    Sync(Box<ProcExpr>, Box<ProcExpr>),
    Merge(Box<ProcExpr>, Box<ProcExpr>),
    LeftMerge(Box<ProcExpr>, Box<ProcExpr>),
    BoundedInit(Box<ProcExpr>, Box<ProcExpr>),
    Hide(Vec<Ident>, Box<ProcExpr>),
    Rename(Vec<RenameRule>, Box<ProcExpr>),
    /// Each element is a sorted multiset of action names.
    Allow(Vec<Vec<Ident>>, Box<ProcExpr>),
    Block(Vec<Ident>, Box<ProcExpr>),
    Comm(Vec<CommRule>, Box<ProcExpr>),
}

impl ProcExpr {
    pub fn action(name: &str, args: Vec<DataExpr>) -> Self {
        ProcExpr::Action(Action::new(name, args))
    }

    pub fn call(id: ProcId, args: Vec<DataExpr>) -> Self {
        ProcExpr::Call(id, args)
    }

    pub fn seq(l: ProcExpr, r: ProcExpr) -> Self {
        ProcExpr::Seq(Box::new(l), Box::new(r))
    }

    pub fn choice(l: ProcExpr, r: ProcExpr) -> Self {
        ProcExpr::Choice(Box::new(l), Box::new(r))
    }

    pub fn sum(vars: Vec<Variable>, body: ProcExpr) -> Self {
        ProcExpr::Sum(vars, Box::new(body))
    }

    pub fn cond(c: DataExpr, then: ProcExpr, otherwise: ProcExpr) -> Self {
        ProcExpr::Cond(c, Box::new(then), Box::new(otherwise))
    }

    pub fn at(p: ProcExpr, t: DataExpr) -> Self {
        ProcExpr::At(Box::new(p), t)
    }

    pub fn sync(l: ProcExpr, r: ProcExpr) -> Self {
        ProcExpr::Sync(Box::new(l), Box::new(r))
    }

    pub fn merge(l: ProcExpr, r: ProcExpr) -> Self {
        ProcExpr::Merge(Box::new(l), Box::new(r))
    }

    pub fn hide(names: &[&str], p: ProcExpr) -> Self {
        ProcExpr::Hide(names.iter().map(|n| Ident::from(*n)).collect(), Box::new(p))
    }

    pub fn rename(rules: &[(&str, &str)], p: ProcExpr) -> Self {
        let rules = rules
            .iter()
            .map(|(from, to)| RenameRule {
                from: (*from).into(),
                to: (*to).into(),
            })
            .collect();
        ProcExpr::Rename(rules, Box::new(p))
    }

    pub fn allow(sets: &[&[&str]], p: ProcExpr) -> Self {
        let sets = sets
            .iter()
            .map(|set| {
                let mut names: Vec<Ident> = set.iter().map(|n| Ident::from(*n)).collect();
                names.sort();
                names
            })
            .collect();
        ProcExpr::Allow(sets, Box::new(p))
    }

    pub fn block(names: &[&str], p: ProcExpr) -> Self {
        ProcExpr::Block(names.iter().map(|n| Ident::from(*n)).collect(), Box::new(p))
    }

    pub fn comm(rules: Vec<CommRule>, p: ProcExpr) -> Self {
        ProcExpr::Comm(rules, Box::new(p))
    }

    /// Applies `f` to every data expression held directly by a node of this tree.
    pub fn map_data(&self, f: &mut dyn FnMut(&DataExpr) -> DataExpr) -> ProcExpr {
        fn boxed(p: &ProcExpr, f: &mut dyn FnMut(&DataExpr) -> DataExpr) -> Box<ProcExpr> {
            Box::new(p.map_data(f))
        }
        match self {
            ProcExpr::Delta | ProcExpr::Tau => self.clone(),
            ProcExpr::Action(a) => ProcExpr::Action(Action {
                name: a.name.clone(),
                args: a.args.iter().map(|e| f(e)).collect(),
            }),
            ProcExpr::Call(id, args) => ProcExpr::Call(*id, args.iter().map(|e| f(e)).collect()),
            ProcExpr::Seq(l, r) => ProcExpr::Seq(boxed(l, f), boxed(r, f)),
            ProcExpr::Choice(l, r) => ProcExpr::Choice(boxed(l, f), boxed(r, f)),
            ProcExpr::Sync(l, r) => ProcExpr::Sync(boxed(l, f), boxed(r, f)),
            ProcExpr::Merge(l, r) => ProcExpr::Merge(boxed(l, f), boxed(r, f)),
            ProcExpr::LeftMerge(l, r) => ProcExpr::LeftMerge(boxed(l, f), boxed(r, f)),
            ProcExpr::BoundedInit(l, r) => ProcExpr::BoundedInit(boxed(l, f), boxed(r, f)),
            ProcExpr::Sum(vars, p) => ProcExpr::Sum(vars.clone(), boxed(p, f)),
            ProcExpr::Cond(c, l, r) => {
                let c = f(c);
                ProcExpr::Cond(c, boxed(l, f), boxed(r, f))
            }
            ProcExpr::At(p, t) => {
                let t = f(t);
                ProcExpr::At(boxed(p, f), t)
            }
            ProcExpr::Hide(names, p) => ProcExpr::Hide(names.clone(), boxed(p, f)),
            ProcExpr::Rename(rules, p) => ProcExpr::Rename(rules.clone(), boxed(p, f)),
            ProcExpr::Allow(sets, p) => ProcExpr::Allow(sets.clone(), boxed(p, f)),
            ProcExpr::Block(names, p) => ProcExpr::Block(names.clone(), boxed(p, f)),
            ProcExpr::Comm(rules, p) => ProcExpr::Comm(rules.clone(), boxed(p, f)),
        }
    }

    /// Visits every process node, parents before children.
    pub fn for_each(&self, f: &mut impl FnMut(&ProcExpr)) {
        f(self);
        match self {
            ProcExpr::Delta | ProcExpr::Tau | ProcExpr::Action(_) | ProcExpr::Call(..) => {}
            ProcExpr::Seq(l, r)
            | ProcExpr::Choice(l, r)
            | ProcExpr::Sync(l, r)
            | ProcExpr::Merge(l, r)
            | ProcExpr::LeftMerge(l, r)
            | ProcExpr::BoundedInit(l, r)
            | ProcExpr::Cond(_, l, r) => {
                l.for_each(f);
                r.for_each(f);
            }
            ProcExpr::Sum(_, p)
            | ProcExpr::At(p, _)
            | ProcExpr::Hide(_, p)
            | ProcExpr::Rename(_, p)
            | ProcExpr::Allow(_, p)
            | ProcExpr::Block(_, p)
            | ProcExpr::Comm(_, p) => p.for_each(f),
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Pos => write!(f, "Pos"),
            Sort::Nat => write!(f, "Nat"),
            Sort::Int => write!(f, "Int"),
            Sort::Real => write!(f, "Real"),
            Sort::Named(name) => write!(f, "{name}"),
            Sort::Unknown => write!(f, "Unknown"),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.sort)
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for DataExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataExpr::Var(v) => write!(f, "{}", v.name),
            DataExpr::Bool(b) => write!(f, "{b}"),
            DataExpr::Number { value, .. } => write!(f, "{value}"),
            DataExpr::Apply(op, args) if args.is_empty() => write!(f, "{}", op.name),
            DataExpr::Apply(op, args) => write!(f, "{}({})", op.name, join(args, ", ")),
            DataExpr::Not(e) => write!(f, "!({e})"),
            DataExpr::And(l, r) => write!(f, "({l} && {r})"),
            DataExpr::Or(l, r) => write!(f, "({l} || {r})"),
            DataExpr::Eq(l, r) => write!(f, "{l} == {r}"),
            DataExpr::Less(l, r) => write!(f, "{l} < {r}"),
            DataExpr::LessEq(l, r) => write!(f, "{l} <= {r}"),
            DataExpr::If(c, t, e) => write!(f, "if({c}, {t}, {e})"),
            DataExpr::Exists(vars, body) => write!(f, "exists {}. {body}", join(vars, ", ")),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, join(&self.args, ", "))
        }
    }
}

impl fmt::Display for MultiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "tau")
        } else {
            write!(f, "{}", join(&self.0, "|"))
        }
    }
}

impl fmt::Display for ProcExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcExpr::Delta => write!(f, "delta"),
            ProcExpr::Tau => write!(f, "tau"),
            ProcExpr::Action(a) => write!(f, "{a}"),
            ProcExpr::Call(id, args) => write!(f, "P{}({})", id.0, join(args, ", ")),
            ProcExpr::Seq(l, r) => write!(f, "({l} . {r})"),
            ProcExpr::Choice(l, r) => write!(f, "({l} + {r})"),
            ProcExpr::Sum(vars, p) => write!(f, "sum {}. {p}", join(vars, ", ")),
            ProcExpr::Cond(c, l, r) => write!(f, "({c} -> {l} <> {r})"),
            ProcExpr::At(p, t) => write!(f, "{p} @ {t}"),
            ProcExpr::Sync(l, r) => write!(f, "({l} | {r})"),
            ProcExpr::Merge(l, r) => write!(f, "({l} || {r})"),
            ProcExpr::LeftMerge(l, r) => write!(f, "({l} ||_ {r})"),
            ProcExpr::BoundedInit(l, r) => write!(f, "({l} << {r})"),
            ProcExpr::Hide(names, p) => write!(f, "hide({{{}}}, {p})", join(names, ", ")),
            ProcExpr::Rename(rules, p) => {
                let rules: Vec<String> = rules
                    .iter()
                    .map(|r| format!("{} -> {}", r.from, r.to))
                    .collect();
                write!(f, "rename({{{}}}, {p})", rules.join(", "))
            }
            ProcExpr::Allow(sets, p) => {
                let sets: Vec<String> = sets.iter().map(|s| join(s, "|")).collect();
                write!(f, "allow({{{}}}, {p})", sets.join(", "))
            }
            ProcExpr::Block(names, p) => write!(f, "block({{{}}}, {p})", join(names, ", ")),
            ProcExpr::Comm(rules, p) => {
                let rules: Vec<String> = rules
                    .iter()
                    .map(|r| format!("{} -> {}", join(&r.lhs, "|"), r.rhs))
                    .collect();
                write!(f, "comm({{{}}}, {p})", rules.join(", "))
            }
        }
    }
}
