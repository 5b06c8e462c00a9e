use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{DataExpr, Ident, OpId, ProcExpr, Sort, Variable};

/// Handle of a process equation: its position in the [`ProcTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Mcrl,
    Pcrl,
}

/// An unconditional data equation `lhs = rhs` over `vars`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataEquation {
    #[serde(default)]
    pub vars: Vec<Variable>,
    pub lhs: DataExpr,
    pub rhs: DataExpr,
}

impl DataEquation {
    pub fn new(vars: Vec<Variable>, lhs: DataExpr, rhs: DataExpr) -> Self {
        Self { vars, lhs, rhs }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSpec {
    pub sorts: Vec<Ident>,
    pub constructors: Vec<OpId>,
    pub mappings: Vec<OpId>,
    pub equations: Vec<DataEquation>,
}

impl DataSpec {
    pub fn constructors_of<'a>(&'a self, sort: &'a Sort) -> impl Iterator<Item = &'a OpId> {
        self.constructors.iter().filter(move |op| &op.codomain == sort)
    }

    pub fn mappings_of<'a>(&'a self, sort: &'a Sort) -> impl Iterator<Item = &'a OpId> {
        self.mappings.iter().filter(move |op| &op.codomain == sort)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionDecl {
    pub name: Ident,
    #[serde(default)]
    pub sorts: Vec<Sort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEquation {
    pub name: Ident,
    #[serde(default)]
    pub params: Vec<Variable>,
    pub body: ProcExpr,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub can_terminate: bool,
}

impl ProcessEquation {
    pub fn new(name: &str, params: Vec<Variable>, body: ProcExpr) -> Self {
        Self {
            name: name.into(),
            params,
            body,
            status: None,
            can_terminate: false,
        }
    }
}

/// A type-checked input: data, actions, global variables, the process
/// equations (addressed by [`ProcId`]) and the initial process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    #[serde(default)]
    pub data: DataSpec,
    #[serde(default)]
    pub actions: Vec<ActionDecl>,
    #[serde(default)]
    pub globals: Vec<Variable>,
    #[serde(default)]
    pub equations: Vec<ProcessEquation>,
    pub init: ProcExpr,
}

impl Specification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equation with body `delta`; use [`Specification::define`] to
    /// give it a body once all processes it refers to are declared.
    pub fn declare_process(&mut self, name: &str, params: Vec<Variable>) -> ProcId {
        self.equations
            .push(ProcessEquation::new(name, params, ProcExpr::Delta));
        ProcId(self.equations.len() - 1)
    }

    pub fn define(&mut self, id: ProcId, body: ProcExpr) {
        self.equations[id.0].body = body;
    }

    pub fn declare_action(&mut self, name: &str, sorts: Vec<Sort>) {
        self.actions.push(ActionDecl {
            name: name.into(),
            sorts,
        });
    }

    pub fn declare_sort(&mut self, name: &str) -> Sort {
        self.data.sorts.push(name.into());
        Sort::named(name)
    }

    pub fn declare_constructor(&mut self, name: &str, domain: Vec<Sort>, codomain: Sort) -> OpId {
        let op = OpId::new(name, domain, codomain);
        self.data.constructors.push(op.clone());
        op
    }

    pub fn declare_mapping(&mut self, name: &str, domain: Vec<Sort>, codomain: Sort) -> OpId {
        let op = OpId::new(name, domain, codomain);
        self.data.mappings.push(op.clone());
        op
    }

    pub fn action_decl(&self, name: &str) -> Option<&ActionDecl> {
        self.actions.iter().find(|a| &*a.name == name)
    }

    /// Every identifier occurring in the specification.
    pub fn identifiers(&self) -> Vec<Ident> {
        let mut out: Vec<Ident> = vec![];
        out.extend(self.data.sorts.iter().cloned());
        for op in self.data.constructors.iter().chain(&self.data.mappings) {
            out.push(op.name.clone());
        }
        for eq in &self.data.equations {
            out.extend(eq.vars.iter().map(|v| v.name.clone()));
            collect_data_idents(&eq.lhs, &mut out);
            collect_data_idents(&eq.rhs, &mut out);
        }
        out.extend(self.actions.iter().map(|a| a.name.clone()));
        out.extend(self.globals.iter().map(|v| v.name.clone()));
        for eq in &self.equations {
            out.push(eq.name.clone());
            out.extend(eq.params.iter().map(|v| v.name.clone()));
            collect_proc_idents(&eq.body, &mut out);
        }
        collect_proc_idents(&self.init, &mut out);
        out
    }
}

fn collect_data_idents(e: &DataExpr, out: &mut Vec<Ident>) {
    e.for_each(&mut |node| match node {
        DataExpr::Var(v) => out.push(v.name.clone()),
        DataExpr::Apply(op, _) => out.push(op.name.clone()),
        DataExpr::Exists(vars, _) => out.extend(vars.iter().map(|v| v.name.clone())),
        _ => {}
    });
}

fn collect_proc_idents(p: &ProcExpr, out: &mut Vec<Ident>) {
    p.for_each(&mut |node| match node {
        ProcExpr::Action(a) => {
            out.push(a.name.clone());
            a.args.iter().for_each(|e| collect_data_idents(e, out));
        }
        ProcExpr::Call(_, args) => args.iter().for_each(|e| collect_data_idents(e, out)),
        ProcExpr::Sum(vars, _) => out.extend(vars.iter().map(|v| v.name.clone())),
        ProcExpr::Cond(c, ..) => collect_data_idents(c, out),
        ProcExpr::At(_, t) => collect_data_idents(t, out),
        ProcExpr::Rename(rules, _) => {
            out.extend(rules.iter().flat_map(|r| [r.from.clone(), r.to.clone()]));
        }
        ProcExpr::Comm(rules, _) => {
            for rule in rules {
                out.extend(rule.lhs.iter().cloned());
                out.push(rule.rhs.clone());
            }
        }
        _ => {}
    });
}

/// Arena of process equations. Entries are appended, never removed.
#[derive(Debug, Default)]
pub struct ProcTable {
    equations: Vec<ProcessEquation>,
    generated: HashMap<(Vec<Variable>, ProcExpr), ProcId>,
}

impl ProcTable {
    pub fn new(equations: Vec<ProcessEquation>) -> Self {
        Self {
            equations,
            generated: HashMap::new(),
        }
    }

    pub fn get(&self, id: ProcId) -> &ProcessEquation {
        &self.equations[id.0]
    }

    pub fn get_mut(&mut self, id: ProcId) -> &mut ProcessEquation {
        &mut self.equations[id.0]
    }

    pub fn contains(&self, id: ProcId) -> bool {
        id.0 < self.equations.len()
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ProcId> + use<> {
        (0..self.equations.len()).map(ProcId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcId, &ProcessEquation)> {
        self.equations
            .iter()
            .enumerate()
            .map(|(i, eq)| (ProcId(i), eq))
    }

    pub fn push(&mut self, equation: ProcessEquation) -> ProcId {
        self.equations.push(equation);
        ProcId(self.equations.len() - 1)
    }

    /// Returns the generated pCRL equation with exactly these parameters and
    /// body, appending a new one named `name` when there is none.
    pub fn insert_if_absent(
        &mut self,
        params: Vec<Variable>,
        body: ProcExpr,
        name: impl FnOnce() -> Ident,
    ) -> (ProcId, bool) {
        let key = (params, body);
        if let Some(id) = self.generated.get(&key) {
            return (*id, false);
        }
        let (params, body) = key.clone();
        let id = self.push(ProcessEquation {
            name: name(),
            params,
            body,
            status: Some(Status::Pcrl),
            can_terminate: false,
        });
        self.generated.insert(key, id);
        (id, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_if_absent_reuses_equations() {
        let mut table = ProcTable::default();
        let body = ProcExpr::seq(ProcExpr::action("a", vec![]), ProcExpr::Delta);
        let (first, new_first) = table.insert_if_absent(vec![], body.clone(), || "X".into());
        let (second, new_second) = table.insert_if_absent(vec![], body, || "Y".into());
        assert!(new_first);
        assert!(!new_second);
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(first).status, Some(Status::Pcrl));
    }

    #[test]
    fn test_identifiers_cover_binders_and_actions() {
        let mut spec = Specification::new();
        let d = Variable::new("d", Sort::Nat);
        let p = spec.declare_process("P", vec![]);
        spec.declare_action("a", vec![Sort::Nat]);
        spec.define(
            p,
            ProcExpr::sum(vec![d.clone()], ProcExpr::action("a", vec![DataExpr::var(&d)])),
        );
        let names = spec.identifiers();
        for expected in ["P", "a", "d"] {
            assert!(names.iter().any(|n| &**n == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_specification_reads_json() {
        let json = r#"{
            "actions": [{"name": "a"}],
            "equations": [{"name": "P", "body": {"Seq": [{"Action": {"name": "a", "args": []}}, {"Call": [0, []]}]}}],
            "init": {"Call": [0, []]}
        }"#;
        let spec: Specification = serde_json::from_str(json).unwrap();
        assert_eq!(spec.equations.len(), 1);
        assert_eq!(spec.init, ProcExpr::call(ProcId(0), vec![]));
    }
}
