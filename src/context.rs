//! Shared mutable state threaded through the pipeline.

use std::fmt;

use indexmap::IndexSet;
use serde::Serialize;

use crate::adt::AdtCache;
use crate::error::{Warning, WarningKind};
use crate::gnf::GnfCache;
use crate::options::Options;
use crate::rewrite::{Identity, Rewriter, Simplifier};
use crate::term::{
    ActionDecl, DataEquation, DataExpr, DataSpec, Ident, NameGen, OpId, ProcExpr, ProcId,
    ProcTable, Sort, Specification, Variable,
};

/// Everything the linearizer adds to the input specification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Declarations {
    pub sorts: Vec<Ident>,
    pub constructors: Vec<OpId>,
    pub mappings: Vec<OpId>,
    pub equations: Vec<DataEquation>,
    pub actions: Vec<ActionDecl>,
    pub globals: Vec<Variable>,
}

impl Declarations {
    pub fn is_empty(&self) -> bool {
        self.sorts.is_empty()
            && self.constructors.is_empty()
            && self.mappings.is_empty()
            && self.equations.is_empty()
            && self.actions.is_empty()
            && self.globals.is_empty()
    }
}

pub struct Context {
    pub options: Options,
    pub table: ProcTable,
    pub names: NameGen,
    pub data: DataSpec,
    pub actions: Vec<ActionDecl>,
    pub globals: Vec<Variable>,
    pub decls: Declarations,
    pub warnings: Vec<Warning>,
    pub(crate) adt: AdtCache,
    pub(crate) gnf: GnfCache,
    rewriter: Box<dyn Rewriter>,
}

impl Context {
    /// Takes ownership of the process equations; `spec.init` is left to the
    /// caller.
    pub fn new(spec: Specification, options: Options) -> Self {
        let mut names = NameGen::new();
        for builtin in ["Bool", "Pos", "Nat", "Int", "Real", "true", "false", "delta", "tau"] {
            names.reserve(builtin);
        }
        for name in spec.identifiers() {
            names.reserve(&name);
        }
        let rewriter: Box<dyn Rewriter> = if options.rewrite {
            Box::new(Simplifier::new(
                &spec.data.equations,
                &spec.data.constructors,
            ))
        } else {
            Box::new(Identity)
        };
        Self {
            options,
            table: ProcTable::new(spec.equations),
            names,
            data: spec.data,
            actions: spec.actions,
            globals: spec.globals,
            decls: Declarations::default(),
            warnings: vec![],
            adt: AdtCache::default(),
            gnf: GnfCache::default(),
            rewriter,
        }
    }

    pub fn rewrite(&self, expr: &DataExpr) -> DataExpr {
        self.rewriter.rewrite(expr)
    }

    pub fn fresh(&mut self, hint: &str) -> Ident {
        self.names.fresh(hint)
    }

    pub fn fresh_var(&mut self, hint: &str, sort: Sort) -> Variable {
        self.names.fresh_var(hint, sort)
    }

    pub fn warn(&mut self, kind: WarningKind, message: String) {
        log::warn!("{message}");
        self.warnings.push(Warning::new(kind, message));
    }

    pub fn declare_sort(&mut self, name: Ident) -> Sort {
        log::debug!("declaring sort {name}");
        self.decls.sorts.push(name.clone());
        Sort::Named(name)
    }

    pub fn declare_constructor(&mut self, op: OpId) {
        self.rewriter.add_constructor(&op);
        self.decls.constructors.push(op);
    }

    pub fn declare_mapping(&mut self, op: OpId) {
        log::debug!("declaring mapping {}", op.name);
        self.decls.mappings.push(op);
    }

    pub fn add_equation(&mut self, equation: DataEquation) {
        log::debug!("equation {} = {}", equation.lhs, equation.rhs);
        self.rewriter.add_equation(&equation);
        self.decls.equations.push(equation);
    }

    pub fn declare_action(&mut self, name: &str, sorts: Vec<Sort>) {
        let known = self
            .actions
            .iter()
            .chain(&self.decls.actions)
            .any(|a| &*a.name == name);
        if !known {
            self.decls.actions.push(ActionDecl {
                name: name.into(),
                sorts,
            });
        }
    }

    /// The generated pCRL equation for `body`, shared with any earlier one
    /// that has the same parameters and body.
    pub fn add_process(&mut self, hint: &str, params: Vec<Variable>, body: ProcExpr) -> ProcId {
        let names = &mut self.names;
        let (id, new) = self
            .table
            .insert_if_absent(params, body, || names.fresh(hint));
        if new {
            let eq = self.table.get(id);
            log::debug!("new process {} = {}", eq.name, eq.body);
        }
        id
    }

    pub fn declare_global(&mut self, var: Variable) {
        self.decls.globals.push(var);
    }

    /// Input and generated global variables.
    pub fn global_vars(&self) -> IndexSet<Variable> {
        self.globals
            .iter()
            .chain(&self.decls.globals)
            .cloned()
            .collect()
    }

    pub fn constructors(&self) -> impl Iterator<Item = &OpId> {
        self.data.constructors.iter().chain(&self.decls.constructors)
    }

    pub fn mappings(&self) -> impl Iterator<Item = &OpId> {
        self.data.mappings.iter().chain(&self.decls.mappings)
    }
}

fn fmt_op(op: &OpId) -> String {
    if op.is_constant() {
        format!("{}: {}", op.name, op.codomain)
    } else {
        let domain: Vec<String> = op.domain.iter().map(ToString::to_string).collect();
        format!("{}: {} -> {}", op.name, domain.join(" # "), op.codomain)
    }
}

impl fmt::Display for Declarations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sort in &self.sorts {
            writeln!(f, "sort {sort};")?;
        }
        for op in &self.constructors {
            writeln!(f, "cons {};", fmt_op(op))?;
        }
        for op in &self.mappings {
            writeln!(f, "map {};", fmt_op(op))?;
        }
        for eq in &self.equations {
            if !eq.vars.is_empty() {
                let vars: Vec<String> = eq.vars.iter().map(ToString::to_string).collect();
                writeln!(f, "var {};", vars.join(", "))?;
            }
            writeln!(f, "eqn {} = {};", eq.lhs, eq.rhs)?;
        }
        for action in &self.actions {
            if action.sorts.is_empty() {
                writeln!(f, "act {};", action.name)?;
            } else {
                let sorts: Vec<String> = action.sorts.iter().map(ToString::to_string).collect();
                writeln!(f, "act {}: {};", action.name, sorts.join(" # "))?;
            }
        }
        Ok(())
    }
}
