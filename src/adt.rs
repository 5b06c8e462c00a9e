//! Generated abstract data types: enumerations, case functions, stacks and
//! dummy values.

use std::collections::{HashMap, HashSet};

use crate::context::Context;
use crate::error::{Error, Result, WarningKind};
use crate::term::{DataEquation, DataExpr, OpId, Sort, Variable};

#[derive(Debug, Clone)]
pub struct EnumType {
    pub sort: Sort,
    pub elements: Vec<DataExpr>,
}

/// A stack of process frames `push(state, values..., rest)`.
#[derive(Debug, Clone)]
pub struct StackType {
    pub sort: Sort,
    pub empty: OpId,
    pub push: OpId,
    pub pop: OpId,
    pub is_empty: OpId,
    pub get_state: OpId,
    pub getters: Vec<OpId>,
}

impl StackType {
    pub fn empty_stack(&self) -> DataExpr {
        DataExpr::constant(&self.empty)
    }

    pub fn push(&self, state: DataExpr, values: Vec<DataExpr>, rest: DataExpr) -> DataExpr {
        let mut args = Vec::with_capacity(values.len() + 2);
        args.push(state);
        args.extend(values);
        args.push(rest);
        DataExpr::apply(&self.push, args)
    }

    pub fn pop(&self, stack: DataExpr) -> DataExpr {
        DataExpr::apply(&self.pop, vec![stack])
    }

    pub fn is_empty(&self, stack: DataExpr) -> DataExpr {
        DataExpr::apply(&self.is_empty, vec![stack])
    }

    pub fn get_state(&self, stack: DataExpr) -> DataExpr {
        DataExpr::apply(&self.get_state, vec![stack])
    }

    pub fn get(&self, index: usize, stack: DataExpr) -> DataExpr {
        DataExpr::apply(&self.getters[index], vec![stack])
    }
}

#[derive(Debug, Default)]
pub(crate) struct AdtCache {
    enums: HashMap<usize, EnumType>,
    cases: HashMap<(usize, Sort), OpId>,
    stacks: HashMap<Vec<Sort>, StackType>,
    dummies: HashMap<Sort, DataExpr>,
}

fn sort_tag(sort: &Sort) -> String {
    sort.to_string()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

impl Context {
    /// A sort with exactly `n` distinct values; two values are the booleans.
    pub fn enumerated_type(&mut self, n: usize) -> Result<EnumType> {
        if n == 0 {
            return Err(Error::Encoding(
                "cannot create an enumerated type with zero elements".into(),
            ));
        }
        if let Some(known) = self.adt.enums.get(&n) {
            return Ok(known.clone());
        }
        let enumeration = if n == 2 {
            EnumType {
                sort: Sort::Bool,
                elements: vec![DataExpr::Bool(true), DataExpr::Bool(false)],
            }
        } else {
            let name = self.fresh(&format!("Enum{n}"));
            let sort = self.declare_sort(name);
            let mut elements = Vec::with_capacity(n);
            for i in 1..=n {
                let op = OpId::constant(&self.fresh(&format!("e{i}_{n}")), sort.clone());
                self.declare_constructor(op.clone());
                elements.push(DataExpr::constant(&op));
            }
            for (i, a) in elements.iter().enumerate() {
                for (j, b) in elements.iter().enumerate() {
                    self.add_equation(DataEquation::new(
                        vec![],
                        DataExpr::Eq(Box::new(a.clone()), Box::new(b.clone())),
                        DataExpr::Bool(i == j),
                    ));
                }
            }
            EnumType { sort, elements }
        };
        self.adt.enums.insert(n, enumeration.clone());
        Ok(enumeration)
    }

    /// `C(e, x1, ..., xn)` selecting `xi` for the i-th element of the
    /// `n`-element enumeration.
    pub fn case_function(&mut self, n: usize, sort: &Sort) -> Result<OpId> {
        if let Some(op) = self.adt.cases.get(&(n, sort.clone())) {
            return Ok(op.clone());
        }
        let enumeration = self.enumerated_type(n)?;
        let mut domain = vec![enumeration.sort.clone()];
        domain.extend(std::iter::repeat_n(sort.clone(), n));
        let op = OpId::new(
            &self.fresh(&format!("C{n}_{}", sort_tag(sort))),
            domain,
            sort.clone(),
        );
        self.declare_mapping(op.clone());

        let selector = Variable::new("e", enumeration.sort.clone());
        let xs: Vec<Variable> = (1..=n)
            .map(|i| Variable::new(&format!("x{i}"), sort.clone()))
            .collect();

        let mut same = vec![DataExpr::var(&selector)];
        same.extend(std::iter::repeat_n(DataExpr::var(&xs[0]), n));
        self.add_equation(DataEquation::new(
            vec![selector.clone(), xs[0].clone()],
            DataExpr::apply(&op, same),
            DataExpr::var(&xs[0]),
        ));
        for (element, x) in enumeration.elements.iter().zip(&xs) {
            let mut args = vec![element.clone()];
            args.extend(xs.iter().map(DataExpr::var));
            self.add_equation(DataEquation::new(
                xs.clone(),
                DataExpr::apply(&op, args),
                DataExpr::var(x),
            ));
        }
        self.adt.cases.insert((n, sort.clone()), op.clone());
        Ok(op)
    }

    /// The stack sort for frames holding values of `sorts`, shared by every
    /// process group with the same parameter signature.
    pub fn stack_type(&mut self, sorts: &[Sort]) -> StackType {
        if let Some(stack) = self.adt.stacks.get(sorts) {
            return stack.clone();
        }
        let name = self.fresh("Stack");
        let sort = self.declare_sort(name);

        let empty = OpId::constant(&self.fresh("emptystack"), sort.clone());
        let mut push_domain = vec![Sort::Pos];
        push_domain.extend(sorts.iter().cloned());
        push_domain.push(sort.clone());
        let push = OpId::new(&self.fresh("push"), push_domain, sort.clone());
        self.declare_constructor(empty.clone());
        self.declare_constructor(push.clone());

        let pop = OpId::new(&self.fresh("pop"), vec![sort.clone()], sort.clone());
        let is_empty = OpId::new(&self.fresh("isempty"), vec![sort.clone()], Sort::Bool);
        let get_state = OpId::new(&self.fresh("getstate"), vec![sort.clone()], Sort::Pos);
        let getters: Vec<OpId> = sorts
            .iter()
            .map(|s| OpId::new(&self.fresh("get"), vec![sort.clone()], s.clone()))
            .collect();
        for op in [&pop, &is_empty, &get_state].into_iter().chain(&getters) {
            self.declare_mapping(op.clone());
        }

        let stack = StackType {
            sort: sort.clone(),
            empty,
            push,
            pop,
            is_empty,
            get_state,
            getters,
        };

        let state = Variable::new("s", Sort::Pos);
        let rest = Variable::new("st", sort);
        let values: Vec<Variable> = sorts
            .iter()
            .enumerate()
            .map(|(i, s)| Variable::new(&format!("d{}", i + 1), s.clone()))
            .collect();
        let mut vars = vec![state.clone()];
        vars.extend(values.iter().cloned());
        vars.push(rest.clone());
        let frame = stack.push(
            DataExpr::var(&state),
            values.iter().map(DataExpr::var).collect(),
            DataExpr::var(&rest),
        );

        self.add_equation(DataEquation::new(
            vec![],
            stack.is_empty(stack.empty_stack()),
            DataExpr::Bool(true),
        ));
        self.add_equation(DataEquation::new(
            vars.clone(),
            stack.is_empty(frame.clone()),
            DataExpr::Bool(false),
        ));
        self.add_equation(DataEquation::new(
            vars.clone(),
            stack.pop(frame.clone()),
            DataExpr::var(&rest),
        ));
        self.add_equation(DataEquation::new(
            vars.clone(),
            stack.get_state(frame.clone()),
            DataExpr::var(&state),
        ));
        for (i, value) in values.iter().enumerate() {
            self.add_equation(DataEquation::new(
                vars.clone(),
                stack.get(i, frame.clone()),
                DataExpr::var(value),
            ));
        }

        self.adt.stacks.insert(sorts.to_vec(), stack.clone());
        stack
    }

    /// A fixed value of `sort` for parameters a transition does not use.
    pub fn dummy(&mut self, sort: &Sort) -> Result<DataExpr> {
        self.dummy_avoiding(sort, &mut HashSet::new())
    }

    fn dummy_avoiding(&mut self, sort: &Sort, visiting: &mut HashSet<Sort>) -> Result<DataExpr> {
        if let Some(known) = self.adt.dummies.get(sort) {
            return Ok(known.clone());
        }
        let value = match sort {
            Sort::Bool => DataExpr::Bool(false),
            Sort::Pos => DataExpr::number(1, Sort::Pos),
            Sort::Nat | Sort::Int | Sort::Real => DataExpr::number(0, sort.clone()),
            Sort::Unknown => {
                return Err(Error::Consistency(
                    "cannot build a value of the unknown sort".into(),
                ));
            }
            Sort::Named(_) => {
                visiting.insert(sort.clone());
                let value = self.named_dummy(sort, visiting)?;
                visiting.remove(sort);
                value
            }
        };
        self.adt.dummies.insert(sort.clone(), value.clone());
        Ok(value)
    }

    fn named_dummy(&mut self, sort: &Sort, visiting: &mut HashSet<Sort>) -> Result<DataExpr> {
        let constant = self
            .constructors()
            .chain(self.mappings())
            .find(|op| &op.codomain == sort && op.is_constant())
            .cloned();
        if let Some(op) = constant {
            return Ok(DataExpr::constant(&op));
        }

        let buildable = self
            .constructors()
            .find(|op| {
                &op.codomain == sort
                    && op
                        .domain
                        .iter()
                        .all(|s| !visiting.contains(s) && *s != Sort::Unknown)
            })
            .cloned();
        if let Some(op) = buildable {
            let mut args = Vec::with_capacity(op.domain.len());
            for s in &op.domain {
                args.push(self.dummy_avoiding(s, visiting)?);
            }
            return Ok(DataExpr::apply(&op, args));
        }

        if self.options.allow_free_variables {
            let var = self.fresh_var("dummy", sort.clone());
            self.declare_global(var.clone());
            self.warn(
                WarningKind::DummyVariable,
                format!("using free variable {} as a value of sort {sort}", var.name),
            );
            return Ok(DataExpr::var(&var));
        }

        let op = OpId::constant(&self.fresh(&format!("dummy{}", sort_tag(sort))), sort.clone());
        self.declare_mapping(op.clone());
        self.warn(
            WarningKind::DummyConstant,
            format!("declared constant {} as a value of sort {sort}", op.name),
        );
        Ok(DataExpr::constant(&op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::term::Specification;

    fn context() -> Context {
        Context::new(Specification::new(), Options::default())
    }

    #[test]
    fn test_zero_element_enumeration_is_rejected() {
        let mut ctx = context();
        assert!(matches!(ctx.enumerated_type(0), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_two_element_enumeration_is_bool() {
        let mut ctx = context();
        let enumeration = ctx.enumerated_type(2).unwrap();
        assert_eq!(enumeration.sort, Sort::Bool);
        assert!(ctx.decls.sorts.is_empty());
    }

    #[test]
    fn test_enumerations_are_cached() {
        let mut ctx = context();
        let first = ctx.enumerated_type(3).unwrap();
        let second = ctx.enumerated_type(3).unwrap();
        assert_eq!(first.sort, second.sort);
        assert_eq!(ctx.decls.sorts.len(), 1);
        assert_eq!(ctx.decls.constructors.len(), 3);
    }

    #[test]
    fn test_case_function_selects_by_element() {
        let mut ctx = context();
        let case = ctx.case_function(3, &Sort::Nat).unwrap();
        let enumeration = ctx.enumerated_type(3).unwrap();
        let term = DataExpr::apply(
            &case,
            vec![
                enumeration.elements[1].clone(),
                DataExpr::number(10, Sort::Nat),
                DataExpr::number(20, Sort::Nat),
                DataExpr::number(30, Sort::Nat),
            ],
        );
        assert_eq!(ctx.rewrite(&term), DataExpr::number(20, Sort::Nat));
    }

    #[test]
    fn test_stack_operations_rewrite() {
        let mut ctx = context();
        let stack = ctx.stack_type(&[Sort::Nat]);
        let frame = stack.push(
            DataExpr::number(2, Sort::Pos),
            vec![DataExpr::number(5, Sort::Nat)],
            stack.empty_stack(),
        );
        assert_eq!(ctx.rewrite(&stack.get_state(frame.clone())), DataExpr::number(2, Sort::Pos));
        assert_eq!(ctx.rewrite(&stack.get(0, frame.clone())), DataExpr::number(5, Sort::Nat));
        assert!(ctx.rewrite(&stack.is_empty(stack.pop(frame))).is_true());
        assert_eq!(ctx.stack_type(&[Sort::Nat]).sort, stack.sort);
    }

    #[test]
    fn test_dummy_prefers_constructors() {
        let mut spec = Specification::new();
        let sort = spec.declare_sort("D");
        spec.declare_constructor("d1", vec![], sort.clone());
        let mut ctx = Context::new(spec, Options::default());
        assert_eq!(ctx.dummy(&sort).unwrap().to_string(), "d1");
        assert!(ctx.warnings.is_empty());
    }

    #[test]
    fn test_dummy_falls_back_to_a_fresh_constant() {
        let mut ctx = context();
        let sort = Sort::named("D");
        let value = ctx.dummy(&sort).unwrap();
        assert_eq!(ctx.decls.mappings.len(), 1);
        assert_eq!(ctx.warnings[0].kind, WarningKind::DummyConstant);
        assert_eq!(ctx.dummy(&sort).unwrap(), value);
    }

    #[test]
    fn test_dummy_uses_a_free_variable_when_allowed() {
        let options = Options {
            allow_free_variables: true,
            ..Options::default()
        };
        let mut ctx = Context::new(Specification::new(), options);
        let sort = Sort::named("D");
        let DataExpr::Var(var) = ctx.dummy(&sort).unwrap() else {
            panic!("expected a variable");
        };
        assert_eq!(var.sort, sort);
        assert!(ctx.global_vars().contains(&var));
        assert!(ctx.decls.mappings.is_empty());
        assert_eq!(ctx.warnings[0].kind, WarningKind::DummyVariable);
    }
}
