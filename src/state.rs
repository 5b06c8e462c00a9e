//! Control-state representations for a group of pCRL equations.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::adt::StackType;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::gnf::Continuation;
use crate::lpe::NextState;
use crate::term::{DataExpr, ProcId, Sort, Substitution, Variable};

#[derive(Debug, Clone)]
pub enum StateEncoding {
    /// One equation; no control cell.
    Single,
    Index(Variable),
    Enumerated {
        var: Variable,
        values: Vec<DataExpr>,
    },
    Binary(Vec<Variable>),
    Stack {
        var: Variable,
        stack: StackType,
    },
}

#[derive(Debug, Clone)]
pub struct StateLayout {
    pub members: Vec<ProcId>,
    /// Parameters of the resulting LPE.
    pub params: Vec<Variable>,
    pub encoding: StateEncoding,
    data_params: Vec<Variable>,
    /// For each member, the data parameter holding each formal parameter.
    slots: HashMap<ProcId, Vec<usize>>,
}

/// Equations reachable from `entry` through continuations, entry first.
fn group(ctx: &Context, entry: ProcId) -> Result<Vec<ProcId>> {
    let mut graph: DiGraph<ProcId, ()> = DiGraph::new();
    let mut nodes: HashMap<ProcId, NodeIndex> = HashMap::new();
    let mut pending = vec![entry];
    nodes.insert(entry, graph.add_node(entry));
    while let Some(id) = pending.pop() {
        let gnf = ctx.gnf.body(id).ok_or_else(|| {
            Error::Consistency(format!(
                "process {} has no normal form",
                ctx.table.get(id).name
            ))
        })?;
        for next in gnf.successors() {
            let target = *nodes.entry(next).or_insert_with(|| {
                pending.push(next);
                graph.add_node(next)
            });
            graph.add_edge(nodes[&id], target, ());
        }
    }
    let mut members = vec![];
    let mut dfs = Dfs::new(&graph, nodes[&entry]);
    while let Some(node) = dfs.next(&graph) {
        members.push(graph[node]);
    }
    Ok(members)
}

fn binary_width(n: usize) -> usize {
    let mut width = 0;
    while (1usize << width) < n {
        width += 1;
    }
    width
}

impl StateLayout {
    pub fn allocate(ctx: &mut Context, entry: ProcId) -> Result<Self> {
        let members = group(ctx, entry)?;
        let globals = ctx.global_vars();

        let mut data_params: Vec<Variable> = vec![];
        let mut slots = HashMap::new();
        for id in &members {
            let mut member_slots = vec![];
            for formal in ctx.table.get(*id).params.clone() {
                let slot = match data_params.iter().position(|p| *p == formal) {
                    Some(slot) => slot,
                    None => {
                        let clash = data_params.iter().any(|p| p.name == formal.name)
                            || globals.iter().any(|g| g.name == formal.name);
                        let param = if clash {
                            ctx.fresh_var(&formal.name, formal.sort.clone())
                        } else {
                            formal
                        };
                        data_params.push(param);
                        data_params.len() - 1
                    }
                };
                member_slots.push(slot);
            }
            slots.insert(*id, member_slots);
        }

        let entry_name = ctx.table.get(entry).name.clone();
        let control_hint = if ctx.options.statenames {
            format!("s{entry_name}")
        } else {
            "s".to_string()
        };
        let n = members.len();
        let encoding = if !ctx.options.regular {
            let sorts: Vec<Sort> = data_params.iter().map(|p| p.sort.clone()).collect();
            let stack = ctx.stack_type(&sorts);
            let var = ctx.fresh_var(&format!("{control_hint}t"), stack.sort.clone());
            StateEncoding::Stack { var, stack }
        } else if n == 1 {
            StateEncoding::Single
        } else if ctx.options.old_state {
            StateEncoding::Index(ctx.fresh_var(&control_hint, Sort::Pos))
        } else if ctx.options.binary {
            let vars = (0..binary_width(n))
                .map(|_| ctx.fresh_var(&format!("b{control_hint}"), Sort::Bool))
                .collect();
            StateEncoding::Binary(vars)
        } else {
            let enumeration = ctx.enumerated_type(n)?;
            StateEncoding::Enumerated {
                var: ctx.fresh_var(&control_hint, enumeration.sort.clone()),
                values: enumeration.elements,
            }
        };

        let params = match &encoding {
            StateEncoding::Stack { var, .. } => vec![var.clone()],
            StateEncoding::Single => data_params.clone(),
            StateEncoding::Index(var) | StateEncoding::Enumerated { var, .. } => {
                std::iter::once(var.clone()).chain(data_params.iter().cloned()).collect()
            }
            StateEncoding::Binary(vars) => vars.iter().chain(&data_params).cloned().collect(),
        };
        log::info!(
            "process {entry_name}: {n} control states, {} parameters",
            params.len()
        );

        Ok(Self {
            members,
            params,
            encoding,
            data_params,
            slots,
        })
    }

    fn index_of(&self, id: ProcId) -> Result<usize> {
        self.members
            .iter()
            .position(|m| *m == id)
            .ok_or_else(|| Error::Consistency(format!("process {} is outside its group", id.0)))
    }

    fn code(&self, index: usize) -> Vec<DataExpr> {
        match &self.encoding {
            StateEncoding::Single => vec![],
            StateEncoding::Index(_) | StateEncoding::Stack { .. } => {
                vec![DataExpr::number(index as i64 + 1, Sort::Pos)]
            }
            StateEncoding::Enumerated { values, .. } => vec![values[index].clone()],
            StateEncoding::Binary(vars) => (0..vars.len())
                .map(|bit| DataExpr::Bool((index >> bit) & 1 == 1))
                .collect(),
        }
    }

    /// The condition under which the LPE is in the state of `id`.
    pub fn state_condition(&self, id: ProcId) -> Result<DataExpr> {
        let code = self.code(self.index_of(id)?);
        let cells: Vec<DataExpr> = match &self.encoding {
            StateEncoding::Single => vec![],
            StateEncoding::Index(var) | StateEncoding::Enumerated { var, .. } => {
                vec![DataExpr::var(var)]
            }
            StateEncoding::Binary(vars) => vars.iter().map(DataExpr::var).collect(),
            StateEncoding::Stack { var, stack } => vec![stack.get_state(DataExpr::var(var))],
        };
        Ok(DataExpr::conjunction(
            cells.into_iter().zip(code).map(|(cell, value)| match value {
                DataExpr::Bool(true) => cell,
                DataExpr::Bool(false) => DataExpr::not(cell),
                value => DataExpr::equal(cell, value),
            }),
        ))
    }

    /// Replaces the formal parameters of `id` by their representation.
    pub fn param_substitution(&self, ctx: &Context, id: ProcId) -> Substitution {
        let formals = &ctx.table.get(id).params;
        let mut sigma = Substitution::new();
        for (formal, slot) in formals.iter().zip(&self.slots[&id]) {
            let value = match &self.encoding {
                StateEncoding::Stack { var, stack } => stack.get(*slot, DataExpr::var(var)),
                _ => DataExpr::var(&self.data_params[*slot]),
            };
            sigma.insert(formal.clone(), value);
        }
        sigma
    }

    fn frame_values(&self, ctx: &mut Context, c: &Continuation) -> Result<Vec<DataExpr>> {
        let slots = self.slots.get(&c.proc).ok_or_else(|| {
            Error::Consistency(format!(
                "process {} is outside its group",
                ctx.table.get(c.proc).name
            ))
        })?;
        let mut values = Vec::with_capacity(self.data_params.len());
        for (i, param) in self.data_params.iter().enumerate() {
            let value = match slots.iter().position(|slot| *slot == i) {
                Some(k) => c.args[k].clone(),
                None => ctx.dummy(&param.sort)?,
            };
            values.push(value);
        }
        Ok(values)
    }

    fn encode(&self, ctx: &mut Context, c: &Continuation) -> Result<Vec<DataExpr>> {
        let mut state = self.code(self.index_of(c.proc)?);
        state.extend(self.frame_values(ctx, c)?);
        Ok(state)
    }

    /// The stack below the current frame; only for the stack encoding.
    pub fn popped(&self) -> Option<(DataExpr, &StackType)> {
        match &self.encoding {
            StateEncoding::Stack { var, stack } => Some((stack.pop(DataExpr::var(var)), stack)),
            _ => None,
        }
    }

    pub fn next_state(
        &self,
        ctx: &mut Context,
        continuation: &[Continuation],
    ) -> Result<NextState> {
        if continuation.is_empty() {
            return Ok(NextState::Terminated);
        }
        if let StateEncoding::Stack { var, stack } = &self.encoding {
            let mut rest = stack.pop(DataExpr::var(var));
            for c in continuation.iter().rev() {
                let code = self.code(self.index_of(c.proc)?).remove(0);
                rest = stack.push(code, self.frame_values(ctx, c)?, rest);
            }
            return Ok(NextState::State(vec![rest]));
        }
        match continuation {
            [c] => Ok(NextState::State(self.encode(ctx, c)?)),
            _ => Err(Error::Consistency(
                "a finite state encoding cannot hold a sequence of processes".into(),
            )),
        }
    }

    pub fn initial_state(&self, ctx: &mut Context, args: &[DataExpr]) -> Result<Vec<DataExpr>> {
        let entry = Continuation {
            proc: self.members[0],
            args: args.to_vec(),
        };
        if let StateEncoding::Stack { stack, .. } = &self.encoding {
            let code = self.code(0).remove(0);
            return Ok(vec![stack.push(
                code,
                self.frame_values(ctx, &entry)?,
                stack.empty_stack(),
            )]);
        }
        self.encode(ctx, &entry)
    }

    /// The current state, unchanged.
    pub fn identity(&self) -> Vec<DataExpr> {
        self.params.iter().map(DataExpr::var).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gnf;
    use crate::options::Options;
    use crate::term::{ProcExpr, Specification};

    fn two_states(options: Options) -> (Context, ProcId, ProcId) {
        let mut spec = Specification::new();
        let n = Variable::new("n", Sort::Nat);
        let p = spec.declare_process("P", vec![n.clone()]);
        let q = spec.declare_process("Q", vec![]);
        spec.define(
            p,
            ProcExpr::seq(
                ProcExpr::action("a", vec![DataExpr::var(&n)]),
                ProcExpr::call(q, vec![]),
            ),
        );
        spec.define(
            q,
            ProcExpr::seq(
                ProcExpr::action("b", vec![]),
                ProcExpr::call(p, vec![DataExpr::number(1, Sort::Nat)]),
            ),
        );
        let bodies: Vec<ProcExpr> = spec.equations.iter().map(|e| e.body.clone()).collect();
        let mut ctx = Context::new(spec, options);
        gnf::set_sequence_limit(&mut ctx, &bodies);
        gnf::transform(&mut ctx, p).unwrap();
        (ctx, p, q)
    }

    #[test]
    fn test_two_states_use_a_boolean() {
        let (mut ctx, p, q) = two_states(Options::default());
        let layout = StateLayout::allocate(&mut ctx, p).unwrap();
        assert_eq!(layout.members, vec![p, q]);
        assert_eq!(layout.params.len(), 2);
        assert_eq!(layout.params[0].sort, Sort::Bool);
        assert_eq!(layout.state_condition(q).unwrap().to_string(), "!(s)");
        let next = layout
            .next_state(&mut ctx, &[Continuation { proc: q, args: vec![] }])
            .unwrap();
        assert_eq!(
            next,
            NextState::State(vec![DataExpr::Bool(false), DataExpr::number(0, Sort::Nat)])
        );
    }

    #[test]
    fn test_index_encoding_counts_from_one() {
        let options = Options {
            old_state: true,
            ..Options::default()
        };
        let (mut ctx, p, q) = two_states(options);
        let layout = StateLayout::allocate(&mut ctx, p).unwrap();
        assert_eq!(layout.params[0].sort, Sort::Pos);
        assert_eq!(layout.state_condition(q).unwrap().to_string(), "s == 2");
    }

    #[test]
    fn test_statenames_name_the_control_cell_after_the_entry() {
        let options = Options {
            statenames: true,
            ..Options::default()
        };
        let (mut ctx, p, q) = two_states(options);
        let layout = StateLayout::allocate(&mut ctx, p).unwrap();
        assert_eq!(&*layout.params[0].name, "sP");
        assert_eq!(layout.state_condition(q).unwrap().to_string(), "!(sP)");
    }

    #[test]
    fn test_binary_encoding_width() {
        assert_eq!(binary_width(2), 1);
        assert_eq!(binary_width(3), 2);
        assert_eq!(binary_width(4), 2);
        assert_eq!(binary_width(5), 3);
    }

    #[test]
    fn test_stack_initial_state_pushes_the_entry() {
        let options = Options {
            regular: false,
            ..Options::default()
        };
        let (mut ctx, p, _) = two_states(options);
        let layout = StateLayout::allocate(&mut ctx, p).unwrap();
        assert!(layout.popped().is_some());
        assert_eq!(layout.params.len(), 1);
        let init = layout
            .initial_state(&mut ctx, &[DataExpr::number(3, Sort::Nat)])
            .unwrap();
        assert_eq!(init[0].to_string(), "push(1, 3, emptystack)");
    }
}
