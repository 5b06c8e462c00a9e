//! Splits the process equations into the mCRL and pCRL fragments.

use std::collections::HashMap;

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{Error, Result};
use crate::term::{ProcExpr, ProcId, ProcTable, Status};

/// Assigns a status to every equation reachable from `init` and returns the
/// pCRL equations in table order.
pub fn classify(table: &mut ProcTable, init: &ProcExpr) -> Result<Vec<ProcId>> {
    reject_unsupported(table, init)?;

    for id in table.ids() {
        table.get_mut(id).status = None;
    }
    term_status(table, init, Status::Mcrl)?;

    check_mcrl_recursion(table)?;

    let pcrl: Vec<ProcId> = table
        .iter()
        .filter(|(_, eq)| eq.status == Some(Status::Pcrl))
        .map(|(id, _)| id)
        .collect();
    let reached = !pcrl.is_empty()
        || has_pcrl_operand(init)
        || table
            .iter()
            .any(|(_, eq)| eq.status == Some(Status::Mcrl) && has_pcrl_operand(&eq.body));
    if !reached {
        return Err(Error::Structural(
            "no pCRL process reachable to linearize".into(),
        ));
    }
    log::info!("classified {} pCRL equations", pcrl.len());
    Ok(pcrl)
}

fn reject_unsupported(table: &ProcTable, init: &ProcExpr) -> Result<()> {
    let bodies = table
        .iter()
        .map(|(_, eq)| (eq.name.to_string(), &eq.body))
        .chain(std::iter::once(("the initial process".to_string(), init)));
    for (place, body) in bodies {
        let mut found = None;
        body.for_each(&mut |node| match node {
            ProcExpr::LeftMerge(..) => found = found.or(Some("left merge")),
            ProcExpr::BoundedInit(..) => found = found.or(Some("bounded initialisation")),
            _ => {}
        });
        if let Some(operator) = found {
            return Err(Error::Structural(format!(
                "the {operator} operator in {place} cannot be linearized"
            )));
        }
    }
    Ok(())
}

fn is_mcrl_operator(expr: &ProcExpr) -> bool {
    matches!(
        expr,
        ProcExpr::Merge(..)
            | ProcExpr::Hide(..)
            | ProcExpr::Rename(..)
            | ProcExpr::Allow(..)
            | ProcExpr::Block(..)
            | ProcExpr::Comm(..)
    )
}

/// Whether an mCRL term has an operand that is a pCRL term other than a
/// process reference.
fn has_pcrl_operand(expr: &ProcExpr) -> bool {
    match expr {
        ProcExpr::Merge(l, r) => has_pcrl_operand(l) || has_pcrl_operand(r),
        ProcExpr::Hide(_, p)
        | ProcExpr::Rename(_, p)
        | ProcExpr::Allow(_, p)
        | ProcExpr::Block(_, p)
        | ProcExpr::Comm(_, p) => has_pcrl_operand(p),
        ProcExpr::Call(..) => false,
        _ => true,
    }
}

fn operator_name(expr: &ProcExpr) -> &'static str {
    match expr {
        ProcExpr::Choice(..) => "choice",
        ProcExpr::Seq(..) => "sequential composition",
        ProcExpr::Sum(..) => "sum",
        ProcExpr::Cond(..) => "conditional",
        ProcExpr::At(..) => "time",
        ProcExpr::Sync(..) => "synchronization",
        _ => "process",
    }
}

fn term_status(table: &mut ProcTable, expr: &ProcExpr, status: Status) -> Result<Status> {
    match expr {
        ProcExpr::Delta | ProcExpr::Tau | ProcExpr::Action(_) => Ok(Status::Pcrl),
        ProcExpr::Call(id, _) => process_status(table, *id, status),
        ProcExpr::Choice(l, r)
        | ProcExpr::Seq(l, r)
        | ProcExpr::Sync(l, r)
        | ProcExpr::Cond(_, l, r) => {
            pcrl_operand(table, expr, l)?;
            pcrl_operand(table, expr, r)?;
            Ok(Status::Pcrl)
        }
        ProcExpr::Sum(_, p) | ProcExpr::At(p, _) => {
            pcrl_operand(table, expr, p)?;
            Ok(Status::Pcrl)
        }
        ProcExpr::Merge(l, r) => {
            mcrl_only(expr, status)?;
            term_status(table, l, Status::Mcrl)?;
            term_status(table, r, Status::Mcrl)?;
            Ok(Status::Mcrl)
        }
        ProcExpr::Hide(_, p)
        | ProcExpr::Rename(_, p)
        | ProcExpr::Allow(_, p)
        | ProcExpr::Block(_, p)
        | ProcExpr::Comm(_, p) => {
            mcrl_only(expr, status)?;
            term_status(table, p, Status::Mcrl)?;
            Ok(Status::Mcrl)
        }
        ProcExpr::LeftMerge(..) | ProcExpr::BoundedInit(..) => Err(Error::Structural(
            "left merge and bounded initialisation cannot be linearized".into(),
        )),
    }
}

fn pcrl_operand(table: &mut ProcTable, parent: &ProcExpr, operand: &ProcExpr) -> Result<()> {
    if term_status(table, operand, Status::Pcrl)? == Status::Mcrl {
        return Err(Error::Structural(format!(
            "mCRL operators occur within the scope of a {} operator",
            operator_name(parent)
        )));
    }
    Ok(())
}

fn mcrl_only(expr: &ProcExpr, status: Status) -> Result<()> {
    if status == Status::Pcrl {
        return Err(Error::Structural(format!(
            "parallel or communication operator occurs in the scope of pCRL operators: {expr}"
        )));
    }
    Ok(())
}

/// Each equation is entered at most once per status.
fn process_status(table: &mut ProcTable, id: ProcId, status: Status) -> Result<Status> {
    match (table.get(id).status, status) {
        (None, Status::Pcrl) => {
            table.get_mut(id).status = Some(Status::Pcrl);
            let body = table.get(id).body.clone();
            if term_status(table, &body, Status::Pcrl)? == Status::Mcrl {
                return Err(Error::Structural(format!(
                    "process {} contains mCRL operators but is used in a pCRL context",
                    table.get(id).name
                )));
            }
            Ok(Status::Pcrl)
        }
        (None, Status::Mcrl) => {
            // pCRL until the body shows an mCRL operator; a body that only
            // calls itself is then left to the guardedness check.
            table.get_mut(id).status = Some(Status::Pcrl);
            let body = table.get(id).body.clone();
            let found = term_status(table, &body, Status::Mcrl)?;
            table.get_mut(id).status = Some(found);
            Ok(found)
        }
        (Some(Status::Mcrl), Status::Pcrl) => {
            table.get_mut(id).status = Some(Status::Pcrl);
            let body = table.get(id).body.clone();
            if is_mcrl_operator(&body)
                || term_status(table, &body, Status::Pcrl)? == Status::Mcrl
            {
                return Err(Error::Structural(format!(
                    "process {} is used in a pCRL context but contains mCRL operators",
                    table.get(id).name
                )));
            }
            Ok(Status::Pcrl)
        }
        (Some(known), _) => Ok(known),
    }
}

/// Recursion through parallel or communication operators has no finite
/// linear form.
fn check_mcrl_recursion(table: &ProcTable) -> Result<()> {
    let mut graph: DiGraph<ProcId, ()> = DiGraph::new();
    let mut nodes: HashMap<ProcId, NodeIndex> = HashMap::new();
    let mcrl: Vec<ProcId> = table
        .iter()
        .filter(|(_, eq)| eq.status == Some(Status::Mcrl))
        .map(|(id, _)| id)
        .collect();
    for id in &mcrl {
        nodes.insert(*id, graph.add_node(*id));
    }
    for id in &mcrl {
        table.get(*id).body.for_each(&mut |node| {
            if let ProcExpr::Call(callee, _) = node
                && let Some(target) = nodes.get(callee)
            {
                graph.add_edge(nodes[id], *target, ());
            }
        });
    }
    if !is_cyclic_directed(&graph) {
        return Ok(());
    }
    let cycle = tarjan_scc(&graph)
        .into_iter()
        .find(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .unwrap_or_default();
    let names: Vec<String> = cycle
        .iter()
        .map(|n| table.get(graph[*n]).name.to_string())
        .collect();
    Err(Error::Structural(format!(
        "recursion through parallel or communication operators: {}",
        names.join(" -> ")
    )))
}
