use crate::term::{ProcExpr, ProcTable};

/// Computes `can_terminate` for every equation as a least fixed point.
pub fn analyze(table: &mut ProcTable) {
    for id in table.ids() {
        table.get_mut(id).can_terminate = false;
    }
    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut changed = false;
        for id in table.ids() {
            if table.get(id).can_terminate {
                continue;
            }
            if can_terminate(table, &table.get(id).body) {
                table.get_mut(id).can_terminate = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    log::debug!("termination analysis stable after {rounds} rounds");
}

/// Whether `expr` can terminate, given the current flags of the table.
pub fn can_terminate(table: &ProcTable, expr: &ProcExpr) -> bool {
    match expr {
        ProcExpr::Delta => false,
        ProcExpr::Tau | ProcExpr::Action(_) => true,
        ProcExpr::Call(id, _) => table.get(*id).can_terminate,
        ProcExpr::Choice(l, r) | ProcExpr::Cond(_, l, r) => {
            can_terminate(table, l) || can_terminate(table, r)
        }
        ProcExpr::Seq(l, r)
        | ProcExpr::Sync(l, r)
        | ProcExpr::Merge(l, r)
        | ProcExpr::LeftMerge(l, r)
        | ProcExpr::BoundedInit(l, r) => can_terminate(table, l) && can_terminate(table, r),
        ProcExpr::Sum(_, p)
        | ProcExpr::At(p, _)
        | ProcExpr::Hide(_, p)
        | ProcExpr::Rename(_, p)
        | ProcExpr::Allow(_, p)
        | ProcExpr::Block(_, p)
        | ProcExpr::Comm(_, p) => can_terminate(table, p),
    }
}
