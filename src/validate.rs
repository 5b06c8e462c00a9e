use std::collections::HashSet;

use crate::error::{Error, Result, Warning, WarningKind};
use crate::term::{DataExpr, ProcExpr, Sort, Specification, Variable};

/// Checks a specification before linearization and clamps out-of-range
/// numeric literals, returning one warning per clamped literal.
pub fn validate(spec: &mut Specification) -> Result<Vec<Warning>> {
    let mut errors = vec![];

    check_sorts(spec, &mut errors);
    check_references(spec, &mut errors);

    if !errors.is_empty() {
        return Err(Error::Consistency(errors.join("; ")));
    }

    Ok(clamp_literals(spec))
}

fn check_sorts(spec: &Specification, errors: &mut Vec<String>) {
    let check_var = |v: &Variable, place: &str, errors: &mut Vec<String>| {
        if v.sort == Sort::Unknown {
            errors.push(format!("variable '{}' in {place} has the unknown sort", v.name));
        }
    };

    for v in &spec.globals {
        check_var(v, "the global variables", errors);
    }
    for decl in &spec.actions {
        if decl.sorts.contains(&Sort::Unknown) {
            errors.push(format!("action '{}' is declared with the unknown sort", decl.name));
        }
    }
    for op in spec.data.constructors.iter().chain(&spec.data.mappings) {
        if op.codomain == Sort::Unknown || op.domain.contains(&Sort::Unknown) {
            errors.push(format!("function '{}' is declared with the unknown sort", op.name));
        }
    }
    for eq in &spec.data.equations {
        for v in &eq.vars {
            check_var(v, &format!("the data equation for {}", eq.lhs), errors);
        }
    }
    for eq in &spec.equations {
        let place = format!("process '{}'", eq.name);
        for p in &eq.params {
            check_var(p, &place, errors);
        }
        check_bound(&eq.body, &place, errors);
        for_each_data(&eq.body, &mut |e| check_literal(e, &place, errors));
    }
    check_bound(&spec.init, "the initial process", errors);
    for_each_data(&spec.init, &mut |e| check_literal(e, "the initial process", errors));
}

fn check_bound(body: &ProcExpr, place: &str, errors: &mut Vec<String>) {
    body.for_each(&mut |node| {
        if let ProcExpr::Sum(vars, _) = node {
            for v in vars.iter().filter(|v| v.sort == Sort::Unknown) {
                errors.push(format!("variable '{}' in {place} has the unknown sort", v.name));
            }
        }
    });
}

fn check_literal(e: &DataExpr, place: &str, errors: &mut Vec<String>) {
    e.for_each(&mut |node| match node {
        DataExpr::Number { value, sort } if !sort.is_numeric() => errors.push(format!(
            "numeric literal {value} in {place} has the non-numeric sort {sort}"
        )),
        DataExpr::Var(v) if v.sort == Sort::Unknown => {
            errors.push(format!("variable '{}' in {place} has the unknown sort", v.name))
        }
        _ => {}
    });
}

fn check_references(spec: &Specification, errors: &mut Vec<String>) {
    let declared: HashSet<&str> = spec.actions.iter().map(|a| &*a.name).collect();

    let check = |body: &ProcExpr, place: &str, errors: &mut Vec<String>| {
        body.for_each(&mut |node| match node {
            ProcExpr::Call(id, args) => match spec.equations.get(id.0) {
                None => errors.push(format!("{place} refers to a non-existing process {}", id.0)),
                Some(callee) if callee.params.len() != args.len() => errors.push(format!(
                    "{place} calls '{}' with {} arguments, expected {}",
                    callee.name,
                    args.len(),
                    callee.params.len()
                )),
                Some(_) => {}
            },
            ProcExpr::Action(action) => match spec.action_decl(&action.name) {
                None => errors.push(format!(
                    "{place} uses the undeclared action '{}'",
                    action.name
                )),
                Some(decl) if decl.sorts.len() != action.args.len() => errors.push(format!(
                    "{place} applies action '{}' to {} arguments, expected {}",
                    action.name,
                    action.args.len(),
                    decl.sorts.len()
                )),
                Some(_) => {}
            },
            ProcExpr::Rename(rules, _) => {
                for rule in rules.iter().filter(|r| !declared.contains(&*r.to)) {
                    errors.push(format!(
                        "{place} renames into the undeclared action '{}'",
                        rule.to
                    ));
                }
            }
            ProcExpr::Comm(rules, _) => {
                for rule in rules
                    .iter()
                    .filter(|r| &*r.rhs != "tau" && !declared.contains(&*r.rhs))
                {
                    errors.push(format!(
                        "{place} communicates into the undeclared action '{}'",
                        rule.rhs
                    ));
                }
            }
            _ => {}
        });
    };

    for eq in &spec.equations {
        check(&eq.body, &format!("process '{}'", eq.name), errors);
    }
    check(&spec.init, "the initial process", errors);
}

fn clamp_literals(spec: &mut Specification) -> Vec<Warning> {
    let mut warnings = vec![];
    let mut clamp = |e: &DataExpr| {
        e.transform(&mut |node| match node {
            DataExpr::Number { value, sort: Sort::Pos } if value < 1 => {
                warnings.push(Warning::new(
                    WarningKind::LiteralOutOfRange,
                    format!("literal {value} is not a positive number; using 1"),
                ));
                DataExpr::number(1, Sort::Pos)
            }
            DataExpr::Number { value, sort: Sort::Nat } if value < 0 => {
                warnings.push(Warning::new(
                    WarningKind::LiteralOutOfRange,
                    format!("literal {value} is not a natural number; using 0"),
                ));
                DataExpr::number(0, Sort::Nat)
            }
            other => other,
        })
    };
    for eq in &mut spec.equations {
        eq.body = eq.body.map_data(&mut clamp);
    }
    spec.init = spec.init.map_data(&mut clamp);
    for w in &warnings {
        log::warn!("{}", w.message);
    }
    warnings
}

fn for_each_data(body: &ProcExpr, f: &mut impl FnMut(&DataExpr)) {
    body.for_each(&mut |node| match node {
        ProcExpr::Action(a) => a.args.iter().for_each(&mut *f),
        ProcExpr::Call(_, args) => args.iter().for_each(&mut *f),
        ProcExpr::Cond(c, ..) => f(c),
        ProcExpr::At(_, t) => f(t),
        _ => {}
    });
}
