use std::collections::{HashMap, HashSet};

use super::{Ident, Sort, Variable};

/// Globally unique name supply.
///
/// Every identifier of the input is reserved up front; each generated name is
/// checked against all reserved and previously generated names.
#[derive(Debug, Default)]
pub struct NameGen {
    used: HashSet<Ident>,
    counters: HashMap<String, usize>,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, name: &str) {
        if !self.used.contains(name) {
            self.used.insert(name.into());
        }
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Returns `hint` itself when it is still free, otherwise `hint` followed
    /// by the first free counter value.
    pub fn fresh(&mut self, hint: &str) -> Ident {
        if !self.used.contains(hint) {
            let name: Ident = hint.into();
            self.used.insert(name.clone());
            return name;
        }
        let base = base_name(hint);
        let counter = self.counters.entry(base.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{base}{counter}");
            if !self.used.contains(candidate.as_str()) {
                let name: Ident = candidate.into();
                self.used.insert(name.clone());
                return name;
            }
        }
    }

    pub fn fresh_var(&mut self, hint: &str, sort: Sort) -> Variable {
        Variable {
            name: self.fresh(hint),
            sort,
        }
    }
}

/// Strips a trailing counter so that renaming `x1` yields `x2`, not `x11`.
fn base_name(hint: &str) -> &str {
    let trimmed = hint.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.is_empty() { hint } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_keeps_unused_hint() {
        let mut names = NameGen::new();
        assert_eq!(&*names.fresh("s"), "s");
        assert_eq!(&*names.fresh("s"), "s1");
        assert_eq!(&*names.fresh("s"), "s2");
    }

    #[test]
    fn test_fresh_skips_reserved_names() {
        let mut names = NameGen::new();
        names.reserve("d");
        names.reserve("d1");
        assert_eq!(&*names.fresh("d"), "d2");
        assert_eq!(&*names.fresh("d1"), "d3");
    }
}
