use serde::Serialize;

use crate::error::{Error, Result};

/// Linearization switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Options {
    /// Encode control with a finite state cell; `false` selects the stack.
    pub regular: bool,
    /// Share generated sequence equations by process identifiers only.
    pub regular2: bool,
    /// Cluster the summands of the final LPE.
    pub cluster: bool,
    /// Do not cluster the operands of parallel compositions.
    pub no_cluster: bool,
    pub binary: bool,
    /// Number states with a `Pos` cell instead of an enumerated sort.
    pub old_state: bool,
    /// Name control cells after the process they encode.
    pub statenames: bool,
    pub rewrite: bool,
    /// Permit fresh global variables as dummy values.
    pub allow_free_variables: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            regular: true,
            regular2: false,
            cluster: false,
            no_cluster: false,
            binary: false,
            old_state: false,
            statenames: false,
            rewrite: true,
            allow_free_variables: false,
        }
    }
}

impl Options {
    pub fn check(&self) -> Result<()> {
        if self.binary && !self.regular {
            return Err(Error::Encoding(
                "binary state encoding cannot be combined with the stack encoding".into(),
            ));
        }
        if self.binary && self.old_state {
            return Err(Error::Encoding(
                "binary state encoding cannot be combined with the index encoding".into(),
            ));
        }
        Ok(())
    }
}
