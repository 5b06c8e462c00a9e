//! Linearization of process specifications into a single linear process
//! equation.
//!
//! ```no_run
//! use linearize::{Options, linearize, term::Specification};
//!
//! let spec: Specification = serde_json::from_str(&std::fs::read_to_string("spec.json")?)?;
//! let out = linearize(spec, Options::default())?;
//! println!("{out}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod adt;
mod classify;
mod cluster;
pub mod compose;
mod context;
mod driver;
mod error;
mod gnf;
mod lpe;
mod options;
mod rewrite;
mod state;
mod summands;
pub mod term;
mod termination;
mod validate;

pub use cluster::cluster;
pub use context::{Context, Declarations};
pub use driver::{Linearization, linearize};
pub use error::{Error, Result, Warning, WarningKind};
pub use lpe::{Lpe, NextState, Summand, SummandAction};
pub use options::Options;
pub use rewrite::{Identity, Rewriter, Simplifier};
pub use validate::validate;
