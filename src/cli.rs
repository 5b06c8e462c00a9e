use std::path::PathBuf;

use clap::{ArgAction, ArgMatches, arg, command, value_parser};

pub(crate) fn cli() -> ArgMatches {
    command!()
        .about("Linearize a process specification into a single linear process equation")
        .arg(
            arg!(<INPUT> "JSON specification to linearize, or - for stdin")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(-o --output <OUTPUT> "Write the result to a file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(--json "Print the linearization as JSON").action(ArgAction::SetTrue))
        .arg(
            arg!(--stack "Encode control with a stack instead of a finite state cell")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(--regular2 "Share sequence equations by process identifiers")
                .action(ArgAction::SetTrue),
        )
        .arg(arg!(--cluster "Cluster the summands of the result").action(ArgAction::SetTrue))
        .arg(
            arg!(--"no-cluster" "Do not cluster the operands of parallel compositions")
                .action(ArgAction::SetTrue),
        )
        .arg(arg!(--binary "Encode control with boolean cells").action(ArgAction::SetTrue))
        .arg(
            arg!(--"old-state" "Encode control with a Pos cell counting from 1")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(--statenames "Name control cells after their process")
                .action(ArgAction::SetTrue),
        )
        .arg(arg!(--"no-rewrite" "Do not simplify generated terms").action(ArgAction::SetTrue))
        .arg(
            arg!(--"free-variables" "Use free variables instead of dummy constants")
                .action(ArgAction::SetTrue),
        )
        .get_matches()
}
