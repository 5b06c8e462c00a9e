mod cli;

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::ArgMatches;
use linearize::term::Specification;
use linearize::{Error, Options, linearize};

fn options(matches: &ArgMatches) -> Options {
    Options {
        regular: !matches.get_flag("stack"),
        regular2: matches.get_flag("regular2"),
        cluster: matches.get_flag("cluster"),
        no_cluster: matches.get_flag("no-cluster"),
        binary: matches.get_flag("binary"),
        old_state: matches.get_flag("old-state"),
        statenames: matches.get_flag("statenames"),
        rewrite: !matches.get_flag("no-rewrite"),
        allow_free_variables: matches.get_flag("free-variables"),
    }
}

fn read_input(path: &Path) -> Result<String, Error> {
    if path == Path::new("-") {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        Ok(input)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn run(matches: &ArgMatches) -> Result<(), Error> {
    let input = matches
        .get_one::<PathBuf>("INPUT")
        .ok_or_else(|| Error::Input("no input given".into()))?;
    let spec: Specification = serde_json::from_str(&read_input(input)?)?;

    let result = linearize(spec, options(matches))?;
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }

    let text = if matches.get_flag("json") {
        serde_json::to_string_pretty(&result)?
    } else {
        result.to_string()
    };
    match matches.get_one::<PathBuf>("output") {
        Some(path) => std::fs::write(path, text)?,
        None => print!("{text}"),
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let matches = cli::cli();

    if let Err(e) = run(&matches) {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}
