//! ```
//! USAGE: envsubst [OPTION] [SHELL-FORMAT]
//! ```

use std::io::{BufWriter, Write};
use std::path::Path;

use envsubst::command_line::{self, Invocation, Mode};
use envsubst::{Environment, Error, Options};

fn list_variables(pattern: &str) -> Result<(), Error> {
    let stdout = std::io::stdout();
    let mut stdout = BufWriter::new(stdout.lock());
    for name in envsubst::run_discovery(pattern).iter() {
        writeln!(stdout, "{name}")?;
    }
    stdout.flush()?;
    Ok(())
}

fn substitute(pattern: Option<&str>, options: &Options) -> Result<(), Error> {
    let restrict = pattern.map(|pattern| envsubst::run_discovery(pattern));
    let env = Environment::capture();
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    envsubst::run_substitution(
        stdin.lock(),
        BufWriter::new(stdout.lock()),
        &env,
        restrict.as_ref(),
        options,
    )
}

fn main() {
    let args = std::env::args_os().collect::<Vec<_>>();
    let progname = args
        .first()
        .and_then(|arg0| Path::new(arg0).file_name())
        .and_then(|name| name.to_str())
        .unwrap_or("envsubst")
        .to_string();

    let invocation = match Invocation::from_arguments(args.get(1..).unwrap_or_default()) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("{progname}: {err}");
            eprintln!("Try '{progname} --help' for more information");
            std::process::exit(1);
        }
    };
    let result = match invocation.mode {
        Mode::Help => {
            print!("{}", command_line::usage(&progname));
            Ok(())
        }
        Mode::Version => {
            println!("{}", command_line::version());
            Ok(())
        }
        Mode::Variables { pattern } => list_variables(&pattern),
        Mode::Substitute { pattern } => substitute(pattern.as_deref(), &invocation.options),
    };
    if let Err(err) = result {
        eprintln!("{progname}: {err}");
        std::process::exit(1);
    }
}
