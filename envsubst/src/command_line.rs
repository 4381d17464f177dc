//! Mode selection for the envsubst binary.
//!
//! This module turns arguments into an [Invocation].  It never touches the process's streams.

use std::ffi::OsStr;

use crate::{Error, Options};

const EPILOGUE: &str = "In normal operation mode, standard input is copied to standard output,
with references to environment variables of the form $VARIABLE or ${VARIABLE}
being replaced with the corresponding values.  If a SHELL-FORMAT is given,
only those environment variables that are referenced in SHELL-FORMAT are
substituted; otherwise all environment variables references occurring in
standard input are substituted.

When --variables is used, standard input is ignored, and the output consists
of the environment variables that are referenced in SHELL-FORMAT, one per line.
";

/////////////////////////////////////////////// Mode ///////////////////////////////////////////////

/// What the process was asked to do.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Print usage and exit.
    Help,
    /// Print the version and exit.
    Version,
    /// Print the variables referenced in `pattern`, one per line.
    Variables {
        /// The SHELL-FORMAT argument.
        pattern: String,
    },
    /// Substitute standard input onto standard output.
    Substitute {
        /// The SHELL-FORMAT argument restricting which variables get substituted, if any.
        pattern: Option<String>,
    },
}

//////////////////////////////////////////// Invocation ////////////////////////////////////////////

/// A fully-resolved command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    /// The requested mode.
    pub mode: Mode,
    /// Options for the substitution pass.
    pub options: Options,
}

impl Invocation {
    /// Resolve the arguments that follow the program name.
    pub fn from_arguments<S: AsRef<OsStr>>(args: &[S]) -> Result<Self, Error> {
        if let Some(arg) = args.iter().find(|arg| arg.as_ref().to_str().is_none()) {
            return Err(Error::invalid_invocation(format!(
                "argument is not valid UTF-8: {:?}",
                arg.as_ref()
            )));
        }
        let matches = options()
            .parse(args)
            .map_err(|err| Error::invalid_invocation(err.to_string()))?;
        if matches.opt_present("help") {
            return Ok(Self::with_mode(Mode::Help));
        }
        if matches.opt_present("version") {
            return Ok(Self::with_mode(Mode::Version));
        }
        let variables = matches.opt_present("variables");
        let mut options = Options::default();
        if let Some(len) = matches.opt_str("max-reference-length") {
            options.max_reference_len = match len.parse::<usize>() {
                Ok(len) if len > 0 => len,
                _ => {
                    return Err(Error::invalid_invocation(format!(
                        "invalid --max-reference-length: {len:?}"
                    )));
                }
            };
        }
        let mut free = matches.free.into_iter();
        let pattern = free.next();
        if free.next().is_some() {
            return Err(Error::invalid_invocation("too many arguments"));
        }
        let mode = match (variables, pattern) {
            (true, Some(pattern)) => Mode::Variables { pattern },
            (true, None) => return Err(Error::invalid_invocation("missing arguments")),
            (false, pattern) => Mode::Substitute { pattern },
        };
        Ok(Self { mode, options })
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            options: Options::default(),
        }
    }
}

fn options() -> getopts::Options {
    let mut opts = getopts::Options::new();
    opts.optflag(
        "v",
        "variables",
        "output the variables occurring in SHELL-FORMAT",
    );
    opts.optflag("h", "help", "display this help and exit");
    opts.optflag("V", "version", "output version information and exit");
    opts.optopt(
        "",
        "max-reference-length",
        "write references longer than BYTES as they appear",
        "BYTES",
    );
    opts
}

/// The text printed for `--help`.
pub fn usage(progname: &str) -> String {
    let brief = format!(
        "Usage: {progname} [OPTION] [SHELL-FORMAT]\n\n\
         Substitutes the values of environment variables."
    );
    format!("{}\n{}", options().usage(&brief), EPILOGUE)
}

/// The text printed for `--version`.
pub fn version() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
