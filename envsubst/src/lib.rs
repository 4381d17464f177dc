#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::hash::Hash;
use std::io::{ErrorKind, Read, Write};

use biometrics::{Collector, Counter};

#[cfg(feature = "command_line")]
pub mod command_line;

///////////////////////////////////////////// constants ////////////////////////////////////////////

/// The default capacity of a pending reference, counting its leading `$` and `{`.
pub const DEFAULT_MAX_REFERENCE_LEN: usize = 4096;

const READ_BUFFER_SIZE: usize = 8192;

///////////////////////////////////////////// counters /////////////////////////////////////////////

static SUBSTITUTED: Counter = Counter::new("envsubst.substitution.substituted");
static UNSET: Counter = Counter::new("envsubst.substitution.unset");
static RESTRICTED: Counter = Counter::new("envsubst.substitution.restricted");
static INVALID_NAME: Counter = Counter::new("envsubst.scanner.invalid_name");
static UNTERMINATED: Counter = Counter::new("envsubst.scanner.unterminated");
static OVERFLOW: Counter = Counter::new("envsubst.scanner.overflow");
static DISCOVERED: Counter = Counter::new("envsubst.discovery.discovered");

/// Register all envsubst counters with the provided collector.
pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&SUBSTITUTED);
    collector.register_counter(&UNSET);
    collector.register_counter(&RESTRICTED);
    collector.register_counter(&INVALID_NAME);
    collector.register_counter(&UNTERMINATED);
    collector.register_counter(&OVERFLOW);
    collector.register_counter(&DISCOVERED);
}

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// The Error type.
#[derive(Debug)]
pub enum Error {
    /// The command line could not be understood.
    InvalidInvocation {
        /// What was wrong with the command line.
        message: String,
    },
    /// Reading the input failed.
    ReadError(std::io::Error),
    /// Writing the output failed.
    IoError(std::io::Error),
}

impl Error {
    /// Construct a new "InvalidInvocation" variant.
    pub fn invalid_invocation(message: impl AsRef<str>) -> Self {
        Self::InvalidInvocation {
            message: message.as_ref().to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidInvocation { message } => write!(f, "{}", message),
            Error::ReadError(err) => write!(f, "error while reading input: {}", err),
            Error::IoError(err) => write!(f, "error while writing output: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidInvocation { .. } => None,
            Error::ReadError(err) => Some(err),
            Error::IoError(err) => Some(err),
        }
    }
}

///////////////////////////////////////////// validate /////////////////////////////////////////////

fn is_identifier_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Return the length of the identifier that starts `span`, or zero when `span` does not start
/// with an ASCII letter.
///
/// With a `bound` of `None`, the identifier extends to the first byte that is neither ASCII
/// alphanumeric nor an underscore, or to the end of `span`.  With `Some(n)`, the first `n` bytes
/// must form an identifier in their entirety:  the result is `n` when they do and zero when any
/// one of them is illegal.  The bounded form never truncates.
pub fn validate(span: &[u8], bound: Option<usize>) -> usize {
    if !span.first().is_some_and(u8::is_ascii_alphabetic) {
        return 0;
    }
    match bound {
        None => span.iter().take_while(|c| is_identifier_byte(**c)).count(),
        Some(n) if n <= span.len() && span[..n].iter().all(|c| is_identifier_byte(*c)) => n,
        Some(_) => 0,
    }
}

/////////////////////////////////////////// VariableName ///////////////////////////////////////////

/// A validated environment variable name:  an ASCII letter followed by ASCII letters, digits, and
/// underscores.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VariableName(String);

impl VariableName {
    /// Validate `name` in its entirety.
    pub fn new(name: &str) -> Option<Self> {
        if validate(name.as_bytes(), Some(name.len())) > 0 {
            Some(Self(name.to_string()))
        } else {
            None
        }
    }

    fn from_validated(name: &str) -> Self {
        Self(name.to_string())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VariableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for VariableName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VariableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

///////////////////////////////////////////// Registry /////////////////////////////////////////////

/// A Registry collects the names seen during a discovery pass.  Names are kept in the order they
/// were first seen and duplicates are dropped on insertion.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    order: Vec<VariableName>,
    seen: HashSet<VariableName>,
}

impl Registry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `name`, returning true iff it was not already present.
    pub fn insert(&mut self, name: VariableName) -> bool {
        if self.seen.contains(&name) {
            return false;
        }
        DISCOVERED.click();
        self.seen.insert(name.clone());
        self.order.push(name);
        true
    }

    /// Sort the registry once and freeze it.
    pub fn finalize(self) -> VariableSet {
        let mut names = self.order;
        names.sort();
        VariableSet { names }
    }
}

impl Extend<VariableName> for Registry {
    fn extend<I: IntoIterator<Item = VariableName>>(&mut self, iter: I) {
        for name in iter {
            self.insert(name);
        }
    }
}

//////////////////////////////////////////// VariableSet ///////////////////////////////////////////

/// A finalized registry.  Names are unique and sorted in ascending byte-wise order.
///
/// This is what `--variables` prints and what restricts a substitution pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VariableSet {
    names: Vec<VariableName>,
}

impl VariableSet {
    /// True iff `name` is a member of the set.
    pub fn contains(&self, name: &str) -> bool {
        self.names
            .binary_search_by(|n| n.as_str().cmp(name))
            .is_ok()
    }

    /// Iterate the names in sorted order.
    pub fn iter(&self) -> std::slice::Iter<'_, VariableName> {
        self.names.iter()
    }
}

impl<'a> IntoIterator for &'a VariableSet {
    type Item = &'a VariableName;
    type IntoIter = std::slice::Iter<'a, VariableName>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.iter()
    }
}

impl FromIterator<VariableName> for VariableSet {
    fn from_iter<I: IntoIterator<Item = VariableName>>(iter: I) -> Self {
        let mut registry = Registry::new();
        registry.extend(iter);
        registry.finalize()
    }
}

///////////////////////////////////////// VariableProvider /////////////////////////////////////////

/// A VariableProvider provides a way to lookup the value of a variable.
///
/// It is expected that the provider do no expansion of its own.
pub trait VariableProvider {
    /// Return the value of `ident`, or `None` when it is not set.
    fn lookup(&self, ident: &str) -> Option<&[u8]>;
}

impl VariableProvider for () {
    fn lookup(&self, _: &str) -> Option<&[u8]> {
        None
    }
}

impl<K: Borrow<str> + Eq + Hash, V: AsRef<[u8]>> VariableProvider for HashMap<K, V> {
    fn lookup(&self, ident: &str) -> Option<&[u8]> {
        self.get(ident).map(|v| v.as_ref())
    }
}

impl<T: VariableProvider + ?Sized> VariableProvider for &T {
    fn lookup(&self, ident: &str) -> Option<&[u8]> {
        (**self).lookup(ident)
    }
}

//////////////////////////////////////////// Environment ///////////////////////////////////////////

/// A snapshot of the process environment.
///
/// Values are kept as raw bytes so that values that are not UTF-8 pass through untouched.
/// Variables whose names are not valid Unicode are skipped; no reference can name them.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    vars: HashMap<String, Vec<u8>>,
}

impl Environment {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(name, value)| {
                let name = name.into_string().ok()?;
                Some((name, value.into_encoded_bytes()))
            })
            .collect();
        Self { vars }
    }
}

impl VariableProvider for Environment {
    fn lookup(&self, ident: &str) -> Option<&[u8]> {
        self.vars.get(ident).map(Vec::as_slice)
    }
}

////////////////////////////////////////////// Options /////////////////////////////////////////////

/// Options that shape a substitution pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Options {
    /// The most bytes a pending reference may hold, counting its leading `$` and `{`.  A
    /// reference that grows past this is written out literally.  Values below 2 act as 2.
    pub max_reference_len: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_reference_len: DEFAULT_MAX_REFERENCE_LEN,
        }
    }
}

///////////////////////////////////////////// Reference ////////////////////////////////////////////

/// A complete, well-formed reference to a variable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Reference<'a> {
    name: &'a str,
    token: &'a [u8],
}

impl<'a> Reference<'a> {
    /// The referenced name, without the sigil or braces.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The reference exactly as it appeared in the input.
    pub fn token(&self) -> &'a [u8] {
        self.token
    }
}

////////////////////////////////////////////// Handler /////////////////////////////////////////////

/// A Handler receives the output of a [Scanner]:  runs of literal text and well-formed
/// references, in input order.
pub trait Handler {
    /// The error a handler may fail with.
    type Error;

    /// Bytes that pass through unchanged.
    fn literal(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
    /// A reference whose name validated.
    fn reference(&mut self, reference: Reference<'_>) -> Result<(), Self::Error>;
}

////////////////////////////////////////////// Scanner /////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Idle,
    Sigil,
    Braced,
    Bare,
}

/// A Scanner recognizes `$NAME` and `${NAME}` in a stream of bytes fed to it a chunk at a time.
///
/// The pending reference never exceeds the configured capacity by more than its closing brace.
/// Malformed, unterminated, or overlong references are handed to the handler as literal text.
pub struct Scanner<H: Handler> {
    handler: H,
    state: State,
    pending: Vec<u8>,
    max_len: usize,
}

impl<H: Handler> Scanner<H> {
    /// Create a new scanner that feeds `handler`.
    pub fn new(handler: H, options: &Options) -> Self {
        Self {
            handler,
            state: State::Idle,
            pending: Vec::new(),
            max_len: options.max_reference_len.max(2),
        }
    }

    /// Scan `bytes`.  The scanner carries partial references across calls.
    pub fn push_slice(&mut self, mut bytes: &[u8]) -> Result<(), H::Error> {
        while let Some((&c, rest)) = bytes.split_first() {
            if self.state == State::Idle && c != b'$' {
                let run = bytes.iter().position(|c| *c == b'$').unwrap_or(bytes.len());
                self.handler.literal(&bytes[..run])?;
                bytes = &bytes[run..];
            } else {
                self.push(c)?;
                bytes = rest;
            }
        }
        Ok(())
    }

    /// Scan a single byte.
    pub fn push(&mut self, c: u8) -> Result<(), H::Error> {
        match self.state {
            State::Idle if c == b'$' => {
                self.pending.push(c);
                self.state = State::Sigil;
                Ok(())
            }
            State::Idle => self.handler.literal(&[c]),
            State::Sigil if c == b'{' => self.append(c, State::Braced),
            State::Sigil if c.is_ascii_alphabetic() => self.append(c, State::Bare),
            State::Bare if is_identifier_byte(c) => self.append(c, State::Bare),
            State::Sigil | State::Bare if c == b'$' => {
                self.resolve_bare()?;
                self.push(c)
            }
            State::Sigil | State::Bare => {
                self.resolve_bare()?;
                self.handler.literal(&[c])
            }
            State::Braced if c == b'}' => self.resolve_braced(),
            State::Braced => self.append(c, State::Braced),
        }
    }

    /// Resolve whatever reference is pending at the end of the input and return the handler.
    pub fn finish(mut self) -> Result<H, H::Error> {
        match self.state {
            State::Idle => {}
            State::Sigil | State::Bare => self.resolve_bare()?,
            State::Braced => {
                UNTERMINATED.click();
                self.flush_pending()?;
            }
        }
        Ok(self.handler)
    }

    fn append(&mut self, c: u8, next: State) -> Result<(), H::Error> {
        if self.pending.len() >= self.max_len {
            OVERFLOW.click();
            self.flush_pending()?;
            return self.push(c);
        }
        self.pending.push(c);
        self.state = next;
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<(), H::Error> {
        self.state = State::Idle;
        if self.pending.is_empty() {
            return Ok(());
        }
        let result = self.handler.literal(&self.pending);
        self.pending.clear();
        result
    }

    fn resolve_bare(&mut self) -> Result<(), H::Error> {
        let span = self.pending.get(1..).unwrap_or_default();
        let len = validate(span, None);
        if len == 0 || len != span.len() {
            if !span.is_empty() {
                INVALID_NAME.click();
            }
            return self.flush_pending();
        }
        self.resolve(1, self.pending.len())
    }

    fn resolve_braced(&mut self) -> Result<(), H::Error> {
        self.pending.push(b'}');
        let end = self.pending.len() - 1;
        let span = self.pending.get(2..end).unwrap_or_default();
        if validate(span, Some(span.len())) == 0 {
            INVALID_NAME.click();
            return self.flush_pending();
        }
        self.resolve(2, end)
    }

    fn resolve(&mut self, start: usize, end: usize) -> Result<(), H::Error> {
        self.state = State::Idle;
        let result = match std::str::from_utf8(&self.pending[start..end]) {
            Ok(name) => self.handler.reference(Reference {
                name,
                token: &self.pending,
            }),
            Err(_) => self.handler.literal(&self.pending),
        };
        self.pending.clear();
        result
    }
}

///////////////////////////////////////////// discovery ////////////////////////////////////////////

#[derive(Default)]
struct Discover {
    registry: Registry,
}

impl Handler for Discover {
    type Error = Infallible;

    fn literal(&mut self, _: &[u8]) -> Result<(), Infallible> {
        Ok(())
    }

    fn reference(&mut self, reference: Reference<'_>) -> Result<(), Infallible> {
        self.registry
            .insert(VariableName::from_validated(reference.name()));
        Ok(())
    }
}

/// Collect the distinct names referenced in `pattern`, sorted.
///
/// The pattern is already in memory, so no reference it holds is too long to be discovered.
pub fn run_discovery(pattern: impl AsRef<[u8]>) -> VariableSet {
    let pattern = pattern.as_ref();
    let options = Options {
        max_reference_len: pattern.len().max(DEFAULT_MAX_REFERENCE_LEN),
    };
    let mut scanner = Scanner::new(Discover::default(), &options);
    if let Err(never) = scanner.push_slice(pattern) {
        match never {}
    }
    match scanner.finish() {
        Ok(discover) => discover.registry.finalize(),
        Err(never) => match never {},
    }
}

//////////////////////////////////////////// substitution //////////////////////////////////////////

struct Substitute<'a, P: VariableProvider + ?Sized, W: Write> {
    vars: &'a P,
    restrict: Option<&'a VariableSet>,
    output: W,
}

impl<P: VariableProvider + ?Sized, W: Write> Handler for Substitute<'_, P, W> {
    type Error = std::io::Error;

    fn literal(&mut self, bytes: &[u8]) -> Result<(), std::io::Error> {
        self.output.write_all(bytes)
    }

    fn reference(&mut self, reference: Reference<'_>) -> Result<(), std::io::Error> {
        if let Some(restrict) = self.restrict {
            if !restrict.contains(reference.name()) {
                RESTRICTED.click();
                return self.output.write_all(reference.token());
            }
        }
        match self.vars.lookup(reference.name()) {
            Some(value) => {
                SUBSTITUTED.click();
                self.output.write_all(value)
            }
            None => {
                UNSET.click();
                Ok(())
            }
        }
    }
}

/// Copy `input` to `output`, replacing each reference with the value `vars` gives it.
///
/// When `restrict` is provided, only the names it contains are substituted and all other
/// references are copied as written.  A failure reading `input` is returned as
/// [Error::ReadError], and only after the pending reference has been resolved and `output`
/// flushed.  Failures writing `output` are [Error::IoError].
pub fn run_substitution<R: Read, W: Write, P: VariableProvider + ?Sized>(
    mut input: R,
    output: W,
    vars: &P,
    restrict: Option<&VariableSet>,
    options: &Options,
) -> Result<(), Error> {
    let substitute = Substitute {
        vars,
        restrict,
        output,
    };
    let mut scanner = Scanner::new(substitute, options);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let failure = loop {
        match input.read(&mut buf) {
            Ok(0) => break None,
            Ok(n) => scanner.push_slice(&buf[..n])?,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => break Some(err),
        }
    };
    let mut substitute = scanner.finish()?;
    substitute.output.flush()?;
    match failure {
        Some(err) => Err(Error::ReadError(err)),
        None => Ok(()),
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
