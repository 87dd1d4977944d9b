pub mod ast;
pub mod charset;
pub mod compiler;
pub mod error;
pub mod matcher;
pub mod parser;
pub mod program;
pub mod trace;
pub mod value;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;

pub use ast::{Bounds, IntoMatcher, Node, NodeKind};
pub use charset::{ByteSet, CharClass};
pub use compiler::Compiler;
pub use error::{Error, GrammarError, NoMatch, PatternError, UnknownStrategy};
pub use matcher::{Interpreted, MatchResult, Matcher, Success};
pub use program::Program;
pub use trace::{LogTracer, Tracer};
pub use value::Value;

/// How a grammar is executed. Both give the same results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Walk a tree of closures built from the rules.
    #[default]
    Interpreted,
    /// Run the rules lowered into a flat program.
    Compiled,
}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interpreted" => Ok(Strategy::Interpreted),
            "compiled" => Ok(Strategy::Compiled),
            _ => Err(UnknownStrategy(s.to_owned())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Interpreted => write!(f, "interpreted"),
            Strategy::Compiled => write!(f, "compiled"),
        }
    }
}

/// A successful run: the value and the input left over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub value: Value,
    pub remainder: Bytes,
    pub position: usize,
}

impl Parsed {
    /// The value, if the whole input was consumed.
    pub fn finish(self) -> Result<Value, Error> {
        if self.remainder.is_empty() {
            Ok(self.value)
        } else {
            Err(Error::Incomplete { position: self.position })
        }
    }
}

/// Lifts literals into rules and passes rules through.
pub fn into_matcher(matcher: impl IntoMatcher) -> Result<Node, GrammarError> {
    matcher.into_matcher()
}

/// Matches `input` from its first unit with the given strategy.
///
/// ```
/// use crunching::{run, Node, Strategy, Value};
///
/// let parsed = run(Node::choice(["inline", "attachment"]), "attachment; x", Strategy::Compiled).unwrap();
/// assert_eq!(parsed.value, Value::from("attachment"));
/// assert_eq!(&parsed.remainder[..], b"; x");
/// ```
pub fn run(matcher: impl IntoMatcher, input: impl Into<Bytes>, strategy: Strategy) -> Result<Parsed, Error> {
    Grammar::new(matcher)?.run(input, strategy)
}

/// Matches `input` from its first unit with an already built strategy.
pub fn run_with(matcher: &dyn Matcher, input: impl Into<Bytes>) -> Result<Parsed, NoMatch> {
    let input = input.into();
    let success = matcher.attempt(&input, 0, input.len())?;
    Ok(Parsed {
        value: success.value,
        remainder: input.slice(success.position..),
        position: success.position,
    })
}

/// A rule tree together with its strategies, each built on first use.
pub struct Grammar {
    root: Node,
    tracer: Option<Arc<dyn Tracer>>,
    interpreted: OnceCell<Interpreted>,
    compiled: OnceCell<Program>,
}

impl Grammar {
    pub fn new(matcher: impl IntoMatcher) -> Result<Self, GrammarError> {
        Ok(Self {
            root: matcher.into_matcher()?,
            tracer: None,
            interpreted: OnceCell::new(),
            compiled: OnceCell::new(),
        })
    }

    pub fn from_pattern(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self::new(parser::parse_pattern(pattern)?)?)
    }

    /// Strategies built after this call report to `tracer`.
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self.interpreted = OnceCell::new();
        self.compiled = OnceCell::new();
        self
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn interpreted(&self) -> &Interpreted {
        self.interpreted.get_or_init(|| match &self.tracer {
            Some(tracer) => Interpreted::with_tracer(&self.root, tracer.clone()),
            None => Interpreted::new(&self.root),
        })
    }

    pub fn compiled(&self) -> &Program {
        self.compiled.get_or_init(|| match &self.tracer {
            Some(tracer) => Compiler::with_tracer(tracer.clone()).compile(&self.root),
            None => Compiler::new().compile(&self.root),
        })
    }

    pub fn matcher(&self, strategy: Strategy) -> &dyn Matcher {
        match strategy {
            Strategy::Interpreted => self.interpreted(),
            Strategy::Compiled => self.compiled(),
        }
    }

    pub fn run(&self, input: impl Into<Bytes>, strategy: Strategy) -> Result<Parsed, Error> {
        Ok(run_with(self.matcher(strategy), input)?)
    }
}
