use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use bytes::Bytes;

use crate::charset::CharClass;
use crate::error::GrammarError;
use crate::value::Value;

pub type MapFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A grammar rule. Cloning shares the rule, it does not copy it.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

struct NodeData {
    name: Option<Arc<str>>,
    kind: NodeKind,
}

#[derive(Clone)]
pub enum NodeKind {
    Literal(Bytes),
    Class(CharClass),
    Sequence(Vec<Node>),
    Choice(Vec<Node>),
    Repeat { node: Node, bounds: Bounds },
    TakeWhile { class: CharClass, bounds: Bounds },
    Map { node: Node, func: MapFn },
}

/// How many times a repetition may match. `max` of `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub min: usize,
    pub max: Option<usize>,
}

impl Bounds {
    pub const ANY: Bounds = Bounds { min: 0, max: None };

    pub fn new(range: impl RangeBounds<usize>) -> Result<Self, GrammarError> {
        let min = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let max = match range.end_bound() {
            Bound::Included(&n) => Some(n),
            Bound::Excluded(&0) => return Err(GrammarError::ZeroRepetitions),
            Bound::Excluded(&n) => Some(n - 1),
            Bound::Unbounded => None,
        };
        match max {
            Some(0) => Err(GrammarError::ZeroRepetitions),
            Some(max) if min > max => Err(GrammarError::InvertedBounds { min, max }),
            _ => Ok(Self { min, max }),
        }
    }

    pub fn exactly(n: usize) -> Result<Self, GrammarError> {
        Self::new(n..=n)
    }

    #[inline]
    pub fn is_full(&self, count: usize) -> bool {
        self.max == Some(count)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..={}", self.min, max),
            None => write!(f, "{}..", self.min),
        }
    }
}

impl Node {
    fn from_kind(kind: NodeKind) -> Self {
        Node(Arc::new(NodeData { name: None, kind }))
    }

    /// Matches `text` exactly.
    pub fn literal(text: impl Into<Bytes>) -> Result<Self, GrammarError> {
        let text = text.into();
        if text.is_empty() {
            return Err(GrammarError::EmptyLiteral);
        }
        Ok(Self::from_kind(NodeKind::Literal(text)))
    }

    pub fn class(class: CharClass) -> Self {
        Self::from_kind(NodeKind::Class(class))
    }

    pub fn one_of(units: impl AsRef<[u8]>) -> Self {
        Self::class(CharClass::one_of(units))
    }

    pub fn none_of(units: impl AsRef<[u8]>) -> Self {
        Self::class(CharClass::none_of(units))
    }

    pub fn any() -> Self {
        Self::class(CharClass::Any)
    }

    pub fn sequence<I>(items: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator,
        I::Item: IntoMatcher,
    {
        let nodes = lift_all(items)?;
        if nodes.is_empty() {
            return Err(GrammarError::EmptySequence);
        }
        Ok(Self::from_kind(NodeKind::Sequence(nodes)))
    }

    /// Ordered choice: the first alternative that matches wins.
    pub fn choice<I>(items: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator,
        I::Item: IntoMatcher,
    {
        let nodes = lift_all(items)?;
        if nodes.is_empty() {
            return Err(GrammarError::EmptyChoice);
        }
        Ok(Self::from_kind(NodeKind::Choice(nodes)))
    }

    pub fn repeat(node: impl IntoMatcher, range: impl RangeBounds<usize>) -> Result<Self, GrammarError> {
        let node = node.into_matcher()?;
        let bounds = Bounds::new(range)?;
        Ok(Self::from_kind(NodeKind::Repeat { node, bounds }))
    }

    pub fn many(node: impl IntoMatcher) -> Result<Self, GrammarError> {
        Self::repeat(node, ..)
    }

    pub fn optional(node: impl IntoMatcher) -> Result<Self, GrammarError> {
        Self::repeat(node, 0..=1)
    }

    /// Scans a run of units accepted by `class`, yielding the run as one slice.
    pub fn take_while(class: CharClass, range: impl RangeBounds<usize>) -> Result<Self, GrammarError> {
        let bounds = Bounds::new(range)?;
        Ok(Self::from_kind(NodeKind::TakeWhile { class, bounds }))
    }

    pub fn map<F>(node: impl IntoMatcher, func: F) -> Result<Self, GrammarError>
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let node = node.into_matcher()?;
        Ok(Self::from_kind(NodeKind::Map { node, func: Arc::new(func) }))
    }

    /// A copy of this rule carrying `name`, for traces and compiled listings.
    pub fn named(&self, name: impl Into<Arc<str>>) -> Self {
        Node(Arc::new(NodeData {
            name: Some(name.into()),
            kind: self.0.kind.clone(),
        }))
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// The character predicate of a single-unit rule.
    pub fn predicate(&self) -> Option<CharClass> {
        match self.kind() {
            NodeKind::Class(class) => Some(*class),
            _ => None,
        }
    }

    /// Identity of this rule instance; clones share it.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn children(&self) -> &[Node] {
        match self.kind() {
            NodeKind::Sequence(nodes) | NodeKind::Choice(nodes) => nodes,
            NodeKind::Repeat { node, .. } | NodeKind::Map { node, .. } => std::slice::from_ref(node),
            NodeKind::Literal(_) | NodeKind::Class(_) | NodeKind::TakeWhile { .. } => &[],
        }
    }

    /// Literals and classes, which never need their own procedure.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind(), NodeKind::Literal(_) | NodeKind::Class(_) | NodeKind::TakeWhile { .. })
    }
}

fn lift_all<I>(items: I) -> Result<Vec<Node>, GrammarError>
where
    I: IntoIterator,
    I::Item: IntoMatcher,
{
    items.into_iter().map(IntoMatcher::into_matcher).collect()
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return write!(f, "{name}");
        }
        match self.kind() {
            NodeKind::Literal(text) => write!(f, "\"{}\"", text.escape_ascii()),
            NodeKind::Class(class) => write!(f, "{class}"),
            NodeKind::Sequence(nodes) => write_list(f, "seq", nodes),
            NodeKind::Choice(nodes) => write_list(f, "alt", nodes),
            NodeKind::Repeat { node, bounds } => write!(f, "many({node}, {bounds})"),
            NodeKind::TakeWhile { class, bounds } => write!(f, "take_while({class}, {bounds})"),
            NodeKind::Map { node, .. } => write!(f, "map({node})"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, head: &str, nodes: &[Node]) -> fmt::Result {
    write!(f, "{head}(")?;
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{node}")?;
    }
    write!(f, ")")
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({self})")
    }
}

/// Conversion of grammar-like values into a [`Node`].
///
/// Bare literals (strings, byte strings, single units) become literal
/// rules and character classes become class rules.
pub trait IntoMatcher {
    fn into_matcher(self) -> Result<Node, GrammarError>;
}

impl IntoMatcher for Node {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Ok(self)
    }
}

impl IntoMatcher for &Node {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Ok(self.clone())
    }
}

impl IntoMatcher for Result<Node, GrammarError> {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        self
    }
}

impl IntoMatcher for CharClass {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Ok(Node::class(self))
    }
}

impl IntoMatcher for &'static str {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Node::literal(self)
    }
}

impl IntoMatcher for String {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Node::literal(self)
    }
}

impl IntoMatcher for &'static [u8] {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Node::literal(self)
    }
}

impl<const N: usize> IntoMatcher for &'static [u8; N] {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Node::literal(&self[..])
    }
}

impl IntoMatcher for Vec<u8> {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Node::literal(self)
    }
}

impl IntoMatcher for Bytes {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Node::literal(self)
    }
}

impl IntoMatcher for u8 {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Node::literal(vec![self])
    }
}

impl IntoMatcher for char {
    fn into_matcher(self) -> Result<Node, GrammarError> {
        Node::literal(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::digit;

    #[test]
    fn bounds_from_ranges() {
        assert_eq!(Bounds::new(..).unwrap(), Bounds::ANY);
        assert_eq!(Bounds::new(1..).unwrap(), Bounds { min: 1, max: None });
        assert_eq!(Bounds::new(2..=4).unwrap(), Bounds { min: 2, max: Some(4) });
        assert_eq!(Bounds::new(0..3).unwrap(), Bounds { min: 0, max: Some(2) });
    }

    #[test]
    #[allow(clippy::reversed_empty_ranges)]
    fn malformed_bounds_fail_at_construction() {
        assert_eq!(Bounds::new(0..0), Err(GrammarError::ZeroRepetitions));
        assert_eq!(Bounds::new(..=0), Err(GrammarError::ZeroRepetitions));
        assert_eq!(Bounds::new(3..=2), Err(GrammarError::InvertedBounds { min: 3, max: 2 }));
        assert!(Node::repeat("a", 5..=1).is_err());
    }

    #[test]
    fn empty_rules_are_rejected() {
        assert_eq!(Node::literal("").unwrap_err(), GrammarError::EmptyLiteral);
        assert_eq!(Node::sequence(Vec::<Node>::new()).unwrap_err(), GrammarError::EmptySequence);
        assert_eq!(Node::choice(Vec::<Node>::new()).unwrap_err(), GrammarError::EmptyChoice);
        assert_eq!(Node::sequence(["a", ""]).unwrap_err(), GrammarError::EmptyLiteral);
    }

    #[test]
    fn literals_lift_into_nodes() {
        let node = Node::choice(["inline", "attachment"]).unwrap();
        assert_eq!(node.to_string(), "alt(\"inline\", \"attachment\")");
        assert_eq!(b'%'.into_matcher().unwrap().to_string(), "\"%\"");
        assert_eq!(digit().into_matcher().unwrap().predicate(), Some(digit()));
    }

    #[test]
    fn clones_share_identity_but_names_do_not() {
        let token = Node::take_while(digit(), 1..).unwrap();
        let alias = token.clone();
        let named = token.named("number");
        assert_eq!(token.id(), alias.id());
        assert_ne!(token.id(), named.id());
        assert_eq!(named.to_string(), "number");
        assert_eq!(token.name(), None);
    }
}
