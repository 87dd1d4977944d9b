use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::ast::{Bounds, MapFn, Node, NodeKind};
use crate::charset::CharClass;
use crate::error::NoMatch;
use crate::trace::Tracer;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Success {
    pub position: usize,
    pub value: Value,
}

impl Success {
    pub fn new(position: usize, value: Value) -> Self {
        Self { position, value }
    }
}

pub type MatchResult = Result<Success, NoMatch>;

/// Something that can attempt a match on `input[start..end]`.
pub trait Matcher {
    /// Matches at `start`, never reading at or past `end`.
    ///
    /// `end` is clamped to the input length; a `start` past `end` fails at
    /// `start`.
    fn attempt(&self, input: &Bytes, start: usize, end: usize) -> MatchResult;
}

type Procedure = Arc<dyn Fn(&Bytes, usize, usize) -> MatchResult + Send + Sync>;

/// The interpreted strategy: one closure per rule, called recursively.
pub struct Interpreted {
    entry: Procedure,
    procedures: usize,
}

impl Interpreted {
    pub fn new(node: &Node) -> Self {
        Builder::new(None).finish(node)
    }

    pub fn with_tracer(node: &Node, tracer: Arc<dyn Tracer>) -> Self {
        Builder::new(Some(tracer)).finish(node)
    }

    /// Number of distinct rule instances that got a closure.
    pub fn procedure_count(&self) -> usize {
        self.procedures
    }
}

impl Matcher for Interpreted {
    fn attempt(&self, input: &Bytes, start: usize, end: usize) -> MatchResult {
        let end = end.min(input.len());
        if start > end {
            return Err(NoMatch::at(start));
        }
        (self.entry)(input, start, end)
    }
}

struct Builder {
    memo: HashMap<usize, Procedure>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl Builder {
    fn new(tracer: Option<Arc<dyn Tracer>>) -> Self {
        Self {
            memo: HashMap::new(),
            tracer,
        }
    }

    fn finish(mut self, node: &Node) -> Interpreted {
        let entry = self.procedure(node);
        Interpreted {
            entry,
            procedures: self.memo.len(),
        }
    }

    // Shared rule instances are built once.
    fn procedure(&mut self, node: &Node) -> Procedure {
        if let Some(procedure) = self.memo.get(&node.id()) {
            return procedure.clone();
        }
        let procedure = self.build(node);
        let procedure = match &self.tracer {
            Some(tracer) => traced(procedure, tracer.clone(), self.label(node)),
            None => procedure,
        };
        self.memo.insert(node.id(), procedure.clone());
        procedure
    }

    /// Named rules and leaves print as themselves, other rules as their
    /// kind and build order, e.g. `seq#4`.
    fn label(&self, node: &Node) -> String {
        if node.name().is_some() || node.is_leaf() {
            return node.to_string();
        }
        let kind = match node.kind() {
            NodeKind::Sequence(_) => "seq",
            NodeKind::Choice(_) => "alt",
            NodeKind::Repeat { .. } => "many",
            NodeKind::Map { .. } => "map",
            NodeKind::Literal(_) | NodeKind::Class(_) | NodeKind::TakeWhile { .. } => "leaf",
        };
        format!("{kind}#{}", self.memo.len())
    }

    fn build(&mut self, node: &Node) -> Procedure {
        match node.kind() {
            NodeKind::Literal(text) => literal(text.clone()),
            NodeKind::Class(class) => class_unit(*class),
            NodeKind::Sequence(nodes) => {
                let children = nodes.iter().map(|n| self.procedure(n)).collect();
                sequence(children)
            }
            NodeKind::Choice(nodes) => {
                let children = nodes.iter().map(|n| self.procedure(n)).collect();
                choice(children)
            }
            NodeKind::Repeat { node, bounds } => repeat(self.procedure(node), *bounds),
            NodeKind::TakeWhile { class, bounds } => take_while(*class, *bounds),
            NodeKind::Map { node, func } => map(self.procedure(node), func.clone()),
        }
    }
}

fn literal(text: Bytes) -> Procedure {
    if let [unit] = text[..] {
        return Arc::new(move |input: &Bytes, start: usize, end: usize| {
            if start < end && input[start] == unit {
                Ok(Success::new(start + 1, Value::Bytes(text.clone())))
            } else {
                Err(NoMatch::at(start))
            }
        });
    }
    Arc::new(move |input: &Bytes, start: usize, end: usize| {
        let stop = start + text.len();
        if stop <= end && input[start..stop] == text[..] {
            Ok(Success::new(stop, Value::Bytes(text.clone())))
        } else {
            Err(NoMatch::at(start))
        }
    })
}

fn class_unit(class: CharClass) -> Procedure {
    Arc::new(move |input: &Bytes, start: usize, end: usize| {
        if start < end && class.contains(input[start]) {
            Ok(Success::new(start + 1, Value::Byte(input[start])))
        } else {
            Err(NoMatch::at(start))
        }
    })
}

fn sequence(children: Vec<Procedure>) -> Procedure {
    let last = children.len() - 1;
    Arc::new(move |input: &Bytes, start: usize, end: usize| {
        let mut position = start;
        let mut values = Vec::with_capacity(children.len());
        for (i, child) in children.iter().enumerate() {
            let step = child(input, position, end)?;
            position = step.position;
            values.push(step.value);
            // Elements left over at the end of input cannot match anything.
            if position == end && i != last {
                return Err(NoMatch::at(position));
            }
        }
        Ok(Success::new(position, Value::List(values)))
    })
}

fn choice(children: Vec<Procedure>) -> Procedure {
    Arc::new(move |input: &Bytes, start: usize, end: usize| {
        for child in &children {
            if let Ok(success) = child(input, start, end) {
                return Ok(success);
            }
        }
        Err(NoMatch::at(start))
    })
}

fn repeat(child: Procedure, bounds: Bounds) -> Procedure {
    Arc::new(move |input: &Bytes, start: usize, end: usize| {
        let mut position = start;
        let mut values = Vec::new();
        while !bounds.is_full(values.len()) && position < end {
            match child(input, position, end) {
                // A match that does not move would repeat forever.
                Ok(step) if step.position > position => {
                    position = step.position;
                    values.push(step.value);
                }
                _ => break,
            }
        }
        if values.len() < bounds.min {
            return Err(NoMatch::at(start));
        }
        Ok(Success::new(position, Value::List(values)))
    })
}

fn take_while(class: CharClass, bounds: Bounds) -> Procedure {
    Arc::new(move |input: &Bytes, start: usize, end: usize| {
        let limit = bounds.max.map_or(end, |max| end.min(start.saturating_add(max)));
        let stop = scan(input, start, limit, class);
        if stop - start < bounds.min {
            return Err(NoMatch::at(start));
        }
        Ok(Success::new(stop, Value::Bytes(input.slice(start..stop))))
    })
}

/// First offset in `start..limit` whose unit `class` rejects, or `limit`.
pub(crate) fn scan(input: &[u8], start: usize, limit: usize, class: CharClass) -> usize {
    input[start..limit]
        .iter()
        .position(|&unit| !class.contains(unit))
        .map_or(limit, |n| start + n)
}

fn map(child: Procedure, func: MapFn) -> Procedure {
    Arc::new(move |input: &Bytes, start: usize, end: usize| {
        let step = child(input, start, end)?;
        Ok(Success::new(step.position, func(step.value)))
    })
}

fn traced(procedure: Procedure, tracer: Arc<dyn Tracer>, label: String) -> Procedure {
    Arc::new(move |input: &Bytes, start: usize, end: usize| {
        tracer.enter(&label, start, end);
        let result = procedure(input, start, end);
        tracer.exit(&label, &result);
        result
    })
}
