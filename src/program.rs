//! The compiled form of a grammar.
//!
//! A [`Program`] is a list of procedures. Each procedure is a flat list of
//! ops over frame-local slots: registers hold offsets and counters, vars
//! hold values. By convention `r0` is the start offset, and a procedure
//! that returns leaves its end offset in `r1` and its value in `v0`.
//!
//! Failure is an exceptional exit. A failing op unwinds to the innermost
//! handler installed with `Try` in the same frame, or, with none left,
//! returns `NoMatch` from the frame.

use std::fmt;
use std::mem;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use bytes::Bytes;

use crate::ast::{Bounds, MapFn};
use crate::charset::CharClass;
use crate::error::NoMatch;
use crate::matcher::{self, MatchResult, Matcher, Success};
use crate::trace::Tracer;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcId(pub(crate) u32);

pub(crate) const START: Reg = Reg(0);
pub(crate) const RESULT: Reg = Reg(1);
pub(crate) const VALUE: Var = Var(0);

pub(crate) enum Op {
    Literal { text: Bytes, at: Reg, to: Reg, out: Var },
    /// A one-unit literal.
    Unit { text: Bytes, at: Reg, to: Reg, out: Var },
    Class { class: CharClass, at: Reg, to: Reg, out: Var },
    Scan { class: CharClass, bounds: Bounds, at: Reg, to: Reg, out: Var },
    Call { procedure: ProcId, at: Reg, to: Reg, out: Var },
    Move { from: Reg, to: Reg },
    MoveVar { from: Var, to: Var },
    Zero { reg: Reg },
    Incr { reg: Reg },
    NewList { out: Var },
    Push { list: Var, item: Var },
    Pack { items: Vec<Var>, out: Var },
    Apply { func: MapFn, from: Var, out: Var },
    Try { handler: Label },
    EndTry,
    Jump { target: Label },
    JumpIfEnd { at: Reg, target: Label },
    JumpIfEqual { reg: Reg, value: usize, target: Label },
    JumpIfStuck { from: Reg, to: Reg, target: Label },
    FailIfEnd { at: Reg },
    FailIfBelow { count: Reg, min: usize, anchor: Reg },
    Fail { anchor: Reg },
    Return,
}

pub(crate) struct Procedure {
    pub(crate) name: String,
    /// What tracers see: the rule's name, or `name` for unnamed rules.
    pub(crate) label: String,
    pub(crate) regs: usize,
    pub(crate) vars: usize,
    pub(crate) ops: Vec<Op>,
    pub(crate) labels: Vec<usize>,
}

/// A grammar lowered into procedures, ready to run many times.
///
/// It owns everything it needs, so the rules it was compiled from can be
/// dropped.
pub struct Program {
    pub(crate) procedures: Vec<Procedure>,
    pub(crate) entry: ProcId,
    pub(crate) tracer: Option<Arc<dyn Tracer>>,
}

impl Program {
    pub fn compile(node: &crate::ast::Node) -> Self {
        crate::compiler::Compiler::new().compile(node)
    }

    pub fn procedure_count(&self) -> usize {
        self.procedures.len()
    }

    pub fn op_count(&self) -> usize {
        self.procedures.iter().map(|p| p.ops.len()).sum()
    }

    pub fn procedure_names(&self) -> impl Iterator<Item = &str> {
        self.procedures.iter().map(|p| p.name.as_str())
    }

    fn call(&self, id: ProcId, input: &Bytes, start: usize, end: usize) -> MatchResult {
        let procedure = &self.procedures[id.0 as usize];
        match &self.tracer {
            Some(tracer) => {
                tracer.enter(&procedure.label, start, end);
                let result = self.execute(procedure, input, start, end);
                tracer.exit(&procedure.label, &result);
                result
            }
            None => self.execute(procedure, input, start, end),
        }
    }

    fn execute(&self, procedure: &Procedure, input: &Bytes, start: usize, end: usize) -> MatchResult {
        let mut frame = Frame::new(procedure);
        let mut handlers: Vec<usize> = Vec::new();
        frame[START] = start;

        let mut pc = 0;
        loop {
            let op = &procedure.ops[pc];
            pc += 1;
            let fault = match op {
                Op::Literal { text, at, to, out } => {
                    let start = frame[*at];
                    let stop = start + text.len();
                    if stop <= end && input[start..stop] == text[..] {
                        frame[*to] = stop;
                        frame[*out] = Value::Bytes(text.clone());
                        None
                    } else {
                        Some(start)
                    }
                }
                Op::Unit { text, at, to, out } => {
                    let start = frame[*at];
                    if start < end && input[start] == text[0] {
                        frame[*to] = start + 1;
                        frame[*out] = Value::Bytes(text.clone());
                        None
                    } else {
                        Some(start)
                    }
                }
                Op::Class { class, at, to, out } => {
                    let start = frame[*at];
                    if start < end && class.contains(input[start]) {
                        frame[*to] = start + 1;
                        frame[*out] = Value::Byte(input[start]);
                        None
                    } else {
                        Some(start)
                    }
                }
                Op::Scan { class, bounds, at, to, out } => {
                    let start = frame[*at];
                    let limit = bounds.max.map_or(end, |max| end.min(start.saturating_add(max)));
                    let stop = matcher::scan(input, start, limit, *class);
                    if stop - start < bounds.min {
                        Some(start)
                    } else {
                        frame[*to] = stop;
                        frame[*out] = Value::Bytes(input.slice(start..stop));
                        None
                    }
                }
                Op::Call { procedure: callee, at, to, out } => match self.call(*callee, input, frame[*at], end) {
                    Ok(success) => {
                        frame[*to] = success.position;
                        frame[*out] = success.value;
                        None
                    }
                    Err(no_match) => Some(no_match.position),
                },
                Op::Move { from, to } => {
                    frame[*to] = frame[*from];
                    None
                }
                Op::MoveVar { from, to } => {
                    let value = frame.take(*from);
                    frame[*to] = value;
                    None
                }
                Op::Zero { reg } => {
                    frame[*reg] = 0;
                    None
                }
                Op::Incr { reg } => {
                    frame[*reg] += 1;
                    None
                }
                Op::NewList { out } => {
                    frame[*out] = Value::List(Vec::new());
                    None
                }
                Op::Push { list, item } => {
                    let item = frame.take(*item);
                    if let Value::List(items) = &mut frame[*list] {
                        items.push(item);
                    }
                    None
                }
                Op::Pack { items, out } => {
                    let values: Vec<Value> = items.iter().map(|item| frame.take(*item)).collect();
                    frame[*out] = Value::List(values);
                    None
                }
                Op::Apply { func, from, out } => {
                    let value = frame.take(*from);
                    frame[*out] = func(value);
                    None
                }
                Op::Try { handler } => {
                    handlers.push(procedure.labels[handler.0 as usize]);
                    None
                }
                Op::EndTry => {
                    handlers.pop();
                    None
                }
                Op::Jump { target } => {
                    pc = procedure.labels[target.0 as usize];
                    None
                }
                Op::JumpIfEnd { at, target } => {
                    if frame[*at] == end {
                        pc = procedure.labels[target.0 as usize];
                    }
                    None
                }
                Op::JumpIfEqual { reg, value, target } => {
                    if frame[*reg] == *value {
                        pc = procedure.labels[target.0 as usize];
                    }
                    None
                }
                Op::JumpIfStuck { from, to, target } => {
                    if frame[*to] <= frame[*from] {
                        pc = procedure.labels[target.0 as usize];
                    }
                    None
                }
                Op::FailIfEnd { at } => (frame[*at] == end).then_some(end),
                Op::FailIfBelow { count, min, anchor } => (frame[*count] < *min).then(|| frame[*anchor]),
                Op::Fail { anchor } => Some(frame[*anchor]),
                Op::Return => return Ok(Success::new(frame[RESULT], frame.take(VALUE))),
            };

            if let Some(anchor) = fault {
                match handlers.pop() {
                    Some(handler) => pc = handler,
                    None => return Err(NoMatch::at(anchor)),
                }
            }
        }
    }
}

impl Matcher for Program {
    fn attempt(&self, input: &Bytes, start: usize, end: usize) -> MatchResult {
        let end = end.min(input.len());
        if start > end {
            return Err(NoMatch::at(start));
        }
        self.call(self.entry, input, start, end)
    }
}

struct Frame {
    regs: Vec<usize>,
    vars: Vec<Value>,
}

impl Frame {
    fn new(procedure: &Procedure) -> Self {
        Self {
            regs: vec![0; procedure.regs],
            vars: vec![Value::default(); procedure.vars],
        }
    }

    fn take(&mut self, var: Var) -> Value {
        mem::take(&mut self.vars[var.0 as usize])
    }
}

impl Index<Reg> for Frame {
    type Output = usize;

    fn index(&self, reg: Reg) -> &usize {
        &self.regs[reg.0 as usize]
    }
}

impl IndexMut<Reg> for Frame {
    fn index_mut(&mut self, reg: Reg) -> &mut usize {
        &mut self.regs[reg.0 as usize]
    }
}

impl Index<Var> for Frame {
    type Output = Value;

    fn index(&self, var: Var) -> &Value {
        &self.vars[var.0 as usize]
    }
}

impl IndexMut<Var> for Frame {
    fn index_mut(&mut self, var: Var) -> &mut Value {
        &mut self.vars[var.0 as usize]
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, procedure) in self.procedures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "fn {}({START}) -> ({RESULT}, {VALUE}):", procedure.name)?;
            for (pc, op) in procedure.ops.iter().enumerate() {
                write!(f, "  {pc:>4}  ")?;
                self.write_op(f, procedure, op)?;
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

impl Program {
    fn write_op(&self, f: &mut fmt::Formatter<'_>, procedure: &Procedure, op: &Op) -> fmt::Result {
        let target = |label: &Label| procedure.labels[label.0 as usize];
        match op {
            Op::Literal { text, at, to, out } => write!(f, "literal \"{}\" {at} -> {to}, {out}", text.escape_ascii()),
            Op::Unit { text, at, to, out } => write!(f, "unit \"{}\" {at} -> {to}, {out}", text.escape_ascii()),
            Op::Class { class, at, to, out } => write!(f, "class {class} {at} -> {to}, {out}"),
            Op::Scan { class, bounds, at, to, out } => write!(f, "scan {class} {bounds} {at} -> {to}, {out}"),
            Op::Call { procedure: callee, at, to, out } => {
                let name = &self.procedures[callee.0 as usize].name;
                write!(f, "call {name} {at} -> {to}, {out}")
            }
            Op::Move { from, to } => write!(f, "move {from} -> {to}"),
            Op::MoveVar { from, to } => write!(f, "move {from} -> {to}"),
            Op::Zero { reg } => write!(f, "zero {reg}"),
            Op::Incr { reg } => write!(f, "incr {reg}"),
            Op::NewList { out } => write!(f, "list {out}"),
            Op::Push { list, item } => write!(f, "push {list} <- {item}"),
            Op::Pack { items, out } => {
                write!(f, "pack [")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "] -> {out}")
            }
            Op::Apply { from, out, .. } => write!(f, "apply {from} -> {out}"),
            Op::Try { handler } => write!(f, "try @{}", target(handler)),
            Op::EndTry => write!(f, "end try"),
            Op::Jump { target: label } => write!(f, "jump @{}", target(label)),
            Op::JumpIfEnd { at, target: label } => write!(f, "jump @{} if {at} == end", target(label)),
            Op::JumpIfEqual { reg, value, target: label } => write!(f, "jump @{} if {reg} == {value}", target(label)),
            Op::JumpIfStuck { from, to, target: label } => write!(f, "jump @{} if {to} <= {from}", target(label)),
            Op::FailIfEnd { at } => write!(f, "fail end if {at} == end"),
            Op::FailIfBelow { count, min, anchor } => write!(f, "fail {anchor} if {count} < {min}"),
            Op::Fail { anchor } => write!(f, "fail {anchor}"),
            Op::Return => write!(f, "return {RESULT}, {VALUE}"),
        }
    }
}
