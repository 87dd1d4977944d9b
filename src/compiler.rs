//! Lowering of a rule tree into a [`Program`].
//!
//! Every rule emits a fragment that reads the offset in its `at` register
//! and, when it matches, writes its end offset to `to` and its value to
//! `out` as the very last thing it does. A fragment that fails raises and
//! writes nothing, which is what lets a sequence reuse one cursor register
//! as both `at` and `to` for all of its elements.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ast::{Bounds, MapFn, Node, NodeKind};
use crate::program::{Label, Op, ProcId, Procedure, Program, Reg, Var, RESULT, START, VALUE};
use crate::trace::Tracer;

#[derive(Default)]
pub struct Compiler {
    tracer: Option<Arc<dyn Tracer>>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled procedures report entry and exit to `tracer`.
    pub fn with_tracer(tracer: Arc<dyn Tracer>) -> Self {
        Self { tracer: Some(tracer) }
    }

    pub fn compile(&self, node: &Node) -> Program {
        let mut emitter = Emitter::new(node);
        let entry = emitter.procedure(node, "main");
        let program = Program {
            procedures: emitter.procedures,
            entry,
            tracer: self.tracer.clone(),
        };
        log::debug!(
            "compiled {} into {} procedures, {} ops",
            node,
            program.procedure_count(),
            program.op_count()
        );
        program
    }
}

/// State shared by all procedures of one program.
struct Emitter {
    procedures: Vec<Procedure>,
    names: HashSet<String>,
    memo: HashMap<usize, ProcId>,
    outlined: HashSet<usize>,
}

impl Emitter {
    fn new(root: &Node) -> Self {
        Self {
            procedures: Vec::new(),
            names: HashSet::new(),
            memo: HashMap::new(),
            outlined: outlined(root),
        }
    }

    fn fresh_name(&mut self, prefix: &str) -> String {
        let name = if prefix == "main" && !self.names.contains(prefix) {
            prefix.to_owned()
        } else {
            (0..)
                .map(|i| format!("{prefix}_{i}"))
                .find(|name| !self.names.contains(name))
                .unwrap_or_default()
        };
        self.names.insert(name.clone());
        name
    }

    /// Emits `node` as a procedure of its own, once per rule instance.
    fn procedure(&mut self, node: &Node, prefix: &str) -> ProcId {
        if let Some(&id) = self.memo.get(&node.id()) {
            return id;
        }
        let name = self.fresh_name(prefix);
        let id = ProcId(self.procedures.len() as u32);
        self.memo.insert(node.id(), id);
        // Reserve the slot so callees emitted meanwhile get later ids.
        let label = node.name().map_or_else(|| name.clone(), str::to_owned);
        self.procedures.push(Procedure {
            name: name.clone(),
            label: label.clone(),
            regs: 0,
            vars: 0,
            ops: Vec::new(),
            labels: Vec::new(),
        });

        let mut function = FunctionContext::new(name, label, node.id());
        self.fragment(&mut function, node, START, RESULT, VALUE);
        function.emit(Op::Return);
        self.procedures[id.0 as usize] = function.finish();
        id
    }

    fn fragment(&mut self, function: &mut FunctionContext, node: &Node, at: Reg, to: Reg, out: Var) {
        if node.id() != function.owner && self.outlined.contains(&node.id()) {
            let procedure = self.procedure(node, node.name().unwrap_or("fn"));
            function.emit(Op::Call { procedure, at, to, out });
            return;
        }

        match node.kind() {
            NodeKind::Literal(text) if text.len() == 1 => {
                function.emit(Op::Unit { text: text.clone(), at, to, out });
            }
            NodeKind::Literal(text) => {
                function.emit(Op::Literal { text: text.clone(), at, to, out });
            }
            NodeKind::Class(class) => {
                function.emit(Op::Class { class: *class, at, to, out });
            }
            NodeKind::TakeWhile { class, bounds } => {
                function.emit(Op::Scan { class: *class, bounds: *bounds, at, to, out });
            }
            NodeKind::Sequence(nodes) => self.sequence(function, nodes, at, to, out),
            NodeKind::Choice(nodes) => self.choice(function, nodes, at, to, out),
            NodeKind::Repeat { node, bounds } => self.repeat(function, node, *bounds, at, to, out),
            NodeKind::Map { node, func } => self.map(function, node, func, at, to, out),
        }
    }

    fn sequence(&mut self, function: &mut FunctionContext, nodes: &[Node], at: Reg, to: Reg, out: Var) {
        let cursor = function.new_reg();
        function.emit(Op::Move { from: at, to: cursor });
        let mut items = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let item = function.new_var();
            self.fragment(function, node, cursor, cursor, item);
            if i + 1 != nodes.len() {
                function.emit(Op::FailIfEnd { at: cursor });
            }
            items.push(item);
        }
        function.emit(Op::Move { from: cursor, to });
        function.emit(Op::Pack { items, out });
    }

    // Each alternative runs under a handler that resumes at the next one;
    // the first to succeed jumps past the rest.
    fn choice(&mut self, function: &mut FunctionContext, nodes: &[Node], at: Reg, to: Reg, out: Var) {
        let done = function.new_label();
        for node in nodes {
            let next = function.new_label();
            function.emit(Op::Try { handler: next });
            self.fragment(function, node, at, to, out);
            function.emit(Op::EndTry);
            function.emit(Op::Jump { target: done });
            function.bind(next);
        }
        function.emit(Op::Fail { anchor: at });
        function.bind(done);
    }

    fn repeat(&mut self, function: &mut FunctionContext, node: &Node, bounds: Bounds, at: Reg, to: Reg, out: Var) {
        let cursor = function.new_reg();
        let next = function.new_reg();
        let item = function.new_var();
        let list = function.new_var();
        let count = (bounds.min > 0 || bounds.max.is_some()).then(|| function.new_reg());
        let head = function.new_label();
        let exit = function.new_label();

        function.emit(Op::Move { from: at, to: cursor });
        function.emit(Op::NewList { out: list });
        if let Some(count) = count {
            function.emit(Op::Zero { reg: count });
        }

        function.bind(head);
        if let (Some(count), Some(max)) = (count, bounds.max) {
            function.emit(Op::JumpIfEqual { reg: count, value: max, target: exit });
        }
        function.emit(Op::JumpIfEnd { at: cursor, target: exit });
        function.emit(Op::Try { handler: exit });
        self.fragment(function, node, cursor, next, item);
        function.emit(Op::EndTry);
        function.emit(Op::JumpIfStuck { from: cursor, to: next, target: exit });
        function.emit(Op::Push { list, item });
        function.emit(Op::Move { from: next, to: cursor });
        if let Some(count) = count {
            function.emit(Op::Incr { reg: count });
        }
        function.emit(Op::Jump { target: head });

        function.bind(exit);
        if let (Some(count), true) = (count, bounds.min > 0) {
            function.emit(Op::FailIfBelow { count, min: bounds.min, anchor: at });
        }
        function.emit(Op::Move { from: cursor, to });
        function.emit(Op::MoveVar { from: list, to: out });
    }

    fn map(&mut self, function: &mut FunctionContext, node: &Node, func: &MapFn, at: Reg, to: Reg, out: Var) {
        let value = function.new_var();
        self.fragment(function, node, at, to, value);
        function.emit(Op::Apply { func: func.clone(), from: value, out });
    }
}

/// Slots, labels and ops of the procedure being emitted.
struct FunctionContext {
    name: String,
    label: String,
    owner: usize,
    regs: u32,
    vars: u32,
    ops: Vec<Op>,
    labels: Vec<Option<usize>>,
}

impl FunctionContext {
    fn new(name: String, label: String, owner: usize) -> Self {
        Self {
            name,
            label,
            owner,
            // r0 and r1 are the start and end offsets, v0 the value
            regs: 2,
            vars: 1,
            ops: Vec::new(),
            labels: Vec::new(),
        }
    }

    fn new_reg(&mut self) -> Reg {
        self.regs += 1;
        Reg(self.regs - 1)
    }

    fn new_var(&mut self) -> Var {
        self.vars += 1;
        Var(self.vars - 1)
    }

    fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Points `label` at the next op emitted.
    fn bind(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.ops.len());
    }

    fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    fn finish(self) -> Procedure {
        debug_assert!(self.labels.iter().all(Option::is_some), "unbound label in {}", self.name);
        let end = self.ops.len();
        Procedure {
            name: self.name,
            label: self.label,
            regs: self.regs as usize,
            vars: self.vars as usize,
            ops: self.ops,
            labels: self.labels.into_iter().map(|pc| pc.unwrap_or(end)).collect(),
        }
    }
}

/// Rules that get a procedure of their own: named ones, and ones reached
/// from more than one place. Unnamed leaves are always inlined.
fn outlined(root: &Node) -> HashSet<usize> {
    let mut seen = HashMap::new();
    count_uses(root, &mut seen);
    let mut outlined = HashSet::new();
    collect_outlined(root, &seen, &mut outlined, &mut HashSet::new());
    outlined
}

fn count_uses(node: &Node, seen: &mut HashMap<usize, usize>) {
    let uses = seen.entry(node.id()).or_insert(0);
    *uses += 1;
    if *uses == 1 {
        for child in node.children() {
            count_uses(child, seen);
        }
    }
}

fn collect_outlined(node: &Node, seen: &HashMap<usize, usize>, outlined: &mut HashSet<usize>, visited: &mut HashSet<usize>) {
    if !visited.insert(node.id()) {
        return;
    }
    let shared = seen.get(&node.id()).is_some_and(|&uses| uses > 1);
    if node.name().is_some() || (shared && !node.is_leaf()) {
        outlined.insert(node.id());
    }
    for child in node.children() {
        collect_outlined(child, seen, outlined, visited);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::charset::{digit, hexdigit};
    use crate::error::NoMatch;
    use crate::matcher::{Matcher, Success};
    use crate::value::Value;

    fn attempt(program: &Program, input: &'static str) -> Result<Success, NoMatch> {
        let input = Bytes::from_static(input.as_bytes());
        program.attempt(&input, 0, input.len())
    }

    #[test]
    fn literal_compiles_to_one_op() {
        let program = Program::compile(&Node::literal("GET").unwrap());
        assert_eq!(program.procedure_count(), 1);
        assert_eq!(program.op_count(), 2);
        assert_eq!(attempt(&program, "GET /").unwrap(), Success::new(3, Value::from("GET")));
    }

    #[test]
    fn choice_resets_between_alternatives() {
        let first = Node::sequence(["at", "x"]).unwrap();
        let node = Node::choice([first, Node::literal("attachment").unwrap()]).unwrap();
        let program = Program::compile(&node);
        assert_eq!(attempt(&program, "attachment; x").unwrap().position, 10);
        assert_eq!(attempt(&program, "inline"), Err(NoMatch::at(0)));
    }

    #[test]
    fn sequence_failure_reports_element_offset() {
        let program = Program::compile(&Node::sequence(["a", "b"]).unwrap());
        assert_eq!(attempt(&program, "ac"), Err(NoMatch::at(1)));
    }

    #[test]
    fn bounded_repeat_counts() {
        let node = Node::repeat(Node::class(digit()), 2..=3).unwrap();
        let program = Program::compile(&node);
        let success = attempt(&program, "12345").unwrap();
        assert_eq!(success.position, 3);
        assert_eq!(success.value.as_list().map(<[Value]>::len), Some(3));
        assert_eq!(attempt(&program, "1x"), Err(NoMatch::at(0)));
    }

    #[test]
    fn shared_rules_get_one_procedure() {
        let hex = Node::sequence([Node::class(hexdigit()), Node::class(hexdigit())]).unwrap();
        let node = Node::choice([
            Node::sequence([Node::literal("%").unwrap(), hex.clone()]).unwrap(),
            Node::sequence([Node::literal("#").unwrap(), hex]).unwrap(),
        ])
        .unwrap();
        let program = Program::compile(&node);
        assert_eq!(program.procedure_names().collect::<Vec<_>>(), ["main", "fn_0"]);
        assert_eq!(attempt(&program, "#a0").unwrap().position, 3);
    }

    #[test]
    fn named_rules_get_fresh_names() {
        let token = Node::many(Node::class(digit())).unwrap();
        let node = Node::sequence([token.named("num"), Node::literal(".").unwrap(), token.named("num")]).unwrap();
        let program = Program::compile(&node);
        assert_eq!(program.procedure_names().collect::<Vec<_>>(), ["main", "num_0", "num_1"]);
    }

    #[test]
    fn named_leaves_get_a_procedure() {
        let number = Node::take_while(digit(), 1..).unwrap().named("number");
        let node = Node::sequence([number, Node::literal(";").unwrap()]).unwrap();
        let program = Program::compile(&node);
        assert_eq!(program.procedure_names().collect::<Vec<_>>(), ["main", "number_0"]);
        assert_eq!(attempt(&program, "12;").unwrap().position, 3);
    }

    #[test]
    fn listing_shows_every_procedure() {
        let node = Node::sequence([Node::choice(["a", "b"]).unwrap().named("ab"), Node::literal("c").unwrap()]).unwrap();
        let listing = Program::compile(&node).to_string();
        assert!(listing.starts_with("fn main(r0) -> (r1, v0):"));
        assert!(listing.contains("call ab_0 r2 -> r2, v1"));
        assert!(listing.contains("fn ab_0(r0) -> (r1, v0):"));
        assert!(listing.contains("unit \"a\" r0 -> r1, v0"));
    }
}
