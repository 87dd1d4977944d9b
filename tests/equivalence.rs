use std::sync::Arc;

use bytes::Bytes;
use crunching::trace::Recorder;
use crunching::{CharClass, Grammar, Matcher, Node, Value};
use proptest::prelude::*;
use proptest::sample::{select, subsequence};

const ALPHABET: [u8; 3] = [b'a', b'b', b'c'];

fn class() -> impl Strategy<Value = CharClass> {
    prop_oneof![
        subsequence(ALPHABET.to_vec(), 1..=2).prop_map(|units| CharClass::one_of(units)),
        subsequence(ALPHABET.to_vec(), 1..=2).prop_map(|units| CharClass::none_of(units)),
        Just(CharClass::Any),
    ]
}

fn bounded(min: usize, extra: Option<usize>) -> (usize, Option<usize>) {
    (min, extra.map(|extra| (min + extra).max(1)))
}

fn leaf() -> impl Strategy<Value = Node> {
    prop_oneof![
        "[abc]{1,3}".prop_map(|text| Node::literal(text).unwrap()),
        class().prop_map(Node::class),
        (class(), 0usize..3, proptest::option::of(0usize..3)).prop_map(|(class, min, extra)| {
            match bounded(min, extra) {
                (min, Some(max)) => Node::take_while(class, min..=max).unwrap(),
                (min, None) => Node::take_while(class, min..).unwrap(),
            }
        }),
    ]
}

fn node() -> impl Strategy<Value = Node> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 1..4).prop_map(|nodes| Node::sequence(nodes).unwrap()),
            proptest::collection::vec(inner.clone(), 1..4).prop_map(|nodes| Node::choice(nodes).unwrap()),
            (inner.clone(), 0usize..3, proptest::option::of(0usize..3)).prop_map(|(node, min, extra)| {
                match bounded(min, extra) {
                    (min, Some(max)) => Node::repeat(node, min..=max).unwrap(),
                    (min, None) => Node::repeat(node, min..).unwrap(),
                }
            }),
            inner.clone().prop_map(|node| Node::map(node, |value| Value::Bytes(Bytes::from(value.flatten()))).unwrap()),
            // the same rule instance reached twice
            inner.clone().prop_map(|node| Node::sequence([node.clone(), node]).unwrap()),
            inner.prop_map(|node| node.named("rule")),
        ]
    })
}

fn input() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(select(ALPHABET.to_vec()), 0..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn strategies_agree(node in node(), input in input()) {
        let grammar = Grammar::new(&node).unwrap();
        let input = Bytes::from(input);
        for start in 0..=input.len() {
            for end in start..=input.len() {
                prop_assert_eq!(
                    grammar.interpreted().attempt(&input, start, end),
                    grammar.compiled().attempt(&input, start, end),
                    "rule {} at {}..{}", node, start, end
                );
            }
        }
    }

    #[test]
    fn tracing_does_not_change_results(node in node(), input in input()) {
        let plain = Grammar::new(&node).unwrap();
        let traced = Grammar::new(&node).unwrap().with_tracer(Arc::new(Recorder::new()));
        let input = Bytes::from(input);
        let end = input.len();
        prop_assert_eq!(plain.interpreted().attempt(&input, 0, end), traced.interpreted().attempt(&input, 0, end));
        prop_assert_eq!(plain.compiled().attempt(&input, 0, end), traced.compiled().attempt(&input, 0, end));
    }

    #[test]
    fn failures_stay_inside_the_window(node in node(), input in input()) {
        let grammar = Grammar::new(&node).unwrap();
        let input = Bytes::from(input);
        let end = input.len();
        match grammar.compiled().attempt(&input, 0, end) {
            Ok(success) => prop_assert!(success.position <= end),
            Err(no_match) => prop_assert!(no_match.position <= end),
        }
    }
}
