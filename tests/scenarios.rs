use bytes::Bytes;
use crunching::charset::{digit, hexdigit};
use crunching::{run, Error, NoMatch, Node, Strategy, Value};
use rstest::rstest;

fn decode_hex(value: Value) -> Value {
    let digits = value.flatten();
    std::str::from_utf8(&digits[1..])
        .ok()
        .and_then(|text| u8::from_str_radix(text, 16).ok())
        .map_or_else(Value::default, Value::Byte)
}

#[rstest]
fn literal_consumes_its_prefix(#[values(Strategy::Interpreted, Strategy::Compiled)] strategy: Strategy) {
    let parsed = run("GET", "GET /", strategy).unwrap();
    assert_eq!(parsed.position, 3);
    assert_eq!(parsed.value, Value::from("GET"));
    assert_eq!(parsed.remainder, Bytes::from_static(b" /"));
}

#[rstest]
fn sequence_fails_where_an_element_fails(#[values(Strategy::Interpreted, Strategy::Compiled)] strategy: Strategy) {
    let node = Node::sequence(["a", "b"]);
    assert_eq!(run(node, "ac", strategy), Err(Error::NoMatch(NoMatch::at(1))));
}

#[rstest]
fn choice_takes_the_matching_alternative(#[values(Strategy::Interpreted, Strategy::Compiled)] strategy: Strategy) {
    let node = Node::choice(["inline", "attachment"]);
    let parsed = run(node, "attachment; x", strategy).unwrap();
    assert_eq!(parsed.value, Value::from("attachment"));
    assert_eq!(parsed.remainder, Bytes::from_static(b"; x"));
}

#[rstest]
fn repeated_digits_stop_at_the_first_letter(#[values(Strategy::Interpreted, Strategy::Compiled)] strategy: Strategy) {
    let parsed = run(Node::repeat(digit(), 1..), "123abc", strategy).unwrap();
    assert_eq!(parsed.value.flatten(), b"123");
    assert_eq!(parsed.remainder, Bytes::from_static(b"abc"));

    let parsed = run(Node::take_while(digit(), 1..), "123abc", strategy).unwrap();
    assert_eq!(parsed.value, Value::from("123"));
    assert_eq!(parsed.remainder, Bytes::from_static(b"abc"));
}

#[rstest]
fn repeated_digits_need_one_digit(#[values(Strategy::Interpreted, Strategy::Compiled)] strategy: Strategy) {
    assert_eq!(run(Node::repeat(digit(), 1..), "abc", strategy), Err(Error::NoMatch(NoMatch::at(0))));
    assert_eq!(run(Node::take_while(digit(), 1..), "abc", strategy), Err(Error::NoMatch(NoMatch::at(0))));
}

#[rstest]
fn transform_decodes_an_escape(#[values(Strategy::Interpreted, Strategy::Compiled)] strategy: Strategy) {
    let hex = Node::class(hexdigit());
    let escape = Node::map(Node::sequence([Node::literal("%").unwrap(), hex.clone(), hex]), decode_hex);
    let parsed = run(escape, "%20x", strategy).unwrap();
    assert_eq!(parsed.value, Value::Byte(0x20));
    assert_eq!(parsed.remainder, Bytes::from_static(b"x"));
}

#[rstest]
fn empty_input(#[values(Strategy::Interpreted, Strategy::Compiled)] strategy: Strategy) {
    assert_eq!(run(Node::any(), "", strategy), Err(Error::NoMatch(NoMatch::at(0))));
    let parsed = run(Node::many("a"), "", strategy).unwrap();
    assert_eq!(parsed.value, Value::List(vec![]));
    assert_eq!(parsed.position, 0);
}

#[rstest]
#[case("[0-9]+", "2024-10", b"-10")]
#[case("(inline|attachment);", "attachment; x", b" x")]
#[case("a{2,3}", "aaaa", b"a")]
#[case("\\w+=\\d*", "key=12&x", b"&x")]
fn patterns_drive_both_strategies(
    #[case] pattern: &str,
    #[case] input: &'static str,
    #[case] remainder: &'static [u8],
    #[values(Strategy::Interpreted, Strategy::Compiled)] strategy: Strategy,
) {
    let grammar = crunching::Grammar::from_pattern(pattern).unwrap();
    let parsed = grammar.run(input, strategy).unwrap();
    assert_eq!(parsed.remainder, Bytes::from_static(remainder));
}
