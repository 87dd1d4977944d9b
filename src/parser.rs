use crate::ast::Node;
use crate::charset::{self, ByteSet, CharClass};
use crate::error::PatternError;

/// Builds a rule tree from pattern notation.
///
/// Example:
/// - Pattern: `GET|POST` → Choice([Literal("GET"), Literal("POST")])
pub fn parse_pattern(pattern: &str) -> Result<Node, PatternError> {
    let mut parser = Parser::new(pattern);
    let node = parser.parse()?;
    match parser.peek() {
        None => Ok(node),
        Some(found) => Err(PatternError::Unexpected {
            found,
            position: parser.pos,
        }),
    }
}

/// Cursor over a pattern, by byte offset.
pub struct Parser<'a> {
    pattern: &'a str,
    pos: usize,
}

/// One parsed atom, before quantifiers are applied.
enum Atom {
    Char(char),
    Class(CharClass),
    Node(Node),
}

/// One element of a sequence. Adjacent text is merged into one literal.
enum Piece {
    Text(String),
    Node(Node),
}

impl<'a> Parser<'a> {
    pub fn new(pattern: &'a str) -> Self {
        Self { pattern, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.pattern[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consumes `c` if it is next.
    fn eat(&mut self, c: char) -> bool {
        let found = self.peek() == Some(c);
        if found {
            self.pos += c.len_utf8();
        }
        found
    }

    /// Consumes the `close` of a `what` opened at `open`.
    fn close(&mut self, close: char, what: &'static str, open: usize) -> Result<(), PatternError> {
        if self.eat(close) {
            Ok(())
        } else {
            Err(PatternError::Unclosed { what, position: open })
        }
    }

    /// Entry point for parsing a pattern.
    pub fn parse(&mut self) -> Result<Node, PatternError> {
        self.parse_alt()
    }

    /// Parse ordered choice (`|`).
    ///
    /// Example:
    /// - Pattern: `a|b|c` → Choice([Literal("a"), Literal("b"), Literal("c")])
    /// - Pattern: `abc`   → Literal("abc")
    fn parse_alt(&mut self) -> Result<Node, PatternError> {
        let mut branches = vec![self.parse_seq()?];
        while self.eat('|') {
            branches.push(self.parse_seq()?);
        }
        if branches.len() == 1 {
            return Ok(branches.swap_remove(0));
        }
        Ok(Node::choice(branches)?)
    }

    /// Parse a sequence of pieces, merging adjacent plain characters.
    ///
    /// Example:
    /// - Pattern: `ab+c` → Sequence([Literal("a"), Repeat(Literal("b"), 1..), Literal("c")])
    /// - Pattern: `a(b|c)d` → Sequence([Literal("a"), Choice, Literal("d")])
    fn parse_seq(&mut self) -> Result<Node, PatternError> {
        let mut pieces: Vec<Piece> = Vec::new();
        while let Some(ch) = self.peek() {
            if ch == ')' || ch == '|' {
                break;
            }
            match self.parse_piece()? {
                Piece::Text(text) => match pieces.last_mut() {
                    Some(Piece::Text(last)) => last.push_str(&text),
                    _ => pieces.push(Piece::Text(text)),
                },
                node => pieces.push(node),
            }
        }

        let mut nodes = pieces
            .into_iter()
            .map(|piece| match piece {
                Piece::Text(text) => Node::literal(text),
                Piece::Node(node) => Ok(node),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if nodes.len() == 1 {
            return Ok(nodes.swap_remove(0));
        }
        Ok(Node::sequence(nodes)?)
    }

    /// Parse an atom and the quantifier that follows it, if any.
    ///
    /// Example:
    /// - Pattern: `a?`      → Repeat(Literal("a"), 0..=1)
    /// - Pattern: `[0-9]+`  → TakeWhile([0-9], 1..)
    /// - Pattern: `(ab){2}` → Repeat(Literal("ab"), 2..=2)
    /// - Pattern: `c`       → Text("c")
    fn parse_piece(&mut self) -> Result<Piece, PatternError> {
        let atom = self.parse_atom()?;
        let quantifier = self.parse_quantifier()?;
        let Some((min, max)) = quantifier else {
            return Ok(match atom {
                Atom::Char(c) => Piece::Text(c.to_string()),
                Atom::Class(class) => Piece::Node(Node::class(class)),
                Atom::Node(node) => Piece::Node(node),
            });
        };

        let node = match (atom, max) {
            (Atom::Class(class), Some(max)) => Node::take_while(class, min..=max)?,
            (Atom::Class(class), None) => Node::take_while(class, min..)?,
            (Atom::Char(c), max) => repeat(Node::literal(c.to_string())?, min, max)?,
            (Atom::Node(node), max) => repeat(node, min, max)?,
        };
        Ok(Piece::Node(node))
    }

    /// Parse `?`, `*`, `+` or `{n}`, `{n,}`, `{,m}`, `{n,m}`.
    fn parse_quantifier(&mut self) -> Result<Option<(usize, Option<usize>)>, PatternError> {
        let bounds = match self.peek() {
            Some('?') => (0, Some(1)),
            Some('*') => (0, None),
            Some('+') => (1, None),
            Some('{') => return self.parse_braces().map(Some),
            _ => return Ok(None),
        };
        self.bump();
        Ok(Some(bounds))
    }

    fn parse_braces(&mut self) -> Result<(usize, Option<usize>), PatternError> {
        let open = self.pos;
        self.bump(); // consume '{'
        let min = self.parse_number();
        let max = if self.eat(',') { self.parse_number() } else { Some(min.unwrap_or(0)) };
        if !self.eat('}') {
            return match self.peek() {
                None => Err(PatternError::Unclosed { what: "repetition", position: open }),
                Some(_) => Err(PatternError::InvalidCount { position: self.pos }),
            };
        }
        if min.is_none() && max.is_none() {
            return Err(PatternError::InvalidCount { position: open });
        }
        Ok((min.unwrap_or(0), max))
    }

    fn parse_number(&mut self) -> Option<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.pattern[start..self.pos].parse().ok()
    }

    /// Parse a single atom: group, class, escape, any-unit, or literal.
    ///
    /// Examples:
    /// - Pattern: `(abc)` → the rule for `abc`
    /// - Pattern: `[abc]` → Class(one of "abc")
    /// - Pattern: `\d`    → Class(digit)
    /// - Pattern: `\w`    → Class(word)
    /// - Pattern: `.`     → Class(any)
    /// - Pattern: `a`     → Char('a')
    fn parse_atom(&mut self) -> Result<Atom, PatternError> {
        let position = self.pos;
        match self.bump() {
            Some('(') => {
                let node = self.parse_alt()?;
                self.close(')', "group", position)?;
                Ok(Atom::Node(node))
            }
            Some('[') => self.parse_class(position).map(Atom::Class),
            Some('\\') => Ok(match self.parse_escape()? {
                Escape::Class(class) => Atom::Class(class),
                Escape::Char(c) => Atom::Char(c),
            }),
            Some('.') => Ok(Atom::Class(CharClass::Any)),
            Some('?' | '*' | '+' | '{') => Err(PatternError::DanglingQuantifier { position }),
            Some(c) => Ok(Atom::Char(c)),
            None => Err(PatternError::UnexpectedEnd { expected: "an atom" }),
        }
    }

    /// Parse what follows a backslash.
    fn parse_escape(&mut self) -> Result<Escape, PatternError> {
        Ok(match self.bump() {
            Some('d') => Escape::Class(charset::digit()),
            Some('w') => Escape::Class(charset::word()),
            Some('s') => Escape::Class(charset::space()),
            Some('n') => Escape::Char('\n'),
            Some('r') => Escape::Char('\r'),
            Some('t') => Escape::Char('\t'),
            Some(c) => Escape::Char(c),
            None => return Err(PatternError::UnexpectedEnd { expected: "an escaped character" }),
        })
    }

    /// Parse a character class, e.g. `[abc]`, `[a-z_]` or `[^"\\]`.
    ///
    /// Examples:
    /// - Pattern: `[abc]`  → Including({a, b, c})
    /// - Pattern: `[^xyz]` → Excluding({x, y, z})
    fn parse_class(&mut self, open: usize) -> Result<CharClass, PatternError> {
        let negated = self.eat('^');
        let mut members = ByteSet::EMPTY;
        loop {
            let position = self.pos;
            let lo = match self.bump() {
                None => return Err(PatternError::Unclosed { what: "class", position: open }),
                Some(']') => break,
                Some('\\') => match self.parse_escape()? {
                    Escape::Class(class) => {
                        members = members.union(class.members());
                        continue;
                    }
                    Escape::Char(c) => unit(c, position)?,
                },
                Some(c) => unit(c, position)?,
            };
            // A '-' right before the closing bracket is literal.
            if self.peek() == Some('-') && !self.pattern[self.pos + 1..].starts_with(']') {
                self.bump();
                let position = self.pos;
                let hi = match self.bump() {
                    None => return Err(PatternError::Unclosed { what: "class", position: open }),
                    Some('\\') => match self.parse_escape()? {
                        Escape::Char(c) => unit(c, position)?,
                        Escape::Class(_) => return Err(PatternError::Unexpected { found: '\\', position }),
                    },
                    Some(c) => unit(c, position)?,
                };
                if hi < lo {
                    return Err(PatternError::Unexpected { found: hi as char, position });
                }
                members = members.union(ByteSet::range(lo, hi));
            } else {
                members.insert(lo);
            }
        }
        Ok(if negated {
            CharClass::Excluding(members)
        } else {
            CharClass::Including(members)
        })
    }
}

enum Escape {
    Class(CharClass),
    Char(char),
}

/// Class members are single units.
fn unit(c: char, position: usize) -> Result<u8, PatternError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(PatternError::Unexpected { found: c, position })
}

fn repeat(node: Node, min: usize, max: Option<usize>) -> Result<Node, PatternError> {
    Ok(match max {
        Some(max) => Node::repeat(node, min..=max)?,
        None => Node::repeat(node, min..)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Bounds, NodeKind};
    use crate::error::GrammarError;

    #[test]
    fn adjacent_characters_form_one_literal() {
        let node = parse_pattern("GET").unwrap();
        assert_eq!(node.to_string(), "\"GET\"");
    }

    #[test]
    fn quantifier_binds_to_last_character() {
        let node = parse_pattern("ab+c").unwrap();
        assert_eq!(node.to_string(), "seq(\"a\", many(\"b\", 1..), \"c\")");
    }

    #[test]
    fn quantified_classes_scan() {
        let node = parse_pattern("[0-9]{2,4}").unwrap();
        match node.kind() {
            NodeKind::TakeWhile { class, bounds } => {
                assert_eq!(*class, charset::digit());
                assert_eq!(*bounds, Bounds { min: 2, max: Some(4) });
            }
            _ => panic!("expected a scan, got {node}"),
        }
    }

    #[test]
    fn alternation_and_groups() {
        let node = parse_pattern("(inline|attachment);").unwrap();
        assert_eq!(node.to_string(), "seq(alt(\"inline\", \"attachment\"), \";\")");
    }

    #[test]
    fn classes_with_escapes_and_negation() {
        let node = parse_pattern(r#"[^"\\]"#).unwrap();
        let class = node.predicate().unwrap();
        assert!(!class.contains(b'"'));
        assert!(!class.contains(b'\\'));
        assert!(class.contains(b'a'));

        let word = parse_pattern(r"[\d_-]").unwrap().predicate().unwrap();
        assert!(word.contains(b'7') && word.contains(b'_') && word.contains(b'-'));
    }

    #[test]
    fn malformed_patterns() {
        assert_eq!(
            parse_pattern("(ab").unwrap_err(),
            PatternError::Unclosed { what: "group", position: 0 }
        );
        assert_eq!(
            parse_pattern("a(b(c)").unwrap_err(),
            PatternError::Unclosed { what: "group", position: 1 }
        );
        assert_eq!(
            parse_pattern("x[ab").unwrap_err(),
            PatternError::Unclosed { what: "class", position: 1 }
        );
        assert_eq!(parse_pattern("+a").unwrap_err(), PatternError::DanglingQuantifier { position: 0 });
        assert_eq!(parse_pattern("a)").unwrap_err(), PatternError::Unexpected { found: ')', position: 1 });
        assert_eq!(parse_pattern("a{x}").unwrap_err(), PatternError::InvalidCount { position: 2 });
        assert_eq!(parse_pattern("a\\").unwrap_err(), PatternError::UnexpectedEnd { expected: "an escaped character" });
    }

    #[test]
    fn bad_bounds_are_grammar_errors() {
        assert_eq!(
            parse_pattern("a{3,1}").unwrap_err(),
            PatternError::Grammar(GrammarError::InvertedBounds { min: 3, max: 1 })
        );
        assert_eq!(parse_pattern("a{0}").unwrap_err(), PatternError::Grammar(GrammarError::ZeroRepetitions));
        assert_eq!(parse_pattern("a||b").unwrap_err(), PatternError::Grammar(GrammarError::EmptySequence));
    }
}
