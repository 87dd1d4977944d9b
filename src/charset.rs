use std::fmt;

/// A set of byte units, one bit per value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteSet([u64; 4]);

impl ByteSet {
    pub const EMPTY: ByteSet = ByteSet([0; 4]);

    pub fn new(units: impl AsRef<[u8]>) -> Self {
        let mut set = Self::EMPTY;
        for &u in units.as_ref() {
            set.insert(u);
        }
        set
    }

    /// Every unit in `lo..=hi`.
    pub fn range(lo: u8, hi: u8) -> Self {
        let mut set = Self::EMPTY;
        for u in lo..=hi {
            set.insert(u);
        }
        set
    }

    #[inline]
    pub fn contains(&self, unit: u8) -> bool {
        self.0[(unit >> 6) as usize] & (1 << (unit & 63)) != 0
    }

    pub fn insert(&mut self, unit: u8) {
        self.0[(unit >> 6) as usize] |= 1 << (unit & 63);
    }

    pub fn remove(&mut self, unit: u8) {
        self.0[(unit >> 6) as usize] &= !(1 << (unit & 63));
    }

    pub fn union(mut self, other: ByteSet) -> Self {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a |= b;
        }
        self
    }

    pub fn difference(mut self, other: ByteSet) -> Self {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a &= !b;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; 4]
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&u| self.contains(u))
    }
}

impl fmt::Debug for ByteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", escaped(self))
    }
}

/// Single-unit classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    /// Units in the set.
    Including(ByteSet),
    /// Units outside the set.
    Excluding(ByteSet),
    Any,
}

impl CharClass {
    pub fn one_of(units: impl AsRef<[u8]>) -> Self {
        CharClass::Including(ByteSet::new(units))
    }

    pub fn none_of(units: impl AsRef<[u8]>) -> Self {
        CharClass::Excluding(ByteSet::new(units))
    }

    #[inline]
    pub fn contains(&self, unit: u8) -> bool {
        match self {
            CharClass::Including(set) => set.contains(unit),
            CharClass::Excluding(set) => !set.contains(unit),
            CharClass::Any => true,
        }
    }

    /// The same kind of class with `units` added to its configured set.
    ///
    /// This widens the set, not what is accepted: on an `Excluding` class
    /// the added units become rejected.
    pub fn including(&self, units: impl AsRef<[u8]>) -> Self {
        self.derive(ByteSet::new(units), ByteSet::union)
    }

    /// The same kind of class with `units` removed from its configured set.
    ///
    /// On an `Excluding` class the removed units become accepted.
    pub fn excluding(&self, units: impl AsRef<[u8]>) -> Self {
        self.derive(ByteSet::new(units), ByteSet::difference)
    }

    /// Adds every unit `other` accepts to the configured set, like
    /// [`including`](Self::including).
    pub fn including_class(&self, other: &CharClass) -> Self {
        match other {
            CharClass::Including(set) => self.derive(*set, ByteSet::union),
            _ => self.derive(other.members(), ByteSet::union),
        }
    }

    fn derive(&self, units: ByteSet, op: fn(ByteSet, ByteSet) -> ByteSet) -> Self {
        match *self {
            CharClass::Including(set) => CharClass::Including(op(set, units)),
            CharClass::Excluding(set) => CharClass::Excluding(op(set, units)),
            CharClass::Any => CharClass::Any,
        }
    }

    /// Every unit this class accepts.
    pub fn members(&self) -> ByteSet {
        match *self {
            CharClass::Including(set) => set,
            CharClass::Excluding(set) => ByteSet([!0; 4]).difference(set),
            CharClass::Any => ByteSet([!0; 4]),
        }
    }

    /// A reusable predicate for scanning without the match protocol.
    pub fn predicate(self) -> impl Fn(u8) -> bool + Copy + Send + Sync {
        move |unit| self.contains(unit)
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharClass::Including(set) => write!(f, "[{}]", escaped(set)),
            CharClass::Excluding(set) => write!(f, "[^{}]", escaped(set)),
            CharClass::Any => write!(f, "."),
        }
    }
}

fn escaped(set: &ByteSet) -> String {
    set.iter().collect::<Vec<_>>().escape_ascii().to_string()
}

pub fn digit() -> CharClass {
    CharClass::Including(ByteSet::range(b'0', b'9'))
}

pub fn hexdigit() -> CharClass {
    digit().including("abcdefABCDEF")
}

pub fn alpha() -> CharClass {
    CharClass::Including(ByteSet::range(b'a', b'z').union(ByteSet::range(b'A', b'Z')))
}

pub fn alnum() -> CharClass {
    alpha().including_class(&digit())
}

pub fn word() -> CharClass {
    alnum().including("_")
}

pub fn space() -> CharClass {
    CharClass::one_of(" \t\r\n\x0b\x0c")
}

/// Control characters, 0x00 to 0x1F plus DEL.
pub fn ctl() -> CharClass {
    CharClass::Including(ByteSet::range(0, 0x1f)).including([0x7fu8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byteset_covers_all_words() {
        let set = ByteSet::new([0u8, 63, 64, 127, 128, 255]);
        assert_eq!(set.len(), 6);
        assert!(set.contains(0) && set.contains(255) && set.contains(64));
        assert!(!set.contains(1) && !set.contains(254));
    }

    #[test]
    fn exclusion_rejects_members() {
        let class = CharClass::none_of("\"\\");
        assert!(class.contains(b'a'));
        assert!(!class.contains(b'"'));
        assert!(!class.contains(b'\\'));
    }

    #[test]
    fn derivation_leaves_original_untouched() {
        let separators = CharClass::one_of("()<>@,;:");
        let widened = separators.including(" \t");
        assert!(widened.contains(b' '));
        assert!(!separators.contains(b' '));

        let narrowed = widened.excluding("@");
        assert!(!narrowed.contains(b'@'));
        assert!(widened.contains(b'@'));
    }

    #[test]
    fn excluding_keeps_exclusion_kind() {
        let text = CharClass::Excluding(ctl().members()).excluding("\t");
        assert!(text.contains(b'\t'));
        assert!(!text.contains(0x00));
        assert!(text.contains(b'x'));
    }

    #[test]
    fn including_widens_the_excluded_set() {
        let token = CharClass::none_of("()<>").including_class(&ctl());
        assert!(!token.contains(b'('));
        assert!(!token.contains(0x01));
        assert!(token.contains(b'a'));
    }

    #[test]
    fn including_then_excluding_restores_set() {
        for original in [digit(), CharClass::none_of("abc"), space()] {
            assert_eq!(original.including("#").excluding("#"), original);
        }
    }

    #[test]
    fn named_sets() {
        assert!(hexdigit().contains(b'F') && hexdigit().contains(b'a'));
        assert!(!hexdigit().contains(b'g'));
        assert!(word().contains(b'_'));
        assert!(ctl().contains(0x7f) && ctl().contains(0x1f));
        assert!(!ctl().contains(b' '));
        assert_eq!(alnum().members().len(), 62);
    }

    #[test]
    fn any_accepts_every_unit() {
        let any = CharClass::Any;
        assert!((0..=u8::MAX).all(any.predicate()));
        assert_eq!(any.including("x"), CharClass::Any);
    }
}
