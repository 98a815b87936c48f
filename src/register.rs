use std::fmt;

/// Interned register identifier: an index into the register file.
///
/// Names are resolved to ids once, at decode time, so the execution loop
/// indexes a flat array and never looks up strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(u8);

impl RegisterId {
    #[inline(always)]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// The register naming scheme of a machine.
///
/// The puzzle machines name their registers three different ways: single
/// letters (`a`..`h`), numbered registers (`r0`..`r5`), or whole words
/// (`acc`). All three intern to `RegisterId`s in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterSet {
    /// `a`, `b`, ... up to 26 registers.
    Letters(u8),
    /// `r0`, `r1`, ...
    Indexed(u8),
    /// Arbitrary names.
    Named(Vec<String>),
}

impl Default for RegisterSet {
    fn default() -> Self {
        RegisterSet::Letters(26)
    }
}

impl RegisterSet {
    /// Build a `Named` set from anything string-like.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RegisterSet::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            RegisterSet::Letters(n) => (*n).min(26) as usize,
            RegisterSet::Indexed(n) => *n as usize,
            RegisterSet::Named(names) => names.len().min(u8::MAX as usize + 1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: RegisterId) -> bool {
        id.index() < self.len()
    }

    /// Resolve a source name to its id, or `None` if the name is not part of
    /// this set.
    pub fn resolve(&self, name: &str) -> Option<RegisterId> {
        let index = match self {
            RegisterSet::Letters(_) => match name.as_bytes() {
                [c @ b'a'..=b'z'] => (c - b'a') as usize,
                _ => return None,
            },
            RegisterSet::Indexed(_) => {
                let digits = name.strip_prefix('r')?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                digits.parse::<usize>().ok()?
            }
            RegisterSet::Named(names) => names.iter().position(|n| n == name)?,
        };
        if index < self.len() {
            Some(RegisterId::new(index as u8))
        } else {
            None
        }
    }

    /// The source name of `id`. Ids outside the set render as `%n`.
    pub fn name(&self, id: RegisterId) -> String {
        if !self.contains(id) {
            return id.to_string();
        }
        match self {
            RegisterSet::Letters(_) => char::from(b'a' + id.0).to_string(),
            RegisterSet::Indexed(_) => format!("r{}", id.0),
            RegisterSet::Named(names) => names[id.index()].clone(),
        }
    }

    /// All ids in the set, in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = RegisterId> + '_ {
        (0..self.len()).map(|i| RegisterId::new(i as u8))
    }
}

/// Flat register storage. Every register starts at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    values: Vec<i64>,
}

impl RegisterFile {
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![0; len],
        }
    }

    #[inline(always)]
    pub fn get(&self, id: RegisterId) -> i64 {
        self.values[id.index()]
    }

    #[inline(always)]
    pub fn set(&mut self, id: RegisterId, value: i64) {
        self.values[id.index()] = value;
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_resolve() {
        let set = RegisterSet::Letters(4);
        assert_eq!(set.resolve("a"), Some(RegisterId::new(0)));
        assert_eq!(set.resolve("d"), Some(RegisterId::new(3)));
        assert_eq!(set.resolve("e"), None);
        assert_eq!(set.resolve("ab"), None);
        assert_eq!(set.resolve("A"), None);
    }

    #[test]
    fn test_letters_cap_at_alphabet() {
        assert_eq!(RegisterSet::Letters(40).len(), 26);
        assert_eq!(RegisterSet::Letters(40).resolve("z"), Some(RegisterId::new(25)));
    }

    #[test]
    fn test_indexed_resolve() {
        let set = RegisterSet::Indexed(6);
        assert_eq!(set.resolve("r0"), Some(RegisterId::new(0)));
        assert_eq!(set.resolve("r5"), Some(RegisterId::new(5)));
        assert_eq!(set.resolve("r6"), None);
        assert_eq!(set.resolve("r"), None);
        assert_eq!(set.resolve("r+1"), None);
        assert_eq!(set.resolve("5"), None);
    }

    #[test]
    fn test_named_resolve() {
        let set = RegisterSet::named(["acc", "ip"]);
        assert_eq!(set.resolve("ip"), Some(RegisterId::new(1)));
        assert_eq!(set.resolve("acc"), Some(RegisterId::new(0)));
        assert_eq!(set.resolve("a"), None);
    }

    #[test]
    fn test_names_round_trip() {
        for set in [
            RegisterSet::Letters(8),
            RegisterSet::Indexed(6),
            RegisterSet::named(["acc", "x"]),
        ] {
            for id in set.ids() {
                assert_eq!(set.resolve(&set.name(id)), Some(id));
            }
        }
    }

    #[test]
    fn test_name_outside_set() {
        let set = RegisterSet::Letters(2);
        assert_eq!(set.name(RegisterId::new(9)), "%9");
    }

    #[test]
    fn test_register_file_zero_default() {
        let mut file = RegisterFile::new(3);
        assert_eq!(file.values(), &[0, 0, 0]);
        file.set(RegisterId::new(1), -7);
        assert_eq!(file.get(RegisterId::new(1)), -7);
        assert_eq!(file.get(RegisterId::new(2)), 0);
    }
}
