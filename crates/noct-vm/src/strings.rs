//! Content-addressed string interning (spec §3 "Interning & ownership").
//!
//! Strings are compared by value everywhere in NoctLang, so interning exists
//! purely to make repeated identical literals share storage; it is not an
//! identity mechanism the way arrays/dicts' heap refs are.

use std::collections::HashMap;
use std::rc::Rc;

use noct_core::hash::fnv1a_32;

/// A cheaply-cloned interned string. `Rc<str>` clone is a refcount bump, not
/// a copy, so passing `Value::Str` around the interpreter stays cheap.
pub type InternedStr = Rc<str>;

#[derive(Debug, Default)]
pub struct StringTable {
    by_hash: HashMap<u32, Vec<InternedStr>>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning the shared handle. Hash collisions between
    /// distinct strings are resolved by a linear scan within the bucket.
    pub fn intern(&mut self, s: &str) -> InternedStr {
        let hash = fnv1a_32(s.as_bytes());
        let bucket = self.by_hash.entry(hash).or_default();
        if let Some(existing) = bucket.iter().find(|existing| existing.as_ref() == s) {
            return existing.clone();
        }
        let interned: InternedStr = Rc::from(s);
        bucket.push(interned.clone());
        interned
    }

    /// Looks up a string already known to be interned by its precomputed
    /// hash, as bytecode string operands carry (spec §4.4 "string hashing
    /// cached in bytecode"). Falls back to a byte comparison within the
    /// bucket since the hash alone doesn't disambiguate collisions.
    pub fn intern_hashed(&mut self, s: &str, hash: u32) -> InternedStr {
        let bucket = self.by_hash.entry(hash).or_default();
        if let Some(existing) = bucket.iter().find(|existing| existing.as_ref() == s) {
            return existing.clone();
        }
        let interned: InternedStr = Rc::from(s);
        bucket.push(interned.clone());
        interned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_shares_storage() {
        let mut table = StringTable::new();
        let a = table.intern("hello");
        let b = table.intern("hello");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_content_does_not_share() {
        let mut table = StringTable::new();
        let a = table.intern("hello");
        let b = table.intern("world");
        assert!(!Rc::ptr_eq(&a, &b));
    }
}
