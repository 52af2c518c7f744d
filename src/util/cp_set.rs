/*!
A set of UTF-8 code points, tiered by encoded width.

The ASCII tier is always present; the Latin (2-byte), BMP (3-byte) and
astral (4-byte) tiers are allocated the first time a member needs them, so
a set holding only ASCII costs 32 bytes of table. The astral tier is itself
a 512-row array of lazily allocated 4096-bit rows. Membership of a packed
code point dispatches on its lead byte.
*/

use crate::util::{
    bits::Bitmap,
    utf8::{self, width},
};

const ASTRAL_ROWS: usize = 512;

type AsciiTable = Bitmap<4>;
type LatinTable = Bitmap<32>;
type BmpTable = Bitmap<1024>;
type AstralRow = Bitmap<64>;

/// A set of UTF-8 code points in packed representation.
#[derive(Clone, Default)]
pub(crate) struct CodePointSet {
    ascii: AsciiTable,
    latin: Option<Box<LatinTable>>,
    bmp: Option<Box<BmpTable>>,
    astral: Option<Box<[Option<Box<AstralRow>>]>>,
}

impl CodePointSet {
    pub(crate) fn new() -> CodePointSet {
        CodePointSet::default()
    }

    /// Builds a set holding every code point of `bytes`, each enumerated
    /// exactly once. Fails on malformed UTF-8.
    pub(crate) fn from_bytes(
        bytes: &[u8],
    ) -> Result<CodePointSet, crate::error::Error> {
        let mut set = CodePointSet::new();
        let mut at = 0;
        while at < bytes.len() {
            let (cp, w) = utf8::decode(bytes, at)?;
            set.insert(cp);
            at += w;
        }
        Ok(set)
    }

    pub(crate) fn insert(&mut self, cp: u32) {
        match width(cp as u8) {
            1 => self.ascii.set(cp as usize),
            2 => {
                self.latin
                    .get_or_insert_with(Box::default)
                    .set(utf8::latin_index(cp));
            }
            3 => {
                self.bmp
                    .get_or_insert_with(Box::default)
                    .set(utf8::bmp_index(cp));
            }
            _ => {
                let rows = self.astral.get_or_insert_with(empty_astral);
                let row = rows[utf8::astral_row(cp)]
                    .get_or_insert_with(Box::default);
                row.set(utf8::astral_col(cp));
            }
        }
    }

    pub(crate) fn remove(&mut self, cp: u32) {
        match width(cp as u8) {
            1 => self.ascii.reset(cp as usize),
            2 => {
                if let Some(ref mut t) = self.latin {
                    t.reset(utf8::latin_index(cp));
                }
            }
            3 => {
                if let Some(ref mut t) = self.bmp {
                    t.reset(utf8::bmp_index(cp));
                }
            }
            _ => {
                if let Some(ref mut rows) = self.astral {
                    if let Some(ref mut row) = rows[utf8::astral_row(cp)] {
                        row.reset(utf8::astral_col(cp));
                    }
                }
            }
        }
    }

    #[inline]
    pub(crate) fn contains(&self, cp: u32) -> bool {
        match width(cp as u8) {
            1 => self.ascii.test(cp as usize),
            2 => match self.latin {
                None => false,
                Some(ref t) => t.test(utf8::latin_index(cp)),
            },
            3 => match self.bmp {
                None => false,
                Some(ref t) => t.test(utf8::bmp_index(cp)),
            },
            _ => match self.astral {
                None => false,
                Some(ref rows) => match rows[utf8::astral_row(cp)] {
                    None => false,
                    Some(ref row) => row.test(utf8::astral_col(cp)),
                },
            },
        }
    }

    /// Returns the number of code points in this set.
    pub(crate) fn count(&self) -> usize {
        let mut n = self.ascii.count();
        if let Some(ref t) = self.latin {
            n += t.count();
        }
        if let Some(ref t) = self.bmp {
            n += t.count();
        }
        if let Some(ref rows) = self.astral {
            n += rows
                .iter()
                .flatten()
                .map(|row| row.count())
                .sum::<usize>();
        }
        n
    }

    /// Adds every member of `other` to this set, allocating any tier the
    /// receiver is missing.
    pub(crate) fn union_with(&mut self, other: &CodePointSet) {
        self.ascii |= &other.ascii;
        if let Some(t) = other.latin.as_deref() {
            **self.latin.get_or_insert_with(Box::default) |= t;
        }
        if let Some(t) = other.bmp.as_deref() {
            **self.bmp.get_or_insert_with(Box::default) |= t;
        }
        if let Some(ref other_rows) = other.astral {
            let rows = self.astral.get_or_insert_with(empty_astral);
            for (dst, src) in rows.iter_mut().zip(other_rows.iter()) {
                if let Some(src) = src.as_deref() {
                    **dst.get_or_insert_with(Box::default) |= src;
                }
            }
        }
    }

    /// Intersects this set with `other`, tier by tier. Tiers absent on
    /// either side stay (or become) empty; they are not freed here, that is
    /// what [`CodePointSet::shrink_to_fit`] is for.
    pub(crate) fn intersect_with(&mut self, other: &CodePointSet) {
        self.ascii &= &other.ascii;
        match (&mut self.latin, other.latin.as_deref()) {
            (Some(t), Some(o)) => **t &= o,
            (Some(t), None) => t.clear(),
            _ => {}
        }
        match (&mut self.bmp, other.bmp.as_deref()) {
            (Some(t), Some(o)) => **t &= o,
            (Some(t), None) => t.clear(),
            _ => {}
        }
        if let Some(ref mut rows) = self.astral {
            for (i, row) in rows.iter_mut().enumerate() {
                let Some(r) = row else { continue };
                match other.astral.as_ref().and_then(|o| o[i].as_deref()) {
                    Some(o) => **r &= o,
                    None => r.clear(),
                }
            }
        }
    }

    /// Frees every tier that has become empty.
    pub(crate) fn shrink_to_fit(&mut self) {
        if self.latin.as_ref().map_or(false, |t| t.is_empty()) {
            self.latin = None;
        }
        if self.bmp.as_ref().map_or(false, |t| t.is_empty()) {
            self.bmp = None;
        }
        if let Some(ref mut rows) = self.astral {
            let mut live = false;
            for row in rows.iter_mut() {
                if row.as_ref().map_or(false, |r| r.is_empty()) {
                    *row = None;
                }
                live |= row.is_some();
            }
            if !live {
                self.astral = None;
            }
        }
    }

    #[cfg(test)]
    fn allocated_tiers(&self) -> (bool, bool, usize) {
        (
            self.latin.is_some(),
            self.bmp.is_some(),
            self.astral
                .as_ref()
                .map_or(0, |rows| rows.iter().flatten().count()),
        )
    }
}

fn empty_astral() -> Box<[Option<Box<AstralRow>>]> {
    vec![None; ASTRAL_ROWS].into_boxed_slice()
}

impl core::fmt::Debug for CodePointSet {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "CodePointSet({} code points)", self.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::utf8::decode;

    fn cp(s: &str) -> u32 {
        decode(s.as_bytes(), 0).unwrap().0
    }

    #[test]
    fn insert_test_remove_per_tier() {
        let mut set = CodePointSet::new();
        for s in ["a", "é", "€", "😊"] {
            assert!(!set.contains(cp(s)));
            set.insert(cp(s));
            assert!(set.contains(cp(s)), "{} should be a member", s);
            set.remove(cp(s));
            assert!(!set.contains(cp(s)));
        }
    }

    #[test]
    fn removing_from_absent_tier_is_a_noop() {
        let mut set = CodePointSet::new();
        set.remove(cp("😊"));
        assert!(!set.contains(cp("😊")));
    }

    #[test]
    fn nearby_astral_code_points_stay_distinct() {
        let mut set = CodePointSet::new();
        set.insert(cp("😊"));
        assert!(set.contains(cp("😊")));
        assert!(!set.contains(cp("😪")));
        assert!(!set.contains(cp("🙊")));
        assert_eq!(1, set.count());
    }

    #[test]
    fn from_bytes_enumerates_each_code_point() {
        let set = CodePointSet::from_bytes("aé€😊a".as_bytes()).unwrap();
        assert_eq!(4, set.count());
        for s in ["a", "é", "€", "😊"] {
            assert!(set.contains(cp(s)));
        }
        assert!(!set.contains(cp("b")));

        let err = CodePointSet::from_bytes(&[b'a', 0xC3]).unwrap_err();
        assert!(err.is_invalid_utf8());
    }

    #[test]
    fn union_allocates_missing_tiers() {
        let mut a = CodePointSet::from_bytes(b"abc").unwrap();
        let b = CodePointSet::from_bytes("é😊".as_bytes()).unwrap();
        a.union_with(&b);
        assert_eq!(5, a.count());
        assert!(a.contains(cp("é")));
        assert!(a.contains(cp("😊")));
    }

    #[test]
    fn intersect_keeps_common_members_only() {
        let mut a = CodePointSet::from_bytes("abé😊".as_bytes()).unwrap();
        let b = CodePointSet::from_bytes("bé🙊".as_bytes()).unwrap();
        a.intersect_with(&b);
        assert_eq!(2, a.count());
        assert!(a.contains(cp("b")));
        assert!(a.contains(cp("é")));
        assert!(!a.contains(cp("a")));
        assert!(!a.contains(cp("😊")));
    }

    #[test]
    fn shrink_frees_empty_tiers() {
        let mut set = CodePointSet::from_bytes("é😊".as_bytes()).unwrap();
        assert_eq!((true, false, 1), set.allocated_tiers());
        set.remove(cp("é"));
        set.remove(cp("😊"));
        set.shrink_to_fit();
        assert_eq!((false, false, 0), set.allocated_tiers());
    }
}
