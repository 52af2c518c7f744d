/*!
A map from UTF-8 code points to lazy DFA state ids.

The layout mirrors [`CodePointSet`](crate::util::cp_set::CodePointSet):
an always-present ASCII tier and lazily allocated Latin/BMP/astral tiers,
indexed by the same perfect hashes. Slots hold a state id or [`UNKNOWN`].
ASCII slot 255 can never be addressed by a code point (0xFF is a 4-byte
lead), so it doubles as the wildcard successor: the transition taken when
an input code point falls outside a DFA state's filter.
*/

use crate::util::utf8::{self, width};

/// Identifier of a lazily built DFA state: its slot in the cache ring.
pub(crate) type LazyStateID = u32;

/// Sentinel for a transition that has not been computed yet.
pub(crate) const UNKNOWN: LazyStateID = LazyStateID::MAX;

const ASCII_LEN: usize = 256;
const LATIN_LEN: usize = 2048;
const BMP_LEN: usize = 65536;
const ASTRAL_ROWS: usize = 512;
const ASTRAL_ROW_LEN: usize = 4096;

const WILD_SLOT: usize = 0xFF;

pub(crate) struct CodePointMap {
    ascii: Box<[LazyStateID]>,
    latin: Option<Box<[LazyStateID]>>,
    bmp: Option<Box<[LazyStateID]>>,
    astral: Option<Box<[Option<Box<[LazyStateID]>>]>>,
}

impl CodePointMap {
    pub(crate) fn new() -> CodePointMap {
        CodePointMap {
            ascii: unknown_table(ASCII_LEN),
            latin: None,
            bmp: None,
            astral: None,
        }
    }

    /// Looks up the transition for a packed code point. [`UNKNOWN`] when
    /// the slot (or its whole tier) has not been populated.
    #[inline]
    pub(crate) fn get(&self, cp: u32) -> LazyStateID {
        match width(cp as u8) {
            1 => self.ascii[cp as usize],
            2 => match self.latin {
                None => UNKNOWN,
                Some(ref t) => t[utf8::latin_index(cp)],
            },
            3 => match self.bmp {
                None => UNKNOWN,
                Some(ref t) => t[utf8::bmp_index(cp)],
            },
            _ => match self.astral {
                None => UNKNOWN,
                Some(ref rows) => match rows[utf8::astral_row(cp)] {
                    None => UNKNOWN,
                    Some(ref row) => row[utf8::astral_col(cp)],
                },
            },
        }
    }

    pub(crate) fn set(&mut self, cp: u32, id: LazyStateID) {
        match width(cp as u8) {
            1 => {
                debug_assert_ne!(cp as usize, WILD_SLOT);
                self.ascii[cp as usize] = id;
            }
            2 => {
                self.latin.get_or_insert_with(|| unknown_table(LATIN_LEN))
                    [utf8::latin_index(cp)] = id;
            }
            3 => {
                self.bmp.get_or_insert_with(|| unknown_table(BMP_LEN))
                    [utf8::bmp_index(cp)] = id;
            }
            _ => {
                let rows = self.astral.get_or_insert_with(|| {
                    vec![None; ASTRAL_ROWS].into_boxed_slice()
                });
                let row = rows[utf8::astral_row(cp)]
                    .get_or_insert_with(|| unknown_table(ASTRAL_ROW_LEN));
                row[utf8::astral_col(cp)] = id;
            }
        }
    }

    /// The wildcard successor, for code points outside the owning state's
    /// filter.
    #[inline]
    pub(crate) fn wild(&self) -> LazyStateID {
        self.ascii[WILD_SLOT]
    }

    pub(crate) fn set_wild(&mut self, id: LazyStateID) {
        self.ascii[WILD_SLOT] = id;
    }

    /// Resets every slot holding `id` back to [`UNKNOWN`], the wildcard
    /// slot included. Used when the cache recycles a ring slot, so no
    /// stale transition can lead into the recycled state.
    pub(crate) fn clear_entries(&mut self, id: LazyStateID) {
        let purge = |table: &mut [LazyStateID]| {
            for slot in table.iter_mut() {
                if *slot == id {
                    *slot = UNKNOWN;
                }
            }
        };
        purge(&mut self.ascii);
        if let Some(ref mut t) = self.latin {
            purge(t);
        }
        if let Some(ref mut t) = self.bmp {
            purge(t);
        }
        if let Some(ref mut rows) = self.astral {
            for row in rows.iter_mut().flatten() {
                purge(row);
            }
        }
    }

    /// Frees every tier whose slots are all [`UNKNOWN`].
    pub(crate) fn shrink_to_fit(&mut self) {
        let vacant = |t: &[LazyStateID]| t.iter().all(|&id| id == UNKNOWN);
        if self.latin.as_deref().map_or(false, vacant) {
            self.latin = None;
        }
        if self.bmp.as_deref().map_or(false, vacant) {
            self.bmp = None;
        }
        if let Some(ref mut rows) = self.astral {
            let mut live = false;
            for row in rows.iter_mut() {
                if row.as_deref().map_or(false, vacant) {
                    *row = None;
                }
                live |= row.is_some();
            }
            if !live {
                self.astral = None;
            }
        }
    }
}

fn unknown_table(len: usize) -> Box<[LazyStateID]> {
    vec![UNKNOWN; len].into_boxed_slice()
}

impl core::fmt::Debug for CodePointMap {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let known = self.ascii.iter().filter(|&&id| id != UNKNOWN).count();
        write!(f, "CodePointMap({} known ascii transitions", known)?;
        if self.latin.is_some() {
            write!(f, ", +latin")?;
        }
        if self.bmp.is_some() {
            write!(f, ", +bmp")?;
        }
        if self.astral.is_some() {
            write!(f, ", +astral")?;
        }
        write!(f, ")")
    }
}
