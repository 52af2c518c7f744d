/*!
The compiled instruction program.

Ops live in an arena and point at each other with `u32` indices, so the
cycles introduced by `*` and `+` need no owning references: a link is just
an index into the same vector. A compiled program always begins with
`Save { slot: 0 }` at index 0 and ends with its single `Match`.
*/

use crate::util::utf8;

/// Index of an op within its program.
pub(crate) type OpId = u32;

/// Placeholder for a link that has not been patched yet. Every link is
/// patched before compilation finishes; one surviving into a finished
/// program is a compiler bug.
pub(crate) const NONE: OpId = OpId::MAX;

/// A single instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Op {
    /// Consume one code point equal to `cp` (packed representation).
    Char { cp: u32, next: OpId },
    /// Consume any one code point.
    Any { next: OpId },
    /// Consume one code point contained in the indexed class.
    Class { index: u32, next: OpId },
    /// Continue at both successors; `prefer` has priority.
    Split { prefer: OpId, other: OpId },
    /// Record the current input offset in the indexed capture slot.
    Save { slot: u32, next: OpId },
    /// The whole pattern matched.
    Match,
}

/// A full instruction program, including capture bookkeeping.
#[derive(Clone)]
pub(crate) struct Program {
    pub(crate) ops: Vec<Op>,
    /// Number of capture slots: 2 plus 2 per group.
    pub(crate) slot_count: u32,
}

impl Program {
    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }

    /// Builds the save-free twin of this program for the DFA cache, which
    /// never observes captures. Links are rewritten to skip over `Save`
    /// chains, then shifted down by the number of elided ops before them.
    pub(crate) fn reduce(&self) -> Reduced {
        let mut elided = vec![0u32; self.ops.len()];
        let mut n = 0u32;
        for (i, op) in self.ops.iter().enumerate() {
            elided[i] = n;
            if matches!(op, Op::Save { .. }) {
                n += 1;
            }
        }
        let resolve = |mut id: OpId| -> OpId {
            let mut steps = 0;
            while let Op::Save { next, .. } = self.ops[id as usize] {
                id = next;
                steps += 1;
                assert!(
                    steps <= self.ops.len(),
                    "save chain does not terminate",
                );
            }
            id - elided[id as usize]
        };
        let mut ops = Vec::with_capacity(self.ops.len() - n as usize);
        for op in self.ops.iter() {
            ops.push(match *op {
                Op::Save { .. } => continue,
                Op::Char { cp, next } => {
                    Op::Char { cp, next: resolve(next) }
                }
                Op::Any { next } => Op::Any { next: resolve(next) },
                Op::Class { index, next } => {
                    Op::Class { index, next: resolve(next) }
                }
                Op::Split { prefer, other } => Op::Split {
                    prefer: resolve(prefer),
                    other: resolve(other),
                },
                Op::Match => Op::Match,
            });
        }
        Reduced { ops, start: resolve(0) }
    }
}

impl core::fmt::Debug for Program {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(f, "program ({} slots)", self.slot_count)?;
        fmt_ops(&self.ops, f)
    }
}

/// The save-free program the DFA cache runs on.
#[derive(Clone)]
pub(crate) struct Reduced {
    pub(crate) ops: Vec<Op>,
    /// Where execution starts: index 0 of the full program, resolved past
    /// its leading saves.
    pub(crate) start: OpId,
}

impl Reduced {
    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }

    /// The `Match` op's index; it is always the last instruction.
    pub(crate) fn match_id(&self) -> OpId {
        (self.ops.len() - 1) as OpId
    }
}

impl core::fmt::Debug for Reduced {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(f, "reduced program (start {})", self.start)?;
        fmt_ops(&self.ops, f)
    }
}

fn fmt_ops(ops: &[Op], f: &mut core::fmt::Formatter) -> core::fmt::Result {
    for (i, op) in ops.iter().enumerate() {
        match *op {
            Op::Char { cp, next } => {
                let mut bytes = vec![];
                utf8::encode_into(cp, &mut bytes);
                writeln!(
                    f,
                    "{:04}: char {:?} => {}",
                    i,
                    String::from_utf8_lossy(&bytes),
                    next,
                )?;
            }
            Op::Any { next } => writeln!(f, "{:04}: any => {}", i, next)?,
            Op::Class { index, next } => {
                writeln!(f, "{:04}: class {} => {}", i, index, next)?;
            }
            Op::Split { prefer, other } => {
                writeln!(f, "{:04}: split {}, {}", i, prefer, other)?;
            }
            Op::Save { slot, next } => {
                writeln!(f, "{:04}: save {} => {}", i, slot, next)?;
            }
            Op::Match => writeln!(f, "{:04}: match", i)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // save 0 -> split(char a -> save 1 -> match, save 1)
    fn sample() -> Program {
        Program {
            ops: vec![
                Op::Save { slot: 0, next: 1 },
                Op::Split { prefer: 2, other: 3 },
                Op::Char { cp: u32::from(b'a'), next: 3 },
                Op::Save { slot: 1, next: 4 },
                Op::Match,
            ],
            slot_count: 2,
        }
    }

    #[test]
    fn reduce_elides_saves_and_remaps_links() {
        let reduced = sample().reduce();
        assert_eq!(3, reduced.len());
        assert!(!reduced
            .ops
            .iter()
            .any(|op| matches!(op, Op::Save { .. })));
        // Entry resolves through save 0 to the split, then links skip
        // save 1 straight to match.
        assert_eq!(0, reduced.start);
        assert_eq!(
            Op::Split { prefer: 1, other: 2 },
            reduced.ops[0],
        );
        assert_eq!(
            Op::Char { cp: u32::from(b'a'), next: 2 },
            reduced.ops[1],
        );
        assert_eq!(Op::Match, reduced.ops[2]);
        assert_eq!(2, reduced.match_id());
    }

    #[test]
    fn debug_renders_one_op_per_line() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("0000: save 0 => 1"));
        assert!(rendered.contains("char \"a\""));
        assert!(rendered.contains("0004: match"));
    }
}
