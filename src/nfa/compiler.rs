/*!
The three-pass pattern compiler.

Pass one rewrites the pattern into a token stream with explicit
concatenation markers (a NUL byte, which can never appear as an operator).
Pass two runs a modified shunting-yard over the tokens, producing a nearly
postfix stream in which classes and groups stay in place. Pass three is
Thompson's construction: a stack of NFA fragments, each an entry op plus a
list of dangling links to patch, assembled op by op into the program arena.

The byte-string intermediate form is what makes the passes cheap: operators
are single bytes, and multi-byte code points flow through untouched.
*/

use log::debug;

use crate::{
    error::Error,
    nfa::program::{Op, OpId, Program, NONE},
    util::{cp_set::CodePointSet, utf8},
};

/// Implicit concatenation operator inserted by the tokeniser.
const CONCAT: u8 = 0;

/// The output of compilation: the program and its class table.
#[derive(Debug)]
pub(crate) struct Compiled {
    pub(crate) prog: Program,
    pub(crate) classes: Vec<CodePointSet>,
}

pub(crate) fn compile(pattern: &[u8]) -> Result<Compiled, Error> {
    let tokens = tokenise(pattern)?;
    let postfix = shunt(&tokens)?;
    let compiled = assemble(&postfix)?;
    debug!(
        "compiled pattern of {} bytes: {} ops, {} classes, {} slots",
        pattern.len(),
        compiled.prog.len(),
        compiled.classes.len(),
        compiled.prog.slot_count,
    );
    Ok(compiled)
}

/// Pass one: insert a [`CONCAT`] byte between adjacent atoms.
///
/// A concat marker follows an atom iff the next byte exists and is not one
/// of `) | * + ?`; nothing follows `(` or `|`. Class bodies are preserved
/// verbatim, closing `]` included. A trailing backslash is dropped.
fn tokenise(pattern: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(pattern.len() * 2);
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            b'[' => loop {
                out.push(pattern[i]);
                i += 1;
                if i >= pattern.len() {
                    return Err(Error::syntax(
                        "unterminated character class",
                    ));
                }
                if pattern[i] == b']' {
                    out.push(b']');
                    i += 1;
                    break;
                }
            },
            b'\\' => {
                if i + 1 >= pattern.len() {
                    // A backslash with nothing to escape vanishes.
                    break;
                }
                out.push(b'\\');
                out.push(pattern[i + 1]);
                i += 2;
            }
            b @ (b'(' | b'|') => {
                out.push(b);
                i += 1;
                continue;
            }
            _ => {
                let (_, w) = utf8::decode(pattern, i)?;
                out.extend_from_slice(&pattern[i..i + w]);
                i += w;
            }
        }
        if let Some(&next) = pattern.get(i) {
            if !matches!(next, b')' | b'|' | b'*' | b'+' | b'?') {
                out.push(CONCAT);
            }
        }
    }
    Ok(out)
}

/// Operator binding strength for pass two. Anything else is not an
/// operator and has no precedence to speak of.
fn precedence(op: u8) -> Result<u32, Error> {
    match op {
        b'\\' => Ok(100),
        b'(' => Ok(90),
        b'[' => Ok(80),
        b'?' | b'*' | b'+' => Ok(70),
        CONCAT => Ok(60),
        b'|' => Ok(50),
        _ => Err(Error::syntax("unknown operator precedence query")),
    }
}

/// Pass two: not exactly shunting-yard.
///
/// Atoms, classes and groups are emitted in place; `?`, `*`, `+`, concat
/// and `|` go through the operator stack with left associativity.
fn shunt(tokens: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut stack: Vec<u8> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            b'\\' => {
                out.push(tokens[i]);
                i += 1;
                if i < tokens.len() {
                    out.push(tokens[i]);
                    i += 1;
                }
            }
            b'(' => {
                out.push(b'(');
                stack.push(b'(');
                i += 1;
            }
            b')' => {
                loop {
                    match stack.last() {
                        None => {
                            return Err(Error::syntax(
                                "stray ) in pattern",
                            ));
                        }
                        Some(&b'(') => break,
                        Some(_) => out.push(stack.pop().unwrap()),
                    }
                }
                stack.pop();
                out.push(b')');
                i += 1;
            }
            b'[' => loop {
                out.push(tokens[i]);
                i += 1;
                if i >= tokens.len() {
                    return Err(Error::syntax(
                        "unterminated character class",
                    ));
                }
                if tokens[i] == b']' {
                    out.push(b']');
                    i += 1;
                    break;
                }
            },
            b']' => return Err(Error::syntax("stray ] in pattern")),
            op @ (b'?' | b'*' | b'+' | CONCAT | b'|') => {
                let prec = precedence(op)?;
                while let Some(&top) = stack.last() {
                    // Everything is left associative.
                    if top == b'(' || prec > precedence(top)? {
                        break;
                    }
                    out.push(stack.pop().unwrap());
                }
                stack.push(op);
                i += 1;
            }
            _ => {
                let (_, w) = utf8::decode(tokens, i)?;
                out.extend_from_slice(&tokens[i..i + w]);
                i += w;
            }
        }
    }
    while let Some(op) = stack.pop() {
        if op == b'(' {
            return Err(Error::syntax("unterminated group"));
        }
        out.push(op);
    }
    Ok(out)
}

/// Which link of an op a dangling patch refers to.
#[derive(Clone, Copy, Debug)]
enum Side {
    Next,
    Other,
}

#[derive(Clone, Copy, Debug)]
struct Patch {
    op: OpId,
    side: Side,
}

/// A partially built NFA: an entry op and the dangling out-links that a
/// later op will be patched into.
#[derive(Debug)]
struct Frag {
    entry: OpId,
    dangling: Vec<Patch>,
}

impl Frag {
    /// A fragment of a single freshly emitted op whose only link dangles.
    fn solo(op: OpId) -> Frag {
        Frag { entry: op, dangling: vec![Patch { op, side: Side::Next }] }
    }
}

fn patch_all(ops: &mut [Op], dangling: &[Patch], target: OpId) {
    for p in dangling {
        match (&mut ops[p.op as usize], p.side) {
            (Op::Char { next, .. }, Side::Next)
            | (Op::Any { next }, Side::Next)
            | (Op::Class { next, .. }, Side::Next)
            | (Op::Save { next, .. }, Side::Next) => *next = target,
            (Op::Split { other, .. }, Side::Other) => *other = target,
            (op, side) => {
                unreachable!("cannot patch {:?} of {:?}", side, op)
            }
        }
    }
}

fn push_op(ops: &mut Vec<Op>, op: Op) -> OpId {
    ops.push(op);
    (ops.len() - 1) as OpId
}

/// Pass three: Thompson's construction over the postfix stream.
fn assemble(postfix: &[u8]) -> Result<Compiled, Error> {
    let mut ops: Vec<Op> = Vec::with_capacity(postfix.len() + 4);
    let mut classes: Vec<CodePointSet> = Vec::new();
    let mut stack: Vec<Frag> = Vec::new();
    // Group open/close slots interleave: opens take the even slots from 2
    // up, closes the odd ones from 3.
    let mut lsave = 2u32;
    let mut rsave = 3u32;

    let entry = push_op(&mut ops, Op::Save { slot: 0, next: NONE });
    stack.push(Frag::solo(entry));

    let mut i = 0;
    while i < postfix.len() {
        match postfix[i] {
            b'\\' => {
                i += 1;
                if i < postfix.len() {
                    push_literal(&mut ops, &mut stack, postfix, &mut i, true)?;
                }
            }
            b'(' => {
                group_save(&mut ops, &mut stack, lsave);
                lsave += 2;
                i += 1;
            }
            b')' => {
                group_save(&mut ops, &mut stack, rsave);
                rsave += 2;
                i += 1;
            }
            b'[' => {
                i += 1;
                let (set, end) = parse_class(postfix, i)?;
                classes.push(set);
                let id = push_op(
                    &mut ops,
                    Op::Class { index: (classes.len() - 1) as u32, next: NONE },
                );
                stack.push(Frag::solo(id));
                i = end + 1;
            }
            b']' => return Err(Error::syntax("stray ] in pattern")),
            b'?' => {
                let top = stack.last_mut().expect("initial fragment");
                let id = push_op(
                    &mut ops,
                    Op::Split { prefer: top.entry, other: NONE },
                );
                top.dangling.push(Patch { op: id, side: Side::Other });
                top.entry = id;
                i += 1;
            }
            b'*' => {
                let top = stack.last_mut().expect("initial fragment");
                let id = push_op(
                    &mut ops,
                    Op::Split { prefer: top.entry, other: NONE },
                );
                patch_all(&mut ops, &top.dangling, id);
                top.entry = id;
                top.dangling = vec![Patch { op: id, side: Side::Other }];
                i += 1;
            }
            b'+' => {
                let top = stack.last_mut().expect("initial fragment");
                let id = push_op(
                    &mut ops,
                    Op::Split { prefer: top.entry, other: NONE },
                );
                patch_all(&mut ops, &top.dangling, id);
                top.dangling = vec![Patch { op: id, side: Side::Other }];
                i += 1;
            }
            CONCAT => {
                if stack.len() < 2 {
                    return Err(Error::syntax("operator without operand"));
                }
                let top = stack.pop().unwrap();
                let penult = stack.last_mut().unwrap();
                patch_all(&mut ops, &penult.dangling, top.entry);
                penult.dangling = top.dangling;
                i += 1;
            }
            b'|' => {
                if stack.len() < 2 {
                    return Err(Error::syntax("operator without operand"));
                }
                let mut top = stack.pop().unwrap();
                let penult = stack.last_mut().unwrap();
                let id = push_op(
                    &mut ops,
                    Op::Split { prefer: penult.entry, other: top.entry },
                );
                penult.dangling.append(&mut top.dangling);
                penult.entry = id;
                i += 1;
            }
            _ => push_literal(&mut ops, &mut stack, postfix, &mut i, false)?,
        }
    }

    if stack.len() != 2 {
        return Err(Error::syntax(
            "pattern did not reduce to a single fragment",
        ));
    }
    let body = stack.pop().unwrap();
    let root = stack.pop().unwrap();
    patch_all(&mut ops, &root.dangling, body.entry);
    let closing = push_op(&mut ops, Op::Save { slot: 1, next: NONE });
    patch_all(&mut ops, &body.dangling, closing);
    let done = push_op(&mut ops, Op::Match);
    patch_all(
        &mut ops,
        &[Patch { op: closing, side: Side::Next }],
        done,
    );

    Ok(Compiled { prog: Program { ops, slot_count: lsave }, classes })
}

/// Appends a group-boundary save to the top fragment.
fn group_save(ops: &mut Vec<Op>, stack: &mut [Frag], slot: u32) {
    let top = stack.last_mut().expect("initial fragment");
    let id = push_op(ops, Op::Save { slot, next: NONE });
    patch_all(ops, &top.dangling, id);
    top.dangling.clear();
    top.dangling.push(Patch { op: id, side: Side::Next });
}

/// Emits a single consuming op for the code point at `*i`. A bare `.` is
/// the wildcard; escaped atoms are always literals.
fn push_literal(
    ops: &mut Vec<Op>,
    stack: &mut Vec<Frag>,
    bytes: &[u8],
    i: &mut usize,
    escaped: bool,
) -> Result<(), Error> {
    let (cp, w) = utf8::decode(bytes, *i)?;
    let id = if !escaped && cp == u32::from(b'.') {
        push_op(ops, Op::Any { next: NONE })
    } else {
        push_op(ops, Op::Char { cp, next: NONE })
    };
    stack.push(Frag::solo(id));
    *i += w;
    Ok(())
}

/// Parses a class body starting just past its `[`, returning the set and
/// the index of the terminating `]`.
///
/// Only the three fixed ranges are recognised, by literal lookahead;
/// everything else is a member code point.
fn parse_class(
    bytes: &[u8],
    mut i: usize,
) -> Result<(CodePointSet, usize), Error> {
    let mut set = CodePointSet::new();
    loop {
        if i >= bytes.len() {
            return Err(Error::syntax("unterminated character class"));
        }
        let b = bytes[i];
        if b == b']' {
            return Ok((set, i));
        }
        let range: Option<(u8, u8)> = match b {
            b'a' => Some((b'a', b'z')),
            b'A' => Some((b'A', b'Z')),
            b'0' => Some((b'0', b'9')),
            _ => None,
        };
        match range {
            Some((lo, hi))
                if bytes.get(i + 1) == Some(&b'-')
                    && bytes.get(i + 2) == Some(&hi) =>
            {
                for c in lo..=hi {
                    set.insert(u32::from(c));
                }
                i += 3;
            }
            _ => {
                let w = utf8::width(b);
                if i + w > bytes.len() {
                    return Err(Error::invalid_utf8(i));
                }
                if bytes[i + 1..i + w].contains(&b']') {
                    return Err(Error::invalid_utf8(i));
                }
                let (cp, _) = utf8::decode(bytes, i)?;
                set.insert(cp);
                i += w;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops_of(pattern: &str) -> Vec<Op> {
        compile(pattern.as_bytes()).unwrap().prog.ops
    }

    #[test]
    fn tokenise_inserts_concat_markers() {
        assert_eq!(b"a\0b".to_vec(), tokenise(b"ab").unwrap());
        assert_eq!(b"a|b".to_vec(), tokenise(b"a|b").unwrap());
        assert_eq!(b"a\0(b)".to_vec(), tokenise(b"a(b)").unwrap());
        assert_eq!(b"a\0b*".to_vec(), tokenise(b"ab*").unwrap());
        assert_eq!(b"a\0b*\0c".to_vec(), tokenise(b"ab*c").unwrap());
        assert_eq!(b"[ab]\0c".to_vec(), tokenise(b"[ab]c").unwrap());
        assert_eq!(b"\\?\0b".to_vec(), tokenise(b"\\?b").unwrap());
        // A trailing backslash vanishes.
        assert_eq!(b"a\0b".to_vec(), tokenise(b"ab\\").unwrap());
    }

    #[test]
    fn tokenise_rejects_unterminated_class() {
        assert!(tokenise(b"[ab").unwrap_err().is_syntax());
    }

    #[test]
    fn shunt_produces_nearly_postfix() {
        let postfix = shunt(&tokenise(b"ab").unwrap()).unwrap();
        assert_eq!(b"ab\0".to_vec(), postfix);
        let postfix = shunt(&tokenise(b"a|b").unwrap()).unwrap();
        assert_eq!(b"ab|".to_vec(), postfix);
        let postfix = shunt(&tokenise(b"a*b").unwrap()).unwrap();
        assert_eq!(b"a*b\0".to_vec(), postfix);
        // Groups and classes stay in place.
        let postfix = shunt(&tokenise(b"(a|b)c").unwrap()).unwrap();
        assert_eq!(b"(ab|)c\0".to_vec(), postfix);
        let postfix = shunt(&tokenise(b"[a-z]+").unwrap()).unwrap();
        assert_eq!(b"[a-z]+".to_vec(), postfix);
    }

    #[test]
    fn shunt_rejects_stray_tokens() {
        assert!(shunt(b")").unwrap_err().is_syntax());
        assert!(shunt(b"]").unwrap_err().is_syntax());
        assert!(shunt(&tokenise(b"a)").unwrap()).unwrap_err().is_syntax());
        assert!(shunt(&tokenise(b"(a").unwrap()).unwrap_err().is_syntax());
    }

    #[test]
    fn single_literal_program_shape() {
        let ops = ops_of("a");
        assert_eq!(
            vec![
                Op::Save { slot: 0, next: 1 },
                Op::Char { cp: u32::from(b'a'), next: 2 },
                Op::Save { slot: 1, next: 3 },
                Op::Match,
            ],
            ops,
        );
    }

    #[test]
    fn compiled_programs_are_well_formed() {
        for pattern in
            ["a", "a+b", "(a(b))(c|d)", "[a-z0-9]+", "a.*b", "x?y?z?", "é|😊"]
        {
            let compiled = compile(pattern.as_bytes()).unwrap();
            let ops = &compiled.prog.ops;
            // Entry is save 0, the single match is last.
            assert!(matches!(ops[0], Op::Save { slot: 0, .. }));
            assert!(matches!(ops[ops.len() - 1], Op::Match));
            let matches = ops
                .iter()
                .filter(|op| matches!(op, Op::Match))
                .count();
            assert_eq!(1, matches, "pattern {}", pattern);
            // Every link is patched and in bounds.
            let check = |id: OpId| {
                assert!(
                    (id as usize) < ops.len(),
                    "dangling link in {}",
                    pattern,
                );
            };
            for op in ops.iter() {
                match *op {
                    Op::Char { next, .. }
                    | Op::Any { next }
                    | Op::Class { next, .. }
                    | Op::Save { next, .. } => check(next),
                    Op::Split { prefer, other } => {
                        check(prefer);
                        check(other);
                    }
                    Op::Match => {}
                }
            }
        }
    }

    #[test]
    fn group_slots_are_assigned_in_open_order() {
        let compiled = compile(b"(a)(b(c))").unwrap();
        assert_eq!(8, compiled.prog.slot_count);
        let slots: Vec<u32> = compiled
            .prog
            .ops
            .iter()
            .filter_map(|op| match *op {
                Op::Save { slot, .. } => Some(slot),
                _ => None,
            })
            .collect();
        // Whole match 0; opens take 2/4/6 in open order while closes take
        // 3/5/7 in close order, so nested closes interleave; the final
        // close of slot 1 comes last.
        assert_eq!(vec![0, 2, 3, 4, 6, 5, 7, 1], slots);
    }

    #[test]
    fn escaped_metacharacters_are_literals() {
        let ops = ops_of(r"\.");
        assert!(matches!(ops[1], Op::Char { cp, .. } if cp == u32::from(b'.')));
        let ops = ops_of(r"a\*");
        assert!(
            matches!(ops[2], Op::Char { cp, .. } if cp == u32::from(b'*'))
        );
        // An unescaped dot is the wildcard.
        let ops = ops_of(".");
        assert!(matches!(ops[1], Op::Any { .. }));
    }

    #[test]
    fn quantifiers_without_an_operand_are_rejected() {
        for pattern in ["*", "||", "()", "|a", "a|"] {
            let err = compile(pattern.as_bytes()).unwrap_err();
            assert!(err.is_syntax(), "pattern {:?}", pattern);
        }
    }

    #[test]
    fn class_ranges_and_members() {
        let compiled = compile("[a-z0-9é-]".as_bytes()).unwrap();
        let class = &compiled.classes[0];
        for c in "az059é-".chars() {
            let mut buf = [0u8; 4];
            let cp = crate::util::utf8::decode(
                c.encode_utf8(&mut buf).as_bytes(),
                0,
            )
            .unwrap()
            .0;
            assert!(class.contains(cp), "{} missing", c);
        }
        // The consumed ranges leave no stray members behind.
        assert_eq!(26 + 10 + 2, class.count());

        // A near miss of a range is three separate members.
        let compiled = compile(b"[a-x]").unwrap();
        let class = &compiled.classes[0];
        assert!(class.contains(u32::from(b'a')));
        assert!(class.contains(u32::from(b'-')));
        assert!(class.contains(u32::from(b'x')));
        assert!(!class.contains(u32::from(b'b')));
    }

    #[test]
    fn empty_class_matches_nothing() {
        let compiled = compile(b"[]").unwrap();
        assert_eq!(0, compiled.classes[0].count());
    }

    #[test]
    fn invalid_utf8_in_pattern_is_rejected() {
        assert!(compile(&[b'a', 0xC3]).unwrap_err().is_invalid_utf8());
        assert!(compile(&[b'[', 0xC3, b']']).unwrap_err().is_invalid_utf8());
    }
}
