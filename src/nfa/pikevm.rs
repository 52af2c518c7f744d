/*!
Thompson simulation of the instruction program.

Two thread lists (current and next) walk the haystack one code point at a
time. Each list pairs a sparse set, deduping by op index, with the threads
themselves; a thread owns its capture vector, cloned where a split forks.
Priority falls out of ordering alone: splits explore their preferred arm
first, and a deduped op keeps the captures of the earliest thread to reach
it, which is the leftmost-greedy one.
*/

use crate::{
    error::Error,
    nfa::program::{Op, OpId, Program, Reduced},
    util::{cp_set::CodePointSet, sparse_set::SparseSet, utf8},
};

/// Reusable scratch for the simulator. One per engine; a search resets it.
#[derive(Debug)]
pub(crate) struct Cache {
    clist: ThreadList,
    nlist: ThreadList,
    stack: Vec<(OpId, Vec<u32>)>,
}

#[derive(Debug)]
struct ThreadList {
    seen: SparseSet,
    list: Vec<Thread>,
}

#[derive(Debug)]
struct Thread {
    pc: OpId,
    caps: Vec<u32>,
}

impl Cache {
    pub(crate) fn new() -> Cache {
        Cache {
            clist: ThreadList { seen: SparseSet::new(0), list: vec![] },
            nlist: ThreadList { seen: SparseSet::new(0), list: vec![] },
            stack: vec![],
        }
    }

    fn reset(&mut self, op_count: usize) {
        self.clist.seen.resize(op_count);
        self.clist.list.clear();
        self.nlist.seen.resize(op_count);
        self.nlist.list.clear();
        self.stack.clear();
    }
}

impl ThreadList {
    fn clear(&mut self) {
        self.seen.clear();
        self.list.clear();
    }
}

/// Runs the simulator over the whole haystack, appending the capture
/// vector of every thread that reaches `Match` to `matches`.
///
/// With `match_one` the search stops at the end of the first step that
/// produced a match; otherwise every match is accumulated in the order
/// encountered. `unanchored` spawns a fresh entry thread at every step, at
/// lower priority than the surviving threads.
pub(crate) fn search(
    prog: &Program,
    classes: &[CodePointSet],
    cache: &mut Cache,
    haystack: &[u8],
    unanchored: bool,
    match_one: bool,
    matches: &mut Vec<Vec<u32>>,
) -> Result<bool, Error> {
    cache.reset(prog.len());
    let slots = prog.slot_count as usize;
    let Cache { clist, nlist, stack } = cache;
    let mut matched = false;

    add_thread(prog, clist, stack, 0, vec![0; slots], 0);
    let mut at = 0;
    while at < haystack.len() {
        let (cp, width) = utf8::decode(haystack, at)?;
        if unanchored {
            add_thread(prog, clist, stack, 0, vec![0; slots], at as u32);
        }
        let mut j = 0;
        while j < clist.list.len() {
            let pc = clist.list[j].pc;
            match prog.ops[pc as usize] {
                Op::Char { cp: want, next } => {
                    if want == cp {
                        let caps =
                            core::mem::take(&mut clist.list[j].caps);
                        add_thread(
                            prog,
                            nlist,
                            stack,
                            next,
                            caps,
                            (at + width) as u32,
                        );
                    }
                }
                Op::Class { index, next } => {
                    if classes[index as usize].contains(cp) {
                        let caps =
                            core::mem::take(&mut clist.list[j].caps);
                        add_thread(
                            prog,
                            nlist,
                            stack,
                            next,
                            caps,
                            (at + width) as u32,
                        );
                    }
                }
                Op::Any { next } => {
                    let caps = core::mem::take(&mut clist.list[j].caps);
                    add_thread(
                        prog,
                        nlist,
                        stack,
                        next,
                        caps,
                        (at + width) as u32,
                    );
                }
                Op::Match => {
                    matched = true;
                    matches.push(clist.list[j].caps.clone());
                }
                // Epsilon ops never make it onto a thread list.
                Op::Split { .. } | Op::Save { .. } => {}
            }
            j += 1;
        }
        core::mem::swap(clist, nlist);
        nlist.clear();
        at += width;
        if match_one && matched {
            return Ok(true);
        }
    }
    for thread in clist.list.iter() {
        if let Op::Match = prog.ops[thread.pc as usize] {
            matched = true;
            matches.push(thread.caps.clone());
        }
    }
    Ok(matched)
}

/// Adds the epsilon closure of `pc` to the list. `at` is the offset the
/// next unconsumed code point starts at; saves record it.
///
/// The walk is an explicit stack rather than recursion: nested quantifiers
/// chain splits, and pattern input must not control recursion depth.
/// Pushing the non-preferred arm first means the preferred subtree is
/// fully explored before it, preserving thread priority.
fn add_thread(
    prog: &Program,
    tl: &mut ThreadList,
    stack: &mut Vec<(OpId, Vec<u32>)>,
    pc: OpId,
    caps: Vec<u32>,
    at: u32,
) {
    stack.push((pc, caps));
    while let Some((pc, mut caps)) = stack.pop() {
        if !tl.seen.insert(pc) {
            continue;
        }
        match prog.ops[pc as usize] {
            Op::Split { prefer, other } => {
                stack.push((other, caps.clone()));
                stack.push((prefer, caps));
            }
            Op::Save { slot, next } => {
                caps[slot as usize] = at;
                stack.push((next, caps));
            }
            _ => tl.list.push(Thread { pc, caps }),
        }
    }
}

/// Boolean-only Thompson simulation over the reduced program, seeded from
/// an arbitrary op set at an arbitrary offset.
///
/// This is the continuation the lazy DFA hands a search to when its cache
/// has churned past the rebuild limit: the DFA's current state set becomes
/// the seed thread list and the walk carries on from `at`.
pub(crate) fn test_reduced(
    ruin: &Reduced,
    classes: &[CodePointSet],
    seed: &[OpId],
    haystack: &[u8],
    mut at: usize,
    unanchored: bool,
) -> Result<bool, Error> {
    let mut clist = BoolList::new(ruin.len());
    let mut nlist = BoolList::new(ruin.len());
    let mut stack: Vec<OpId> = vec![];

    for &pc in seed {
        add_bool_thread(ruin, &mut clist, &mut stack, pc);
    }
    while at < haystack.len() {
        let (cp, width) = utf8::decode(haystack, at)?;
        if unanchored {
            add_bool_thread(ruin, &mut clist, &mut stack, ruin.start);
        }
        let mut j = 0;
        while j < clist.list.len() {
            match ruin.ops[clist.list[j] as usize] {
                Op::Char { cp: want, next } => {
                    if want == cp {
                        add_bool_thread(ruin, &mut nlist, &mut stack, next);
                    }
                }
                Op::Class { index, next } => {
                    if classes[index as usize].contains(cp) {
                        add_bool_thread(ruin, &mut nlist, &mut stack, next);
                    }
                }
                Op::Any { next } => {
                    add_bool_thread(ruin, &mut nlist, &mut stack, next);
                }
                Op::Match => return Ok(true),
                Op::Split { .. } | Op::Save { .. } => {}
            }
            j += 1;
        }
        core::mem::swap(&mut clist, &mut nlist);
        nlist.clear();
        at += width;
    }
    Ok(clist
        .list
        .iter()
        .any(|&pc| matches!(ruin.ops[pc as usize], Op::Match)))
}

#[derive(Debug)]
struct BoolList {
    seen: SparseSet,
    list: Vec<OpId>,
}

impl BoolList {
    fn new(op_count: usize) -> BoolList {
        BoolList { seen: SparseSet::new(op_count), list: vec![] }
    }

    fn clear(&mut self) {
        self.seen.clear();
        self.list.clear();
    }
}

fn add_bool_thread(
    ruin: &Reduced,
    tl: &mut BoolList,
    stack: &mut Vec<OpId>,
    pc: OpId,
) {
    stack.push(pc);
    while let Some(pc) = stack.pop() {
        if !tl.seen.insert(pc) {
            continue;
        }
        match ruin.ops[pc as usize] {
            Op::Split { prefer, other } => {
                stack.push(other);
                stack.push(prefer);
            }
            Op::Save { .. } => {
                unreachable!("reduced program contains a save op")
            }
            _ => tl.list.push(pc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfa::compiler::compile;

    fn run(
        pattern: &str,
        haystack: &str,
        unanchored: bool,
        match_one: bool,
    ) -> (bool, Vec<Vec<u32>>) {
        let compiled = compile(pattern.as_bytes()).unwrap();
        let mut cache = Cache::new();
        let mut matches = vec![];
        let matched = search(
            &compiled.prog,
            &compiled.classes,
            &mut cache,
            haystack.as_bytes(),
            unanchored,
            match_one,
            &mut matches,
        )
        .unwrap();
        (matched, matches)
    }

    #[test]
    fn greedy_plus_spans_the_full_run() {
        let (matched, matches) = run("a+", "aa?", false, false);
        assert!(matched);
        // The greedy thread survives to record group 0 over both a's.
        assert!(matches.iter().any(|m| m[0] == 0 && m[1] == 2));
    }

    #[test]
    fn anchored_star_before_literal() {
        // A loop thread re-enters the split it came from; the per-list
        // dedup must not starve it.
        let (matched, _) = run("a*b", "ab", false, true);
        assert!(matched);
        let (matched, _) = run("a*b", "aaab", false, true);
        assert!(matched);
        let (matched, _) = run("a*b", "aac", false, true);
        assert!(!matched);
    }

    #[test]
    fn alternation_prefers_the_left_branch() {
        let (matched, matches) = run("(ab|a)(bc|c)", "abc", false, false);
        assert!(matched);
        let m = &matches[0];
        // Group 0 "abc", group 1 "ab", group 2 "c".
        assert_eq!(&[0, 3, 0, 2, 2, 3], &m[..]);
    }

    #[test]
    fn unanchored_search_starts_anywhere() {
        let (matched, matches) = run("[a-z0-9]+", "Hello42World", true, false);
        assert!(matched);
        // Leftmost greedy run is "ello42".
        assert!(matches.iter().any(|m| m[0] == 1 && m[1] == 7));

        let (matched, _) = run("z+", "Hello", true, false);
        assert!(!matched);
    }

    #[test]
    fn wildcard_consumes_whole_code_points() {
        let (matched, matches) = run("a.c", "a😊c", false, false);
        assert!(matched);
        assert_eq!(&[0, 6], &matches[0][..2]);
        let (matched, _) = run("a.c", "abbc", false, false);
        assert!(!matched);
    }

    #[test]
    fn captures_through_multibyte_alternatives() {
        let (matched, matches) =
            run("(a(b))(c|😊)(p|[😊d])", "cabab😊😊abab", true, false);
        assert!(matched);
        let m = &matches[0];
        // Every recorded slice lands on code point boundaries.
        let hay = "cabab😊😊abab";
        for pair in m.chunks(2) {
            assert!(hay.get(pair[0] as usize..pair[1] as usize).is_some());
        }
    }

    #[test]
    fn empty_width_patterns_match_empty_input() {
        let (matched, matches) = run("a*", "", false, false);
        assert!(matched);
        assert_eq!(&[0, 0], &matches[0][..]);
        // The empty prefix of a non-empty haystack matches too.
        let (matched, _) = run("a*", "b", false, true);
        assert!(matched);
        let (matched, _) = run("a+", "b", false, true);
        assert!(!matched);
    }

    #[test]
    fn match_one_stops_after_the_first_matching_step() {
        let (matched, matches) = run("a+", "aaaa", false, true);
        assert!(matched);
        assert_eq!(1, matches.len());
    }

    #[test]
    fn invalid_haystack_is_reported() {
        let compiled = compile(b"a").unwrap();
        let mut cache = Cache::new();
        let mut matches = vec![];
        let err = search(
            &compiled.prog,
            &compiled.classes,
            &mut cache,
            &[b'a', 0xF0, 0x28],
            true,
            true,
            &mut matches,
        )
        .unwrap_err();
        assert!(err.is_invalid_utf8());
    }

    #[test]
    fn reduced_run_agrees_with_the_full_simulation() {
        for (pattern, haystack) in [
            ("a*b", "aaab"),
            ("a*b", "aac"),
            ("(ab|a)(bc|c)", "abc"),
            ("[a-z]+d", "abcd"),
            ("x.z", "xyz"),
        ] {
            let compiled = compile(pattern.as_bytes()).unwrap();
            let ruin = compiled.prog.reduce();
            let got = test_reduced(
                &ruin,
                &compiled.classes,
                &[ruin.start],
                haystack.as_bytes(),
                0,
                false,
            )
            .unwrap();
            let (want, _) = run(pattern, haystack, false, true);
            assert_eq!(want, got, "pattern {} on {}", pattern, haystack);
        }
    }
}
