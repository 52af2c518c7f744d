/*!
The lazily built DFA over the reduced program.

A DFA state is the epsilon closure of a set of reduced-program ops,
represented as a hybrid set so its bitset image can key an ordered map of
interned states. States live in a ring of fixed power-of-two capacity and
are identified by their slot index, which is what keeps transition targets
valid without interior pointers. When the ring fills, the oldest state is
recycled FIFO; every eviction bumps an overflow counter, and hitting the
overflow limit throws the whole cache away and counts a rebuild. Once the
rebuild counter reaches its own limit the cache stops constructing states
and a search falls back to the NFA simulator mid-run.

Each state carries a filter of every code point that some `Char` or
`Class` op in it could consume. An input outside the filter takes the
wildcard transition (live `Any` ops only), which is shared by all such
inputs and stored in the reserved ASCII slot of the transition map.
*/

use std::collections::BTreeMap;

use log::trace;

use crate::{
    error::Error,
    nfa::program::{Op, OpId, Reduced},
    util::{
        bits::{pow2_at_least, BitVec},
        cp_map::{CodePointMap, LazyStateID, UNKNOWN},
        cp_set::CodePointSet,
        sparse_set::HybridSet,
        utf8,
    },
};

/// Cache policy knobs. The limits act as a circuit breaker: a pattern
/// whose state set churns endlessly stops paying construction costs and
/// runs on the NFA instead.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Config {
    pub(crate) cache_capacity: usize,
    pub(crate) overflow_limit: u32,
    pub(crate) rebuild_limit: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config { cache_capacity: 64, overflow_limit: 5, rebuild_limit: 5 }
    }
}

/// How a cache run ended.
pub(crate) enum Outcome {
    Finished(bool),
    /// The cache churned past its rebuild limit. The NFA simulator should
    /// resume from this op set at this haystack offset.
    Bail { at: usize, ops: Vec<OpId> },
}

/// One interned DFA state.
struct State {
    ops: HybridSet,
    filter: CodePointSet,
    next: CodePointMap,
    is_match: bool,
}

impl State {
    fn new(op_count: usize) -> State {
        State {
            ops: HybridSet::new(op_count),
            filter: CodePointSet::new(),
            next: CodePointMap::new(),
            is_match: false,
        }
    }
}

pub(crate) struct Cache {
    config: Config,
    /// Ring capacity: the configured value rounded up to a power of two,
    /// fixed for the cache's lifetime.
    capacity: usize,
    slots: Vec<State>,
    /// Oldest slot, the next FIFO eviction victim once the ring is full.
    head: usize,
    index: BTreeMap<BitVec, LazyStateID>,
    overflow_count: u32,
    rebuild_count: u32,
    /// Which anchoring mode the cached transitions were built for.
    /// Successor construction differs between the two, so switching mode
    /// starts over.
    unanchored: bool,
    stack: Vec<OpId>,
}

impl Cache {
    pub(crate) fn new(config: Config) -> Cache {
        let capacity = pow2_at_least(config.cache_capacity.max(2));
        Cache {
            config,
            capacity,
            slots: Vec::new(),
            head: 0,
            index: BTreeMap::new(),
            overflow_count: 0,
            rebuild_count: 0,
            unanchored: false,
            stack: vec![],
        }
    }

    /// Drops every cached state and zeroes all counters.
    pub(crate) fn reset(&mut self) {
        self.slots = Vec::new();
        self.index = BTreeMap::new();
        self.head = 0;
        self.overflow_count = 0;
        self.rebuild_count = 0;
    }

    /// Throws away the cached states after churn. Counted against the
    /// rebuild limit, unlike [`Cache::reset`].
    fn rebuild(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.head = 0;
        self.overflow_count = 0;
        self.rebuild_count += 1;
        trace!(
            "lazy DFA cache has been cleared (count: {})",
            self.rebuild_count,
        );
    }

    /// Runs the DFA over the haystack, building states on demand.
    pub(crate) fn run(
        &mut self,
        ruin: &Reduced,
        classes: &[CodePointSet],
        haystack: &[u8],
        unanchored: bool,
    ) -> Result<Outcome, Error> {
        if self.unanchored != unanchored {
            self.reset();
            self.unanchored = unanchored;
        }
        if self.slots.capacity() == 0 {
            self.slots.reserve_exact(self.capacity);
        }

        let mut cur = self.intern_seed(ruin, classes);
        if self.slots[cur as usize].is_match {
            return Ok(Outcome::Finished(true));
        }
        let mut at = 0;
        while at < haystack.len() {
            let (cp, width) = utf8::decode(haystack, at)?;
            let state = &self.slots[cur as usize];
            let mut next = if state.filter.contains(cp) {
                state.next.get(cp)
            } else {
                state.next.wild()
            };
            if next == UNKNOWN {
                if self.rebuild_count >= self.config.rebuild_limit {
                    let ops = self.slots[cur as usize].ops.iter().collect();
                    return Ok(Outcome::Bail { at, ops });
                }
                next = self.build_next(ruin, classes, cur, cp);
            }
            let state = &self.slots[next as usize];
            if state.is_match {
                return Ok(Outcome::Finished(true));
            }
            if !unanchored && state.ops.is_empty() {
                // Dead state: nothing can revive an anchored search.
                return Ok(Outcome::Finished(false));
            }
            cur = next;
            at += width;
        }
        Ok(Outcome::Finished(self.slots[cur as usize].is_match))
    }

    /// Interns the closure of the reduced program's entry.
    fn intern_seed(
        &mut self,
        ruin: &Reduced,
        classes: &[CodePointSet],
    ) -> LazyStateID {
        let mut state = State::new(ruin.len());
        let mut stack = core::mem::take(&mut self.stack);
        closure(ruin, classes, &mut stack, ruin.start, &mut state);
        self.stack = stack;
        state.is_match = state.ops.contains(ruin.match_id());
        self.intern(state, None, 0)
    }

    /// Builds the successor of `cur` on input `cp` and records the
    /// transition, unless the predecessor itself got recycled on the way.
    fn build_next(
        &mut self,
        ruin: &Reduced,
        classes: &[CodePointSet],
        cur: LazyStateID,
        cp: u32,
    ) -> LazyStateID {
        let match_id = ruin.match_id();
        let mut state = State::new(ruin.len());
        let mut stack = core::mem::take(&mut self.stack);
        for pc in self.slots[cur as usize].ops.iter() {
            match ruin.ops[pc as usize] {
                Op::Char { cp: want, next } => {
                    if want == cp {
                        closure(ruin, classes, &mut stack, next, &mut state);
                    }
                }
                Op::Class { index, next } => {
                    if classes[index as usize].contains(cp) {
                        closure(ruin, classes, &mut stack, next, &mut state);
                    }
                }
                Op::Any { next } => {
                    closure(ruin, classes, &mut stack, next, &mut state);
                }
                Op::Match => {
                    // A state that has matched stays matched.
                    state.ops.insert(match_id);
                }
                Op::Split { .. } => {}
                Op::Save { .. } => {
                    unreachable!("reduced program contains a save op")
                }
            }
        }
        if self.unanchored {
            // An unanchored search may begin at every step; re-apply the
            // seed closure so the state set carries those threads.
            closure(ruin, classes, &mut stack, ruin.start, &mut state);
        }
        self.stack = stack;
        state.is_match = state.ops.contains(match_id);
        self.intern(state, Some(cur), cp)
    }

    /// Interns a freshly built state, reusing a cached one with the same
    /// op set where possible, and wires the predecessor's transition.
    fn intern(
        &mut self,
        state: State,
        pred: Option<LazyStateID>,
        cp: u32,
    ) -> LazyStateID {
        if let Some(&id) = self.index.get(state.ops.key()) {
            if let Some(p) = pred {
                self.record(p, cp, id);
            }
            return id;
        }
        let mut pred = pred;
        let id;
        if self.slots.len() < self.capacity {
            id = self.slots.len() as LazyStateID;
            self.slots.push(state);
        } else {
            self.overflow_count += 1;
            if self.overflow_count >= self.config.overflow_limit {
                self.rebuild();
                pred = None;
                id = 0;
                self.slots.push(state);
            } else {
                let victim = self.head as LazyStateID;
                trace!(
                    "lazy DFA recycling state {} (evictions: {})",
                    victim,
                    self.overflow_count,
                );
                let key = self.slots[victim as usize].ops.key().clone();
                self.index.remove(&key);
                // No transition may keep leading into the recycled slot.
                for i in 0..self.slots.len() {
                    if i != victim as usize {
                        self.slots[i].next.clear_entries(victim);
                    }
                }
                if pred == Some(victim) {
                    pred = None;
                }
                self.slots[victim as usize] = state;
                self.head = (self.head + 1) & (self.capacity - 1);
                id = victim;
            }
        }
        self.index.insert(self.slots[id as usize].ops.key().clone(), id);
        if let Some(p) = pred {
            self.record(p, cp, id);
        }
        id
    }

    fn record(&mut self, pred: LazyStateID, cp: u32, id: LazyStateID) {
        let state = &mut self.slots[pred as usize];
        if state.filter.contains(cp) {
            state.next.set(cp, id);
        } else {
            state.next.set_wild(id);
        }
    }

    #[cfg(test)]
    fn state_count(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    fn counters(&self) -> (u32, u32) {
        (self.overflow_count, self.rebuild_count)
    }
}

/// Adds the epsilon closure of `pc` to the state being built, folding the
/// code points of every reachable consuming op into its filter.
fn closure(
    ruin: &Reduced,
    classes: &[CodePointSet],
    stack: &mut Vec<OpId>,
    pc: OpId,
    state: &mut State,
) {
    stack.push(pc);
    while let Some(pc) = stack.pop() {
        if !state.ops.insert(pc) {
            continue;
        }
        match ruin.ops[pc as usize] {
            Op::Split { prefer, other } => {
                stack.push(other);
                stack.push(prefer);
            }
            Op::Char { cp, .. } => state.filter.insert(cp),
            Op::Class { index, .. } => {
                state.filter.union_with(&classes[index as usize]);
            }
            Op::Any { .. } | Op::Match => {}
            Op::Save { .. } => {
                unreachable!("reduced program contains a save op")
            }
        }
    }
}
