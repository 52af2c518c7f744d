/*!
The public engine: compile once, search many times.

A [`Regex`] owns its compiled program, the save-free twin of it for the
DFA, and all per-search scratch (thread lists, the lazy DFA cache, recorded
matches). Searches therefore take `&mut self`; an engine is deliberately
not shareable across threads mid-search. Compile a second engine or
serialise calls instead.
*/

use crate::{
    error::Error,
    hybrid,
    hybrid::dfa::Outcome,
    nfa::{
        compiler,
        pikevm,
        program::{Program, Reduced},
    },
    util::cp_set::CodePointSet,
};

/// Per-call search flags.
///
/// `unanchored` lets a match begin at any code point boundary rather than
/// only at the start of the haystack. `match_one` stops a capture search
/// at the end of the first step that produced a match; switch it off to
/// accumulate every match [`Regex::match_indices`] should report.
#[derive(Clone, Copy, Debug)]
pub struct Search {
    unanchored: bool,
    match_one: bool,
}

impl Search {
    pub fn new() -> Search {
        Search::default()
    }

    pub fn unanchored(mut self, yes: bool) -> Search {
        self.unanchored = yes;
        self
    }

    pub fn match_one(mut self, yes: bool) -> Search {
        self.match_one = yes;
        self
    }
}

impl Default for Search {
    fn default() -> Search {
        Search { unanchored: false, match_one: true }
    }
}

/// Engine construction knobs, all about the lazy DFA cache: its ring
/// capacity (rounded up to a power of two) and the two circuit-breaker
/// limits. The defaults suit ordinary patterns.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    cache_capacity: usize,
    overflow_limit: u32,
    rebuild_limit: u32,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Number of DFA states kept before the oldest is recycled.
    pub fn cache_capacity(mut self, states: usize) -> Config {
        self.cache_capacity = states;
        self
    }

    /// Evictions tolerated before the whole cache is rebuilt.
    pub fn overflow_limit(mut self, limit: u32) -> Config {
        self.overflow_limit = limit;
        self
    }

    /// Rebuilds tolerated before searches fall back to the NFA.
    pub fn rebuild_limit(mut self, limit: u32) -> Config {
        self.rebuild_limit = limit;
        self
    }

    fn dfa(&self) -> hybrid::dfa::Config {
        hybrid::dfa::Config {
            cache_capacity: self.cache_capacity,
            overflow_limit: self.overflow_limit,
            rebuild_limit: self.rebuild_limit,
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        let d = hybrid::dfa::Config::default();
        Config {
            cache_capacity: d.cache_capacity,
            overflow_limit: d.overflow_limit,
            rebuild_limit: d.rebuild_limit,
        }
    }
}

/// A builder for a [`Regex`].
#[derive(Clone, Debug)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder { config: Config::default() }
    }

    pub fn configure(mut self, config: Config) -> Builder {
        self.config = config;
        self
    }

    pub fn build<P: AsRef<[u8]>>(&self, pattern: P) -> Result<Regex, Error> {
        let core = Core::compile(pattern.as_ref())?;
        Ok(Regex {
            core: Some(core),
            pike: pikevm::Cache::new(),
            dfa: hybrid::dfa::Cache::new(self.config.dfa()),
            matches: vec![],
        })
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

/// Everything derived from the pattern text.
struct Core {
    prog: Program,
    classes: Vec<CodePointSet>,
    ruin: Reduced,
}

impl Core {
    fn compile(pattern: &[u8]) -> Result<Core, Error> {
        let compiler::Compiled { prog, classes } =
            compiler::compile(pattern)?;
        let ruin = prog.reduce();
        Ok(Core { prog, classes, ruin })
    }
}

/// A compiled regular expression.
///
/// Searches need `&mut self`: the engine owns reusable scratch and the
/// lazily built DFA, both of which mutate during a search.
pub struct Regex {
    core: Option<Core>,
    pike: pikevm::Cache,
    dfa: hybrid::dfa::Cache,
    matches: Vec<Vec<u32>>,
}

impl Regex {
    /// Compiles a pattern with the default configuration.
    pub fn new<P: AsRef<[u8]>>(pattern: P) -> Result<Regex, Error> {
        Builder::new().build(pattern)
    }

    /// Reports whether the pattern matches, starting at offset 0.
    ///
    /// This runs the lazy DFA and never records captures; when the DFA's
    /// cache churns past its limits the search finishes on the NFA
    /// simulator from wherever the DFA stopped.
    pub fn test<H: AsRef<[u8]>>(
        &mut self,
        haystack: H,
    ) -> Result<bool, Error> {
        self.test_with(Search::new(), haystack)
    }

    /// As [`Regex::test`], with explicit flags (`match_one` has no effect
    /// on a boolean search).
    pub fn test_with<H: AsRef<[u8]>>(
        &mut self,
        search: Search,
        haystack: H,
    ) -> Result<bool, Error> {
        let haystack = haystack.as_ref();
        let Regex { core, dfa, .. } = self;
        let core = core.as_ref().ok_or_else(Self::gone)?;
        match dfa.run(
            &core.ruin,
            &core.classes,
            haystack,
            search.unanchored,
        )? {
            Outcome::Finished(matched) => Ok(matched),
            Outcome::Bail { at, ops } => pikevm::test_reduced(
                &core.ruin,
                &core.classes,
                &ops,
                haystack,
                at,
                search.unanchored,
            ),
        }
    }

    /// Runs the full simulation with capture tracking, starting at offset
    /// 0 and stopping at the first match. Recorded captures are available
    /// from [`Regex::match_indices`] until the next search.
    pub fn find<H: AsRef<[u8]>>(
        &mut self,
        haystack: H,
    ) -> Result<bool, Error> {
        self.find_with(Search::new(), haystack)
    }

    /// As [`Regex::find`], with explicit flags.
    pub fn find_with<H: AsRef<[u8]>>(
        &mut self,
        search: Search,
        haystack: H,
    ) -> Result<bool, Error> {
        let haystack = haystack.as_ref();
        let Regex { core, pike, matches, .. } = self;
        let core = core.as_ref().ok_or_else(Self::gone)?;
        matches.clear();
        pikevm::search(
            &core.prog,
            &core.classes,
            pike,
            haystack,
            search.unanchored,
            search.match_one,
            matches,
        )
    }

    /// The capture vectors recorded by the last [`Regex::find`], one per
    /// match in the order encountered.
    ///
    /// Each vector holds two byte offsets per group: group *k*'s match is
    /// `[v[2k], v[2k+1])`, with group 0 the whole match. Offsets are the
    /// positions just past the last consumed byte, and 0 doubles as
    /// "unset" for groups the match never entered.
    pub fn match_indices(&self) -> &[Vec<u32>] {
        &self.matches
    }

    /// Number of capture slots per match: 2 plus 2 per group.
    pub fn slot_count(&self) -> usize {
        self.core.as_ref().map_or(0, |c| c.prog.slot_count as usize)
    }

    /// Throws away all derived state and compiles a new pattern in place.
    pub fn recompile<P: AsRef<[u8]>>(
        &mut self,
        pattern: P,
    ) -> Result<(), Error> {
        self.free_memory(true);
        self.core = Some(Core::compile(pattern.as_ref())?);
        Ok(())
    }

    /// Releases search scratch, recorded matches and the DFA cache. With
    /// `drop_program` the compiled program goes too, after which searches
    /// fail until [`Regex::recompile`].
    pub fn free_memory(&mut self, drop_program: bool) {
        self.pike = pikevm::Cache::new();
        self.dfa.reset();
        self.matches = vec![];
        if drop_program {
            self.core = None;
        }
    }

    fn gone() -> Error {
        Error::invalid_argument(
            "the compiled program has been freed; recompile first",
        )
    }
}

impl core::fmt::Debug for Regex {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.core {
            None => write!(f, "Regex(freed)"),
            Some(ref core) => {
                write!(f, "Regex of {} ops\n{:?}", core.prog.len(), core.prog)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_find_agree() {
        let mut re = Regex::new("(a|b)*c[0-9]").unwrap();
        for hay in ["abac7", "c0", "abab", "zabac7", ""] {
            for search in
                [Search::new(), Search::new().unanchored(true)]
            {
                let t = re.test_with(search, hay).unwrap();
                let f = re.find_with(search, hay).unwrap();
                assert_eq!(t, f, "disagreement on {:?}", hay);
            }
        }
    }

    #[test]
    fn match_indices_reports_group_ranges() {
        let mut re = Regex::new("(ab|a)(bc|c)").unwrap();
        assert!(re
            .find_with(Search::new().match_one(false), "abc")
            .unwrap());
        assert_eq!(&[0, 3, 0, 2, 2, 3], &re.match_indices()[0][..]);
        assert_eq!(6, re.slot_count());
    }

    #[test]
    fn recompile_replaces_the_pattern() {
        let mut re = Regex::new("a+").unwrap();
        assert!(re.test("aa").unwrap());
        re.recompile("b+").unwrap();
        assert!(!re.test("aa").unwrap());
        assert!(re.test("bb").unwrap());
    }

    #[test]
    fn recompile_matches_a_fresh_compile() {
        let mut fresh = Regex::new("x(y|z)").unwrap();
        let mut recycled = Regex::new("[0-9]*").unwrap();
        recycled.recompile("x(y|z)").unwrap();
        for hay in ["xy", "xz", "xx", ""] {
            assert_eq!(
                fresh.find(hay).unwrap(),
                recycled.find(hay).unwrap(),
            );
            assert_eq!(fresh.match_indices(), recycled.match_indices());
        }
    }

    #[test]
    fn freed_engines_reject_searches() {
        let mut re = Regex::new("a").unwrap();
        re.free_memory(false);
        assert!(re.test("a").unwrap());
        re.free_memory(true);
        assert!(re.test("a").unwrap_err().is_invalid_argument());
        assert!(re.find("a").unwrap_err().is_invalid_argument());
        re.recompile("b").unwrap();
        assert!(re.test("b").unwrap());
    }

    #[test]
    fn config_knobs_reach_the_cache() {
        let config = Config::new()
            .cache_capacity(2)
            .overflow_limit(1)
            .rebuild_limit(1);
        let mut re =
            Builder::new().configure(config).build("(ab|cd|ef)+x").unwrap();
        assert!(re.test("abcdefx").unwrap());
        assert!(!re.test("abcdef").unwrap());
    }

    #[test]
    fn compile_errors_surface() {
        assert!(Regex::new("a)").unwrap_err().is_syntax());
        assert!(Regex::new(&[0xC3][..]).unwrap_err().is_invalid_utf8());
    }
}
