/*!
A small regex engine over UTF-8 code points.

The dialect is deliberately tiny: literals, `.`, groups `(...)` (which
capture), classes `[...]` with the fixed ranges `a-z`, `A-Z` and `0-9`,
alternation `|`, the greedy quantifiers `?`, `*` and `+`, and `\` to
escape the byte after it. No anchors, no back-references, no counted
repetition.

A pattern compiles into an instruction program for a Thompson NFA. A
boolean search ([`Regex::test`]) runs a DFA built lazily over the program,
with a fixed-size state cache and a fall-back to the NFA when the cache
churns. A capture search ([`Regex::find`]) simulates the NFA directly,
tracking one capture vector per thread.

```
use regex_vm::{Regex, Search};

let mut re = Regex::new("(ab|a)(bc|c)")?;
assert!(re.test("abc")?);
assert!(re.find("abc")?);
// Group 1 is "ab", group 2 is "c": splits prefer their left branch.
assert_eq!(&[0, 3, 0, 2, 2, 3], &re.match_indices()[0][..]);

let mut re = Regex::new("[a-z0-9]+")?;
assert!(re.test_with(Search::new().unanchored(true), "Hello42World")?);
# Ok::<(), regex_vm::Error>(())
```

Patterns and haystacks are byte strings; malformed UTF-8 in either is
reported as an error rather than silently skipped. A compiled [`Regex`]
owns mutable search scratch, so searching takes `&mut self`; clone the
pattern into a second engine for concurrent use.
*/

pub use crate::{
    error::Error,
    regex::{Builder, Config, Regex, Search},
};

mod error;
mod hybrid;
mod nfa;
mod regex;
mod util;
