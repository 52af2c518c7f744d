pub(crate) mod dfa;
