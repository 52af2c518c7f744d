pub(crate) mod compiler;
pub(crate) mod pikevm;
pub(crate) mod program;
