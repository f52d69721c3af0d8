//! The debugger host library for the [nashdbg](https://github.com/nashdbg/nashdbg) remote debugger.

pub mod brk;
pub mod cli;
pub mod consts;
pub mod host;
pub mod jdwp;
pub mod node;
pub mod prelude;
pub mod res;
pub mod script;
#[cfg(test)]
pub mod test;
pub mod vm;

#[cfg(test)]
mod brk_tests;
