//! End-to-end tests: emit code into an executable arena, run it, and
//! check the results through the host calling convention.

#[cfg(test)]
mod util;

#[cfg(test)]
mod abi;
#[cfg(test)]
mod arena;
#[cfg(test)]
mod arith;
#[cfg(test)]
mod memory;
