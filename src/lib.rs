// Purpose: Define crate-level module surface for the lowering core and tooling.
// Inputs/Outputs: Re-exports internal modules for the binary, tests, and embedding front ends.
// Invariants: Public module boundaries should remain stable for internal callers.
// Gotchas: Keep module wiring consistent with the src/main.rs entry path.

pub mod cli;
pub mod codegen;
pub mod compile;
pub mod manifest;
pub mod ssa;
pub mod suggest;
