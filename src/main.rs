// Purpose: Provide the binary entry for the lowering CLI.
// Inputs/Outputs: Reads process args and returns the process exit code from the CLI dispatcher.
// Invariants: Main must not bypass centralized CLI argument/diagnostic handling.
// Gotchas: All flag and mode changes belong in cli/mod.rs, not this shim.

fn main() {
    let code = gosling::cli::run_cli(std::env::args().skip(1));
    std::process::exit(code);
}
