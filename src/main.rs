use mimalloc::MiMalloc;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    genotype_and_phase::init_tracing();
    match genotype_and_phase::cli::parse_from_env().and_then(genotype_and_phase::run_from_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("genotype_and_phase: {error}");
            ExitCode::from(1)
        }
    }
}
