pub mod cli;
pub mod errors;
pub mod external_tools;
pub mod pipeline;
pub mod reference_panel;

use cli::PhaseArgs;
use errors::Result;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

pub fn run_from_args(args: PhaseArgs) -> Result<()> {
    pipeline::run(&args)
}

#[cfg(test)]
mod tests {
    use crate::cli::parse_args;

    #[test]
    fn wiring_parses_and_plans_dry_run() {
        let args = parse_args([
            "genotype_and_phase",
            "sample.bam",
            "GRCh38.fa",
            "target/test_wiring.bcf",
            "/nonexistent/panel",
            "target/test_wiring",
            "--dry-run",
            "-C",
            "chr20",
        ])
        .expect("expected valid args");
        assert!(args.dry_run);

        let plan = crate::pipeline::build_plan(&args).expect("expected plan generation success");
        let mut output = Vec::new();
        crate::pipeline::write_plan(&plan, &mut output).expect("expected plan write success");
        let text = String::from_utf8(output).expect("expected utf8 output");
        assert!(text.starts_with("# chr20\n"));
        assert!(text.ends_with(
            "bcftools concat -o target/test_wiring.bcf target/test_wiring.chr20.bcf\n"
        ));
    }
}
