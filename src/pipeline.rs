use crate::cli::PhaseArgs;
use crate::errors::{AppError, Result};
use crate::external_tools::{ExternalTools, ToolCommand};
use crate::reference_panel::ReferencePanel;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{error, info, warn};

/// Paths and commands for one chromosome, derived from the run arguments alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeJob {
    pub chromosome: String,
    pub reference_vcf: PathBuf,
    pub reference_bcf: PathBuf,
    pub genetic_map: PathBuf,
    pub mpileup_vcf: PathBuf,
    pub calls_bcf: PathBuf,
    pub phased_bcf: PathBuf,
    /// mpileup, call, index, phase; run in this order.
    pub steps: Vec<ToolCommand>,
}

impl ChromosomeJob {
    pub fn new(
        args: &PhaseArgs,
        tools: &ExternalTools,
        panel: &ReferencePanel,
        chromosome: &str,
    ) -> Self {
        let reference_vcf = panel.reference_vcf(chromosome);
        let reference_bcf = panel.reference_bcf(chromosome);
        let genetic_map = panel.genetic_map(chromosome);
        let mpileup_vcf = temp_path(&args.temps_prefix, chromosome, "mpileup.vcf.gz");
        let calls_bcf = temp_path(&args.temps_prefix, chromosome, "calls.bcf");
        let phased_bcf = temp_path(&args.temps_prefix, chromosome, "bcf");

        let steps = vec![
            tools.mpileup_command(
                &args.input_bam,
                &args.input_reference,
                &reference_vcf,
                &mpileup_vcf,
            ),
            tools.call_command(&mpileup_vcf, &calls_bcf),
            tools.index_command(&calls_bcf),
            tools.phase_command(
                &calls_bcf,
                &genetic_map,
                chromosome,
                &reference_bcf,
                &phased_bcf,
            ),
        ];

        Self {
            chromosome: chromosome.to_string(),
            reference_vcf,
            reference_bcf,
            genetic_map,
            mpileup_vcf,
            calls_bcf,
            phased_bcf,
            steps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub jobs: Vec<ChromosomeJob>,
    pub concat: ToolCommand,
    pub pool_size: usize,
}

impl PipelinePlan {
    pub fn phased_outputs(&self) -> Vec<&Path> {
        self.jobs.iter().map(|job| job.phased_bcf.as_path()).collect()
    }
}

pub fn build_plan(args: &PhaseArgs) -> Result<PipelinePlan> {
    args.validate()?;
    let tools = ExternalTools::from_args(args);
    let panel = ReferencePanel::new(&args.reference_dir);

    let jobs = args
        .chromosomes
        .iter()
        .map(|chromosome| ChromosomeJob::new(args, &tools, &panel, chromosome))
        .collect::<Vec<_>>();
    let phased = jobs.iter().map(|job| &job.phased_bcf).collect::<Vec<_>>();
    let concat = tools.concat_command(&args.output_bcf, &phased);

    Ok(PipelinePlan {
        jobs,
        concat,
        pool_size: args.pool_size(),
    })
}

pub fn run(args: &PhaseArgs) -> Result<()> {
    info!(
        input_bam = %args.input_bam,
        chromosomes = args.chromosomes.len(),
        workers = args.pool_size(),
        output = %args.output_bcf,
        "starting genotype and phase run"
    );
    let plan = build_plan(args)?;

    if args.dry_run {
        let mut out = io::stdout().lock();
        write_plan(&plan, &mut out)?;
        out.flush()?;
        return Ok(());
    }

    let tools = ExternalTools::from_args(args);
    if args.skip_preflight {
        warn!("skipping preflight checks for executables and input files");
    } else {
        preflight(args, &tools)?;
    }

    let started = Instant::now();
    let phased = run_jobs(&tools, &plan, args.progress)?;
    info!(
        chromosomes = phased.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "all chromosome jobs completed"
    );

    info!(
        output = %args.output_bcf,
        inputs = phased.len(),
        "concatenating phased chromosomes"
    );
    tools.run(&plan.concat)?;
    info!(
        output = %args.output_bcf,
        elapsed_ms = started.elapsed().as_millis(),
        "completed genotype and phase run"
    );
    Ok(())
}

/// Runs the four steps for one chromosome, stopping at the first failure.
pub fn run_chromosome(tools: &ExternalTools, job: &ChromosomeJob) -> Result<PathBuf> {
    let started = Instant::now();
    info!(chromosome = %job.chromosome, "starting chromosome job");
    for step in &job.steps {
        tools.run(step)?;
    }
    info!(
        chromosome = %job.chromosome,
        output = %job.phased_bcf.display(),
        elapsed_ms = started.elapsed().as_millis(),
        "completed chromosome job"
    );
    Ok(job.phased_bcf.clone())
}

/// Fans the jobs out over a fixed pool and waits for every started job.
///
/// After the first failure no further jobs are started; jobs already running
/// finish. The returned error is the earliest failure in chromosome order.
fn run_jobs(
    tools: &ExternalTools,
    plan: &PipelinePlan,
    show_progress: bool,
) -> Result<Vec<PathBuf>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(plan.pool_size)
        .thread_name(|index| format!("phase-worker-{index}"))
        .build()
        .map_err(|err| AppError::WorkerPool {
            message: format!("failed to initialize rayon thread pool: {err}"),
        })?;

    let mut progress = JobProgress::new(show_progress, plan.jobs.len());
    let failed = AtomicBool::new(false);

    let outcomes = pool.install(|| {
        plan.jobs
            .par_iter()
            .with_max_len(1)
            .map(|job| {
                if failed.load(Ordering::Acquire) {
                    return Err(AppError::JobSkipped {
                        chromosome: job.chromosome.clone(),
                    });
                }
                let result = run_chromosome(tools, job);
                match &result {
                    Ok(_) => progress.on_job_done(&job.chromosome),
                    Err(err) => {
                        failed.store(true, Ordering::Release);
                        error!(
                            chromosome = %job.chromosome,
                            error = %err,
                            "chromosome job failed"
                        );
                    }
                }
                result
            })
            .collect::<Vec<_>>()
    });

    let mut phased = Vec::with_capacity(outcomes.len());
    let mut skipped = 0usize;
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok(path) => phased.push(path),
            Err(AppError::JobSkipped { .. }) => skipped += 1,
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    if let Some(err) = first_error {
        if skipped > 0 {
            warn!(skipped, "chromosome jobs not started after an earlier failure");
        }
        return Err(err);
    }
    progress.finish();
    Ok(phased)
}

fn preflight(args: &PhaseArgs, tools: &ExternalTools) -> Result<()> {
    for program in tools.required_programs() {
        if !tools.exists_command(program) {
            return Err(AppError::CommandNotFound {
                command: program.to_string(),
            });
        }
    }

    let mut missing = [&args.input_bam, &args.input_reference]
        .into_iter()
        .map(PathBuf::from)
        .filter(|path| !path.is_file())
        .collect::<Vec<_>>();
    let panel = ReferencePanel::new(&args.reference_dir);
    missing.extend(panel.missing_files(args.chromosomes.iter().map(String::as_str)));
    if !missing.is_empty() {
        return Err(AppError::MissingInputs { paths: missing });
    }
    Ok(())
}

/// Writes every command of the plan, one shell line each, in execution order.
pub fn write_plan<W: Write + ?Sized>(plan: &PipelinePlan, out: &mut W) -> Result<()> {
    for job in &plan.jobs {
        writeln!(out, "# {}", job.chromosome)?;
        for step in &job.steps {
            writeln!(out, "{step}")?;
        }
    }
    writeln!(out, "# concat")?;
    writeln!(out, "{}", plan.concat)?;
    Ok(())
}

fn temp_path(prefix: &str, chromosome: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}.{chromosome}.{suffix}"))
}

#[derive(Debug)]
struct JobProgress {
    progress_bar: Option<ProgressBar>,
    finished: bool,
}

impl JobProgress {
    fn new(enabled: bool, total: usize) -> Self {
        let progress_bar = if enabled {
            let bar = ProgressBar::new(total as u64);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(4));
            let style = ProgressStyle::with_template(
                "{spinner:.green} {elapsed_precise} [{bar:30}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_message("chromosomes phased");
            Some(bar)
        } else {
            None
        };

        Self {
            progress_bar,
            finished: false,
        }
    }

    fn on_job_done(&self, chromosome: &str) {
        if let Some(bar) = &self.progress_bar {
            bar.inc(1);
            bar.set_message(format!("last={chromosome}"));
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = &self.progress_bar {
            bar.finish_with_message("done");
        }
        self.finished = true;
    }
}

impl Drop for JobProgress {
    fn drop(&mut self) {
        if !self.finished
            && let Some(bar) = &self.progress_bar
        {
            bar.finish_and_clear();
        }
    }
}
