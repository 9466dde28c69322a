use crate::errors::{AppError, Result};
use crate::reference_panel::{GRCH38_1KG_CHROMOSOMES, is_known_chromosome};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "genotype_and_phase",
    version,
    about = "Genotype a BAM against the GRCh38 1000 Genomes panel with bcftools and phase it with shapeit4, one chromosome per worker"
)]
struct CliArgs {
    /// Aligned reads (BAM/CRAM)
    input_bam: String,
    /// Reference FASTA the reads were aligned to
    input_reference: String,
    /// Concatenated phased output
    output_bcf: String,
    /// Directory holding the panel VCF/BCF files and genetic maps
    reference_dir: String,
    /// Prefix for per-chromosome intermediate files
    temps_prefix: String,
    #[arg(short = 'C', long = "chromosome", num_args = 1..)]
    chromosomes: Vec<String>,
    #[arg(short = 'j', long = "threads")]
    threads: Option<usize>,
    #[arg(long = "bcftools", default_value = "bcftools")]
    bcftools: String,
    #[arg(long = "container-runtime", default_value = "singularity")]
    container_runtime: String,
    #[arg(long = "container-image", default_value = "shapeit4_latest.sif")]
    container_image: String,
    #[arg(long = "bind", action = ArgAction::Append, default_value = "/juno")]
    binds: Vec<String>,
    #[arg(long = "shapeit4", default_value = "shapeit4")]
    shapeit4: String,
    #[arg(long = "seed", default_value_t = 2)]
    seed: u64,
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
    #[arg(long = "skip-preflight", action = ArgAction::SetTrue)]
    skip_preflight: bool,
    #[arg(long = "progress", action = ArgAction::SetTrue)]
    progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseArgs {
    pub input_bam: String,
    pub input_reference: String,
    pub output_bcf: String,
    pub reference_dir: String,
    pub temps_prefix: String,
    pub chromosomes: Vec<String>,
    pub threads: Option<usize>,
    pub bcftools: String,
    pub container_runtime: String,
    pub container_image: String,
    pub binds: Vec<String>,
    pub shapeit4: String,
    pub seed: u64,
    pub dry_run: bool,
    pub skip_preflight: bool,
    pub progress: bool,
}

impl Default for PhaseArgs {
    fn default() -> Self {
        Self {
            input_bam: String::new(),
            input_reference: String::new(),
            output_bcf: String::new(),
            reference_dir: String::new(),
            temps_prefix: String::new(),
            chromosomes: GRCH38_1KG_CHROMOSOMES
                .iter()
                .map(ToString::to_string)
                .collect(),
            threads: None,
            bcftools: "bcftools".to_string(),
            container_runtime: "singularity".to_string(),
            container_image: "shapeit4_latest.sif".to_string(),
            binds: vec!["/juno".to_string()],
            shapeit4: "shapeit4".to_string(),
            seed: 2,
            dry_run: false,
            skip_preflight: false,
            progress: false,
        }
    }
}

impl PhaseArgs {
    /// Worker count; one worker per chromosome unless `--threads` overrides it.
    pub fn pool_size(&self) -> usize {
        self.threads.unwrap_or(self.chromosomes.len()).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("input_bam", &self.input_bam),
            ("input_reference", &self.input_reference),
            ("output_bcf", &self.output_bcf),
            ("reference_dir", &self.reference_dir),
            ("temps_prefix", &self.temps_prefix),
        ] {
            if value.is_empty() {
                return Err(AppError::MissingRequired {
                    field: field.to_string(),
                });
            }
        }
        if self.chromosomes.is_empty() {
            return Err(AppError::MissingValue {
                flag: "--chromosome".to_string(),
            });
        }
        for (index, chromosome) in self.chromosomes.iter().enumerate() {
            if !is_known_chromosome(chromosome) {
                return Err(AppError::InvalidValue {
                    flag: "--chromosome".to_string(),
                    value: chromosome.clone(),
                    reason: format!(
                        "not a reference panel chromosome (expected one of {})",
                        GRCH38_1KG_CHROMOSOMES.join(",")
                    ),
                });
            }
            if self.chromosomes[..index].contains(chromosome) {
                return Err(AppError::InvalidValue {
                    flag: "--chromosome".to_string(),
                    value: chromosome.clone(),
                    reason: "listed more than once".to_string(),
                });
            }
        }
        if self.threads == Some(0) {
            return Err(AppError::InvalidValue {
                flag: "--threads".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

pub fn parse_from_env() -> Result<PhaseArgs> {
    match CliArgs::try_parse_from(std::env::args()) {
        Ok(cli) => from_cli(cli),
        Err(error)
            if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            error.exit()
        }
        Err(error) => Err(map_clap_error(error)),
    }
}

pub fn parse_args<I, S>(args: I) -> Result<PhaseArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tokens: Vec<String> = args.into_iter().map(Into::into).collect();
    if tokens.is_empty() {
        tokens.push("genotype_and_phase".to_string());
    }

    let cli = CliArgs::try_parse_from(tokens).map_err(map_clap_error)?;
    from_cli(cli)
}

fn from_cli(cli: CliArgs) -> Result<PhaseArgs> {
    let defaults = PhaseArgs::default();
    let chromosomes = if cli.chromosomes.is_empty() {
        defaults.chromosomes
    } else {
        // Requested chromosomes are run and concatenated in panel order.
        let mut requested = cli.chromosomes;
        requested.sort_by_key(|chromosome| panel_rank(chromosome));
        requested
    };

    let parsed = PhaseArgs {
        input_bam: cli.input_bam,
        input_reference: cli.input_reference,
        output_bcf: cli.output_bcf,
        reference_dir: cli.reference_dir,
        temps_prefix: cli.temps_prefix,
        chromosomes,
        threads: cli.threads,
        bcftools: cli.bcftools,
        container_runtime: cli.container_runtime,
        container_image: cli.container_image,
        binds: cli.binds,
        shapeit4: cli.shapeit4,
        seed: cli.seed,
        dry_run: cli.dry_run,
        skip_preflight: cli.skip_preflight,
        progress: cli.progress,
    };

    parsed.validate()?;
    Ok(parsed)
}

// Unknown names sort last; validate() rejects them afterwards.
fn panel_rank(chromosome: &str) -> usize {
    GRCH38_1KG_CHROMOSOMES
        .iter()
        .position(|known| *known == chromosome)
        .unwrap_or(GRCH38_1KG_CHROMOSOMES.len())
}

fn map_clap_error(error: clap::Error) -> AppError {
    let kind = error.kind();
    let rendered = error.to_string();
    let quoted = quoted_tokens(&rendered);
    match kind {
        ErrorKind::UnknownArgument => AppError::UnsupportedArgument {
            arg: quoted.first().cloned().unwrap_or(rendered),
        },
        ErrorKind::MissingRequiredArgument => AppError::MissingRequired {
            field: first_placeholder(&rendered)
                .map(|name| name.to_ascii_lowercase())
                .unwrap_or_else(|| "argument".to_string()),
        },
        ErrorKind::TooFewValues | ErrorKind::WrongNumberOfValues => AppError::MissingValue {
            flag: quoted.first().map_or("argument", |flag| flag_name(flag)).to_string(),
        },
        // "invalid value 'x' for '--flag <FLAG>': reason"
        ErrorKind::InvalidValue | ErrorKind::ValueValidation => match quoted.as_slice() {
            [value, flag, ..] => AppError::InvalidValue {
                flag: flag_name(flag).to_string(),
                value: value.clone(),
                reason: rendered
                    .lines()
                    .find_map(|line| line.split_once("': ").map(|(_, reason)| reason.trim()))
                    .unwrap_or("invalid value")
                    .to_string(),
            },
            _ => AppError::ParseError {
                message: clap_error_message(&rendered),
            },
        },
        _ => AppError::ParseError {
            message: clap_error_message(&rendered),
        },
    }
}

fn quoted_tokens(message: &str) -> Vec<String> {
    message
        .split('\'')
        .skip(1)
        .step_by(2)
        .map(ToString::to_string)
        .collect()
}

fn first_placeholder(message: &str) -> Option<&str> {
    let start = message.find('<')?;
    let end = message[start + 1..].find('>')?;
    Some(&message[start + 1..start + 1 + end])
}

fn flag_name(token: &str) -> &str {
    token.split_whitespace().next().unwrap_or(token)
}

fn clap_error_message(message: &str) -> String {
    message
        .lines()
        .find_map(|line| line.strip_prefix("error: "))
        .or_else(|| message.lines().next())
        .unwrap_or("failed to parse arguments")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::parse_args;
    use crate::errors::AppError;

    const POSITIONALS: [&str; 6] = [
        "genotype_and_phase",
        "sample.bam",
        "GRCh38.fa",
        "sample.phased.bcf",
        "/ref/1kg",
        "/scratch/sample",
    ];

    fn with_options(options: &[&'static str]) -> Vec<&'static str> {
        let mut tokens = POSITIONALS.to_vec();
        tokens.extend_from_slice(options);
        tokens
    }

    #[test]
    fn parses_positionals_with_defaults() {
        let args = parse_args(POSITIONALS).expect("expected parse success");

        assert_eq!(args.input_bam, "sample.bam");
        assert_eq!(args.input_reference, "GRCh38.fa");
        assert_eq!(args.output_bcf, "sample.phased.bcf");
        assert_eq!(args.reference_dir, "/ref/1kg");
        assert_eq!(args.temps_prefix, "/scratch/sample");
        assert_eq!(args.chromosomes.len(), 23);
        assert_eq!(args.pool_size(), 23);
        assert_eq!(args.bcftools, "bcftools");
        assert_eq!(args.container_runtime, "singularity");
        assert_eq!(args.container_image, "shapeit4_latest.sif");
        assert_eq!(args.binds, vec!["/juno".to_string()]);
        assert_eq!(args.seed, 2);
        assert!(!args.dry_run);
    }

    #[test]
    fn rejects_missing_positionals() {
        let result = parse_args(["genotype_and_phase", "sample.bam", "GRCh38.fa"]);
        match result {
            Err(AppError::MissingRequired { field }) => assert_eq!(field, "output_bcf"),
            other => panic!("expected missing output_bcf, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_positional() {
        let mut tokens = POSITIONALS.to_vec();
        tokens[5] = "";
        assert!(matches!(
            parse_args(tokens),
            Err(AppError::MissingRequired { ref field }) if field == "temps_prefix"
        ));
    }

    #[test]
    fn help_lists_positionals_as_required() {
        let mut command = <super::CliArgs as clap::CommandFactory>::command();
        let usage = command.render_usage().to_string();
        assert!(usage.contains("<INPUT_BAM> <INPUT_REFERENCE> <OUTPUT_BCF>"), "{usage}");
        assert!(!usage.contains("[INPUT_BAM]"), "{usage}");
    }

    #[test]
    fn chromosome_subset_is_reordered_to_panel_order() {
        let args = parse_args(with_options(&["-C", "chrX", "chr10", "chr2"]))
            .expect("expected parse success");

        assert_eq!(args.chromosomes, vec!["chr2", "chr10", "chrX"]);
        assert_eq!(args.pool_size(), 3);
    }

    #[test]
    fn rejects_unknown_chromosome() {
        let result = parse_args(with_options(&["-C", "chr1", "chrY"]));
        assert!(matches!(
            result,
            Err(AppError::InvalidValue { ref value, .. }) if value == "chrY"
        ));
    }

    #[test]
    fn rejects_duplicate_chromosome() {
        let result = parse_args(with_options(&["-C", "chr1", "chr1"]));
        assert!(result.is_err());
    }

    #[test]
    fn threads_override_pool_size() {
        let args = parse_args(with_options(&["--threads", "4"])).expect("expected parse success");
        assert_eq!(args.threads, Some(4));
        assert_eq!(args.pool_size(), 4);
    }

    #[test]
    fn rejects_zero_threads() {
        assert!(matches!(
            parse_args(with_options(&["-j", "0"])),
            Err(AppError::InvalidValue { ref flag, .. }) if flag == "--threads"
        ));
    }

    #[test]
    fn non_numeric_options_name_the_flag() {
        match parse_args(with_options(&["-j", "many"])) {
            Err(AppError::InvalidValue { flag, value, .. }) => {
                assert_eq!(flag, "--threads");
                assert_eq!(value, "many");
            }
            other => panic!("expected invalid --threads, got {other:?}"),
        }
        assert!(matches!(
            parse_args(with_options(&["--seed", "two"])),
            Err(AppError::InvalidValue { ref flag, .. }) if flag == "--seed"
        ));
    }

    #[test]
    fn repeated_bind_replaces_default() {
        let args = parse_args(with_options(&["--bind", "/data", "--bind", "/scratch"]))
            .expect("expected parse success");
        assert_eq!(args.binds, vec!["/data".to_string(), "/scratch".to_string()]);
    }

    #[test]
    fn rejects_unknown_flag() {
        let result = parse_args(with_options(&["--no-such-flag"]));
        assert!(matches!(result, Err(AppError::UnsupportedArgument { .. })));
    }
}
