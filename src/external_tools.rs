use crate::cli::PhaseArgs;
use crate::errors::{AppError, Result};
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTools {
    pub bcftools: String,
    pub container_runtime: String,
    pub container_image: String,
    pub binds: Vec<String>,
    pub shapeit4: String,
    pub seed: u64,
}

/// A fully resolved external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    fn arg(mut self, value: impl AsRef<str>) -> Self {
        self.args.push(value.as_ref().to_string());
        self
    }

    fn path(self, value: &Path) -> Self {
        self.arg(value.to_string_lossy())
    }

    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

// shapeit4 logs progress and its ERROR lines to stdout.
const FAILED_STDOUT_TAIL_LINES: usize = 20;

fn tail_lines(text: &str, limit: usize) -> String {
    let lines = text.trim_end().lines().collect::<Vec<_>>();
    lines[lines.len().saturating_sub(limit)..].join("\n")
}

fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,+@%".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

impl ExternalTools {
    pub fn from_args(args: &PhaseArgs) -> Self {
        Self {
            bcftools: args.bcftools.clone(),
            container_runtime: args.container_runtime.clone(),
            container_image: args.container_image.clone(),
            binds: args.binds.clone(),
            shapeit4: args.shapeit4.clone(),
            seed: args.seed,
        }
    }

    pub fn mpileup_command(
        &self,
        input_bam: &str,
        input_reference: &str,
        regions_file: &Path,
        output: &Path,
    ) -> ToolCommand {
        ToolCommand::new(&self.bcftools)
            .arg("mpileup")
            .arg("-Oz")
            .arg("-f")
            .arg(input_reference)
            .arg("--regions-file")
            .path(regions_file)
            .arg(input_bam)
            .arg("-o")
            .path(output)
    }

    /// Consensus caller (`-c`), BCF output.
    pub fn call_command(&self, mpileup_vcf: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(&self.bcftools)
            .arg("call")
            .arg("-Ob")
            .arg("-c")
            .path(mpileup_vcf)
            .arg("-o")
            .path(output)
    }

    pub fn index_command(&self, bcf: &Path) -> ToolCommand {
        ToolCommand::new(&self.bcftools).arg("index").path(bcf)
    }

    pub fn phase_command(
        &self,
        calls_bcf: &Path,
        genetic_map: &Path,
        region: &str,
        reference_bcf: &Path,
        output: &Path,
    ) -> ToolCommand {
        let mut command = ToolCommand::new(&self.container_runtime).arg("run");
        for bind in &self.binds {
            command = command.arg("--bind").arg(bind);
        }
        command
            .arg(&self.container_image)
            .arg(&self.shapeit4)
            .arg("--input")
            .path(calls_bcf)
            .arg("--map")
            .path(genetic_map)
            .arg("--region")
            .arg(region)
            .arg("--reference")
            .path(reference_bcf)
            .arg("--output")
            .path(output)
            .arg("--seed")
            .arg(self.seed.to_string())
    }

    pub fn concat_command<P: AsRef<Path>>(&self, output: &str, inputs: &[P]) -> ToolCommand {
        inputs.iter().fold(
            ToolCommand::new(&self.bcftools)
                .arg("concat")
                .arg("-o")
                .arg(output),
            |command, input| command.path(input.as_ref()),
        )
    }

    /// Programs that must be resolvable before any job starts.
    pub fn required_programs(&self) -> [&str; 2] {
        [self.bcftools.as_str(), self.container_runtime.as_str()]
    }

    /// Runs `command` to completion, failing on spawn errors and non-zero exit.
    pub fn run(&self, command: &ToolCommand) -> Result<()> {
        info!(command = %command, "running external command");
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    AppError::CommandNotFound {
                        command: command.program.clone(),
                    }
                } else {
                    AppError::Io(err)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(AppError::CommandFailed {
                command: command.to_string(),
                code: output.status.code(),
                stderr: stderr.trim_end().to_string(),
                stdout: tail_lines(&stdout, FAILED_STDOUT_TAIL_LINES),
            });
        }

        for (stream, text) in [("stdout", &stdout), ("stderr", &stderr)] {
            if !text.trim().is_empty() {
                debug!(
                    program = %command.program,
                    subcommand = command.subcommand().unwrap_or(""),
                    stream,
                    output = %text.trim_end(),
                    "external command output"
                );
            }
        }
        Ok(())
    }

    pub fn exists_command(&self, cmd: &str) -> bool {
        if Path::new(cmd).exists() {
            return true;
        }
        std::env::var_os("PATH").is_some_and(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(cmd))
                .any(|full| full.exists())
        })
    }
}
