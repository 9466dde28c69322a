use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing value for argument: {flag}")]
    MissingValue { flag: String },
    #[error("missing required argument: {field}")]
    MissingRequired { field: String },
    #[error("invalid value for {flag}={value}: {reason}")]
    InvalidValue {
        flag: String,
        value: String,
        reason: String,
    },
    #[error("unsupported argument: {arg}")]
    UnsupportedArgument { arg: String },
    #[error("required command not found in PATH: {command}")]
    CommandNotFound { command: String },
    #[error("command failed: {command} (exit: {code:?}) stderr: {stderr}{}", stdout_suffix(.stdout))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
        stdout: String,
    },
    #[error("missing input files: {}", format_paths(.paths))]
    MissingInputs { paths: Vec<PathBuf> },
    #[error("chromosome {chromosome} was not run because another chromosome failed")]
    JobSkipped { chromosome: String },
    #[error("worker pool error: {message}")]
    WorkerPool { message: String },
    #[error("parse error: {message}")]
    ParseError { message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn stdout_suffix(stdout: &str) -> String {
    if stdout.is_empty() {
        String::new()
    } else {
        format!(" stdout: {stdout}")
    }
}
