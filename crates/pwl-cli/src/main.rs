// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use pwl_cli::{ColumnChoice, CsvTable, series_from_table, stats_to_csv};
use pwl_core::{Diagnostics, ExecutionContext, PwlError};
use pwl_offline::{
    Continuity, DomainPolicy, FitConfig, PiecewiseLinearModel, SegmentStats, fit_with_config,
};
use serde::Serialize;
use std::env;
use std::fmt;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Debug)]
struct Cli {
    command: Command,
    verbose: bool,
}

#[derive(Debug)]
enum Command {
    Fit(FitArgs),
    Predict(PredictArgs),
}

#[derive(Debug, Default)]
struct FitArgs {
    input: PathBuf,
    x_column: Option<String>,
    y_column: Option<String>,
    segments: Option<usize>,
    min_segment_len: Option<usize>,
    continuity: Option<Continuity>,
    domain: Option<DomainPolicy>,
    config: Option<PathBuf>,
    memory_budget: Option<usize>,
    format: FormatArg,
    output: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct PredictArgs {
    fit: FitArgs,
    at: Vec<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum FormatArg {
    #[default]
    Json,
    Csv,
}

impl FormatArg {
    fn parse(raw: &str) -> Result<Self, CliError> {
        match raw.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(CliError::invalid_input(format!(
                "invalid --format '{raw}'; expected one of: json, csv"
            ))),
        }
    }
}

fn parse_domain(raw: &str) -> Result<DomainPolicy, CliError> {
    match raw.to_ascii_lowercase().as_str() {
        "extrapolate" => Ok(DomainPolicy::Extrapolate),
        "strict" => Ok(DomainPolicy::Strict),
        _ => Err(CliError::invalid_input(format!(
            "invalid --domain '{raw}'; expected one of: extrapolate, strict"
        ))),
    }
}

#[derive(Debug)]
enum CliError {
    Pwl(PwlError),
    Io {
        context: String,
        source: std::io::Error,
    },
    Json {
        context: String,
        source: serde_json::Error,
    },
    InvalidInput(String),
}

impl CliError {
    fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Pwl(err) => err.code(),
            Self::InvalidInput(_) => "invalid_input",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pwl(err) => write!(f, "{err}"),
            Self::Io { context, source } => write!(f, "{context}: {source}"),
            Self::Json { context, source } => write!(f, "{context}: {source}"),
            Self::InvalidInput(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pwl(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::InvalidInput(_) => None,
        }
    }
}

impl From<PwlError> for CliError {
    fn from(value: PwlError) -> Self {
        Self::Pwl(value)
    }
}

fn log_level(verbose: bool) -> log::LevelFilter {
    if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    }
}

/// Installs the stderr logger; `RUST_LOG` directives refine the default level.
fn init_logging(verbose: bool) {
    let _ = env_logger::Builder::new()
        .filter_level(log_level(verbose))
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}

#[derive(Serialize)]
struct InputSummary {
    path: String,
    n: usize,
    x_column: String,
    y_column: String,
}

#[derive(Serialize)]
struct FitOutput {
    command: &'static str,
    input: InputSummary,
    config: FitConfig,
    breakpoints: Vec<usize>,
    breakpoint_x: Vec<f64>,
    objective: f64,
    total_ssr: f64,
    segments: Vec<SegmentStats>,
    diagnostics: Diagnostics,
}

#[derive(Serialize)]
struct PredictionOutput {
    x: f64,
    y: f64,
}

#[derive(Serialize)]
struct PredictOutput {
    command: &'static str,
    input: InputSummary,
    config: FitConfig,
    breakpoints: Vec<usize>,
    predictions: Vec<PredictionOutput>,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

fn main() {
    if let Err(err) = run() {
        emit_structured_error(&err);
        process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let Some(cli) = parse_cli(&args)? else {
        return Ok(());
    };
    init_logging(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Predict(args) => handle_predict(args),
    }
}

fn parse_cli(args: &[String]) -> Result<Option<Cli>, CliError> {
    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help") {
        print_root_help();
        return Ok(None);
    }
    if matches!(args[0].as_str(), "-V" | "--version") {
        print_version();
        return Ok(None);
    }

    let command_name = args[0].as_str();
    let rest = &args[1..];

    if rest
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_command_help(command_name)?;
        return Ok(None);
    }

    let verbose = rest.iter().any(|arg| matches!(arg.as_str(), "-v" | "--verbose"));
    let rest = rest
        .iter()
        .filter(|arg| !matches!(arg.as_str(), "-v" | "--verbose"))
        .cloned()
        .collect::<Vec<_>>();

    let command = match command_name {
        "fit" => Command::Fit(parse_fit_args(&rest)?),
        "predict" => Command::Predict(parse_predict_args(&rest)?),
        _ => {
            return Err(CliError::invalid_input(format!(
                "unknown command '{command_name}'; expected one of: fit, predict"
            )));
        }
    };

    Ok(Some(Cli { command, verbose }))
}

/// Applies one shared fit option; returns false when `flag` is not a fit option.
fn apply_fit_flag(
    args: &mut FitArgs,
    flag: &str,
    inline_value: Option<String>,
    tokens: &[String],
    idx: &mut usize,
) -> Result<bool, CliError> {
    match flag {
        "--input" => {
            args.input = PathBuf::from(take_flag_value(flag, inline_value, tokens, idx)?);
        }
        "--x-column" => {
            args.x_column = Some(take_flag_value(flag, inline_value, tokens, idx)?);
        }
        "--y-column" => {
            args.y_column = Some(take_flag_value(flag, inline_value, tokens, idx)?);
        }
        "--segments" => {
            let raw = take_flag_value(flag, inline_value, tokens, idx)?;
            args.segments = Some(parse_usize_arg(raw.as_str(), flag)?);
        }
        "--min-segment-len" => {
            let raw = take_flag_value(flag, inline_value, tokens, idx)?;
            args.min_segment_len = Some(parse_usize_arg(raw.as_str(), flag)?);
        }
        "--continuity" => {
            let raw = take_flag_value(flag, inline_value, tokens, idx)?;
            args.continuity = Some(Continuity::parse(raw.as_str())?);
        }
        "--domain" => {
            let raw = take_flag_value(flag, inline_value, tokens, idx)?;
            args.domain = Some(parse_domain(raw.as_str())?);
        }
        "--config" => {
            args.config = Some(PathBuf::from(take_flag_value(
                flag,
                inline_value,
                tokens,
                idx,
            )?));
        }
        "--memory-budget" => {
            let raw = take_flag_value(flag, inline_value, tokens, idx)?;
            args.memory_budget = Some(parse_usize_arg(raw.as_str(), flag)?);
        }
        "--format" => {
            let raw = take_flag_value(flag, inline_value, tokens, idx)?;
            args.format = FormatArg::parse(raw.as_str())?;
        }
        "--output" => {
            args.output = Some(PathBuf::from(take_flag_value(
                flag,
                inline_value,
                tokens,
                idx,
            )?));
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_fit_args(tokens: &[String]) -> Result<FitArgs, CliError> {
    let mut args = FitArgs::default();
    let mut idx = 0usize;
    while idx < tokens.len() {
        let (flag, inline_value) = split_flag(tokens[idx].as_str())?;
        if !apply_fit_flag(&mut args, flag, inline_value, tokens, &mut idx)? {
            return Err(CliError::invalid_input(format!(
                "unknown fit option '{flag}'"
            )));
        }
        idx += 1;
    }

    if args.input.as_os_str().is_empty() {
        return Err(CliError::invalid_input("fit requires --input <path>"));
    }
    Ok(args)
}

fn parse_predict_args(tokens: &[String]) -> Result<PredictArgs, CliError> {
    let mut args = PredictArgs::default();
    let mut has_at = false;
    let mut idx = 0usize;
    while idx < tokens.len() {
        let (flag, inline_value) = split_flag(tokens[idx].as_str())?;
        if flag == "--at" {
            let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
            args.at.extend(parse_f64_list(raw.as_str(), flag)?);
            has_at = true;
        } else if !apply_fit_flag(&mut args.fit, flag, inline_value, tokens, &mut idx)? {
            return Err(CliError::invalid_input(format!(
                "unknown predict option '{flag}'"
            )));
        }
        idx += 1;
    }

    if args.fit.input.as_os_str().is_empty() {
        return Err(CliError::invalid_input("predict requires --input <path>"));
    }
    if !has_at {
        return Err(CliError::invalid_input(
            "predict requires --at <x1,x2,...>",
        ));
    }
    Ok(args)
}

fn split_flag(token: &str) -> Result<(&str, Option<String>), CliError> {
    if !token.starts_with("--") {
        return Err(CliError::invalid_input(format!(
            "unexpected positional argument '{token}'; expected --flag value"
        )));
    }
    if let Some((flag, value)) = token.split_once('=') {
        return Ok((flag, Some(value.to_string())));
    }
    Ok((token, None))
}

fn take_flag_value(
    flag: &str,
    inline_value: Option<String>,
    tokens: &[String],
    idx: &mut usize,
) -> Result<String, CliError> {
    if let Some(value) = inline_value {
        return Ok(value);
    }

    *idx += 1;
    let value = tokens
        .get(*idx)
        .ok_or_else(|| CliError::invalid_input(format!("{flag} requires a value")))?;
    if value.starts_with("--") {
        return Err(CliError::invalid_input(format!(
            "{flag} requires a value, but got option '{value}'"
        )));
    }
    Ok(value.clone())
}

fn parse_usize_arg(raw: &str, flag: &str) -> Result<usize, CliError> {
    raw.parse::<usize>().map_err(|_| {
        CliError::invalid_input(format!(
            "{flag} expects a non-negative integer, got '{raw}'"
        ))
    })
}

fn parse_f64_list(raw: &str, flag: &str) -> Result<Vec<f64>, CliError> {
    raw.split(',')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(|cell| {
            cell.parse::<f64>().map_err(|_| {
                CliError::invalid_input(format!("{flag} expects numbers, got '{cell}'"))
            })
        })
        .collect()
}

fn print_version() {
    println!("pwl {}", env!("CARGO_PKG_VERSION"));
}

fn print_root_help() {
    println!(
        "pwl {}\n\nUSAGE:\n  pwl <COMMAND> [OPTIONS]\n\nCOMMANDS:\n  fit       Fit a piecewise-linear model and report per-segment statistics\n  predict   Fit a model and evaluate it at query x values\n\nGLOBAL OPTIONS:\n  -h, --help      Show help\n  -V, --version   Show version\n  -v, --verbose   Log fit progress to stderr\n\nRun 'pwl <COMMAND> --help' for subcommand options.",
        env!("CARGO_PKG_VERSION")
    );
}

const FIT_OPTIONS_HELP: &str = "  --input <path>                         Required CSV input\n  --x-column <name|index>                Default: time_pol, else column 0\n  --y-column <name|index>                Default: basepairs_pol, else column 1\n  --segments <usize>                     Default: 3\n  --min-segment-len <usize>              Default: 2\n  --continuity <independent|joined>      Default: independent\n  --domain <extrapolate|strict>          Default: extrapolate\n  --config <path>                        FitConfig JSON; flags override its fields\n  --memory-budget <bytes>                Cap on partitioner table memory\n  --format <json|csv>                    Default: json\n  --output <path>                        Write output to file";

fn print_command_help(command: &str) -> Result<(), CliError> {
    match command {
        "fit" => {
            println!("USAGE:\n  pwl fit --input <path> [OPTIONS]\n\nOPTIONS:\n{FIT_OPTIONS_HELP}");
            Ok(())
        }
        "predict" => {
            println!(
                "USAGE:\n  pwl predict --input <path> --at <x1,x2,...> [OPTIONS]\n\nOPTIONS:\n  --at <x1,x2,...>                       Required query x values; may repeat\n{FIT_OPTIONS_HELP}"
            );
            Ok(())
        }
        _ => Err(CliError::invalid_input(format!(
            "unknown command '{command}'; expected one of: fit, predict"
        ))),
    }
}

fn load_config(path: &Path) -> Result<FitConfig, CliError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| CliError::io(format!("failed to read '{}'", path.display()), source))?;
    serde_json::from_str(raw.as_str()).map_err(|source| {
        CliError::json(format!("invalid config JSON in '{}'", path.display()), source)
    })
}

fn resolve_config(args: &FitArgs) -> Result<FitConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => FitConfig::default(),
    };
    if let Some(segments) = args.segments {
        config.segments = segments;
    }
    if let Some(min_segment_len) = args.min_segment_len {
        config.min_segment_len = min_segment_len;
    }
    if let Some(continuity) = args.continuity {
        config.continuity = continuity;
    }
    if let Some(domain) = args.domain {
        config.domain = domain;
    }
    config.validate()?;
    Ok(config)
}

struct FittedInput {
    summary: InputSummary,
    config: FitConfig,
    model: PiecewiseLinearModel,
}

fn fit_from_args(args: &FitArgs) -> Result<FittedInput, CliError> {
    let config = resolve_config(args)?;
    let raw = fs::read_to_string(&args.input).map_err(|source| {
        CliError::io(format!("failed to read '{}'", args.input.display()), source)
    })?;
    let table = CsvTable::parse(raw.as_str())?;
    let (series, columns) =
        series_from_table(&table, args.x_column.as_deref(), args.y_column.as_deref())?;
    log::debug!(
        "loaded {} rows from '{}' (x={}, y={})",
        series.len(),
        args.input.display(),
        columns.x_name,
        columns.y_name
    );

    let mut ctx = ExecutionContext::new();
    if let Some(bytes) = args.memory_budget {
        ctx = ctx.with_memory_budget(bytes);
    }
    let model = fit_with_config(&series, &config, &ctx)?;
    for warning in &model.diagnostics().warnings {
        log::warn!("{warning}");
    }

    Ok(FittedInput {
        summary: input_summary(&args.input, series.len(), columns),
        config,
        model,
    })
}

fn input_summary(path: &Path, n: usize, columns: ColumnChoice) -> InputSummary {
    InputSummary {
        path: path.display().to_string(),
        n,
        x_column: columns.x_name,
        y_column: columns.y_name,
    }
}

fn handle_fit(args: FitArgs) -> Result<(), CliError> {
    let fitted = fit_from_args(&args)?;
    let model = &fitted.model;
    let stats = model.segment_stats();

    match args.format {
        FormatArg::Csv => write_text_output(&stats_to_csv(&stats), args.output.as_deref()),
        FormatArg::Json => {
            let x = model.series().x();
            write_json_output(
                &FitOutput {
                    command: "fit",
                    breakpoints: model.breakpoints().to_vec(),
                    breakpoint_x: model.breakpoints().iter().map(|&b| x[b]).collect(),
                    objective: model.objective(),
                    total_ssr: model.total_ssr(),
                    segments: stats,
                    diagnostics: model.diagnostics().clone(),
                    input: fitted.summary,
                    config: fitted.config,
                },
                args.output.as_deref(),
            )
        }
    }
}

fn handle_predict(args: PredictArgs) -> Result<(), CliError> {
    let fitted = fit_from_args(&args.fit)?;
    let values = fitted.model.predict(&args.at)?;

    match args.fit.format {
        FormatArg::Csv => {
            let mut out = String::from("x,y\n");
            for (x, y) in args.at.iter().zip(&values) {
                let _ = writeln!(out, "{x},{y}");
            }
            write_text_output(&out, args.fit.output.as_deref())
        }
        FormatArg::Json => write_json_output(
            &PredictOutput {
                command: "predict",
                breakpoints: fitted.model.breakpoints().to_vec(),
                predictions: args
                    .at
                    .iter()
                    .zip(values)
                    .map(|(&x, y)| PredictionOutput { x, y })
                    .collect(),
                input: fitted.summary,
                config: fitted.config,
            },
            args.fit.output.as_deref(),
        ),
    }
}

fn write_text_output(text: &str, output_path: Option<&Path>) -> Result<(), CliError> {
    if let Some(path) = output_path {
        fs::write(path, text)
            .map_err(|source| CliError::io(format!("failed to write '{}'", path.display()), source))
    } else {
        print!("{text}");
        Ok(())
    }
}

fn write_json_output<T: Serialize>(
    payload: &T,
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    let encoded = serde_json::to_string_pretty(payload)
        .map_err(|source| CliError::json("failed to serialize JSON output", source))?;
    write_text_output(&format!("{encoded}\n"), output_path)
}

fn emit_structured_error(err: &CliError) {
    let envelope = ErrorEnvelope {
        error: ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        },
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!(
            "{{\"error\":{{\"code\":\"{}\",\"message\":\"{}\"}}}}",
            err.code(),
            err
        ),
    }
}
