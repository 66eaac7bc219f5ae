use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use glob::glob;
use pcapex_core::{ExtractError, Extraction, Extractor, ExtractorOptions, OutputTarget};
use serde::Serialize;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("PCAPEX_BUILD_COMMIT"),
    " ",
    env!("PCAPEX_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "pcapex")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Extract decoded frames and reassembled payloads from PCAP/PCAPNG captures.",
    long_about = None,
    after_help = "Examples:\n  pcapex pcap extract capture.pcap -o frames.json\n  pcapex pcap extract capture --format tree --tcp --strict\n  pcapex pcap extract capture.pcapng --nofile --trace --json-summary"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operations on PCAP/PCAPNG inputs.
    Pcap {
        #[command(subcommand)]
        command: PcapCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PcapCommands {
    /// Decode every frame of a capture and write the records.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Capture file (or glob matching exactly one); `.pcap` is appended when missing
    #[arg(default_value = "in.pcap")]
    input: PathBuf,

    /// Output file, or directory with --files
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Output format (json, tree, html); defaults to the output extension
    #[arg(short = 'f', long)]
    format: Option<String>,

    /// Do not append file extensions to input and output names
    #[arg(long)]
    no_extension: bool,

    /// Write one file per record into the output directory
    #[arg(long, conflicts_with = "nofile")]
    files: bool,

    /// Do not write any output file
    #[arg(long)]
    nofile: bool,

    /// Do not keep decoded frames in memory
    #[arg(long)]
    no_store: bool,

    /// Reassemble IPv4 and IPv6 fragments
    #[arg(long)]
    ip: bool,

    /// Reassemble IPv4 fragments
    #[arg(long)]
    ipv4: bool,

    /// Reassemble IPv6 fragments
    #[arg(long)]
    ipv6: bool,

    /// Reassemble TCP streams
    #[arg(long)]
    tcp: bool,

    /// Cut reassembled data at the first missing byte instead of joining across it
    #[arg(long)]
    strict: bool,

    /// Group TCP frames into flows
    #[arg(long)]
    trace: bool,

    /// Log one line per frame
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,

    /// Print a JSON summary to stdout
    #[arg(long)]
    json_summary: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Pcap { command } => match command {
            PcapCommands::Extract(args) => cmd_pcap_extract(args),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

impl From<ExtractError> for CliError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::InputNotFound(path) => CliError::new(
                format!("input file not found: {}", path.display()),
                Some("use a .pcap or .pcapng file".to_string()),
            ),
            ExtractError::FormatUnspecified => CliError::new(
                "output format not specified",
                Some("use --format, an output name with an extension, or --nofile".to_string()),
            ),
            ExtractError::UnsupportedFormat(name) => CliError::new(
                format!("unsupported output format '{name}'"),
                Some("supported formats: json, tree, html".to_string()),
            ),
            ExtractError::Source(err) => CliError::new(
                format!("failed to read capture: {err}"),
                Some("expected a .pcap or .pcapng file".to_string()),
            ),
            other => CliError::new(other.to_string(), None),
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_pcap_extract(args: ExtractArgs) -> Result<(), CliError> {
    init_logging(args.verbose, args.quiet);

    let input = resolve_input_path(&args.input)?;

    let options = ExtractorOptions {
        store: !args.no_store,
        ip: args.ip,
        ipv4: args.ipv4,
        ipv6: args.ipv6,
        tcp: args.tcp,
        strict: args.strict,
        trace: args.trace,
        verbose: args.verbose,
        output: args.output,
        format: args.format,
        extension: !args.no_extension,
        files: args.files,
        nofile: args.nofile,
    };
    let target = OutputTarget::resolve(options.names(&input)).map_err(ExtractError::from)?;
    if let Some(output) = target.output.as_ref() {
        ensure_distinct(&target.input, &output.path)?;
    }
    let extraction = Extractor::run(&input, options)?;
    let summary = Summary::from(&extraction);

    if args.json_summary {
        let json = serde_json::to_string_pretty(&summary).context("JSON serialization failed")?;
        println!("{json}");
    }
    if !args.quiet {
        match summary.output {
            Some(output) => eprintln!(
                "OK: {} frames extracted -> {}",
                summary.frames,
                output.display()
            ),
            None => eprintln!("OK: {} frames extracted", summary.frames),
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    input: Option<&'a Path>,
    output: Option<&'a Path>,
    format: Option<&'a str>,
    version: String,
    linktype: i32,
    frames: u64,
    protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv4_datagrams: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv6_datagrams: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tcp_streams: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flows: Option<usize>,
}

impl<'a> From<&'a Extraction> for Summary<'a> {
    fn from(extraction: &'a Extraction) -> Self {
        let (major, minor) = extraction.version();
        let reassembly = extraction.reassembly();
        Self {
            input: extraction.input(),
            output: extraction.output(),
            format: extraction.format(),
            version: format!("{major}.{minor}"),
            linktype: extraction.linktype().0,
            frames: extraction.length(),
            protocol: extraction.protocol().map(ToString::to_string),
            ipv4_datagrams: reassembly.ipv4.as_deref().map(<[_]>::len),
            ipv6_datagrams: reassembly.ipv6.as_deref().map(<[_]>::len),
            tcp_streams: reassembly.tcp.as_deref().map(<[_]>::len),
            flows: extraction.trace().ok().map(<[_]>::len),
        }
    }
}

/// Refuse to overwrite the capture with its own extraction. Both paths are
/// compared after name resolution.
fn ensure_distinct(input: &Path, output: &Path) -> Result<(), CliError> {
    let (Ok(input_abs), Ok(output_abs)) = (fs::canonicalize(input), fs::canonicalize(output))
    else {
        return Ok(());
    };
    if input_abs == output_abs {
        return Err(CliError::new(
            format!("output path must differ from input: {}", output.display()),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let mut matches = Vec::new();
    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern; expected .pcap or .pcapng".to_string()),
        )),
        1 => Ok(matches.remove(0)),
        count => {
            let mut listed = matches
                .iter()
                .take(3)
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if count > 3 {
                listed.push_str(", ...");
            }
            Err(CliError::new(
                format!("multiple files match pattern '{pattern}' ({count} matches); matches: {listed}"),
                Some("pass a single capture file, or run once per file".to_string()),
            ))
        }
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
