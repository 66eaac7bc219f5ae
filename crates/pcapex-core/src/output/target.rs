use std::path::{Path, PathBuf};

use super::OutputFormat;
use super::error::OutputError;

/// Input used when none is given.
pub const DEFAULT_INPUT: &str = "in.pcap";
/// Output file stem (or directory in files mode) used when none is given.
pub const DEFAULT_OUTPUT: &str = "out";

/// Resolved input and output names of an extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub input: PathBuf,
    /// `None` in nofile mode.
    pub output: Option<ResolvedOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutput {
    /// File path, or directory when `files` is set.
    pub path: PathBuf,
    /// Format name as requested or as taken from the output extension.
    pub format: String,
    pub files: bool,
}

impl ResolvedOutput {
    /// The format, if a sink can be created for it.
    pub fn format(&self) -> Result<OutputFormat, OutputError> {
        let format: OutputFormat = self.format.parse()?;
        if !format.is_supported() {
            return Err(OutputError::UnsupportedFormat(format.name().to_string()));
        }
        Ok(format)
    }
}

/// Naming options, as passed to [`OutputTarget::resolve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NameOptions<'a> {
    pub input: Option<&'a Path>,
    pub output: Option<&'a Path>,
    pub format: Option<&'a str>,
    pub extension: bool,
    pub files: bool,
    pub nofile: bool,
}

impl OutputTarget {
    /// Resolve input and output names before any frame is read.
    ///
    /// Names and the output format are settled first; the only filesystem
    /// access is the final check that the input exists.
    ///
    /// # Errors
    /// `FormatUnspecified` when an output is needed but neither the format
    /// nor the output extension names one, `UnsupportedFormat` when no sink
    /// exists for it, `InputNotFound` when the resolved input is not a file.
    pub fn resolve(options: NameOptions<'_>) -> Result<Self, OutputError> {
        let output = if options.nofile {
            None
        } else {
            let output = resolve_output(options)?;
            output.format()?;
            Some(output)
        };
        let input = resolve_input(options.input, options.extension);
        if !input.is_file() {
            return Err(OutputError::InputNotFound(input));
        }
        Ok(Self { input, output })
    }
}

fn resolve_input(input: Option<&Path>, extension: bool) -> PathBuf {
    match input {
        None => PathBuf::from(DEFAULT_INPUT),
        Some(path) if extension && !has_capture_extension(path) => {
            let mut name = path.as_os_str().to_owned();
            name.push(".pcap");
            PathBuf::from(name)
        }
        Some(path) => path.to_path_buf(),
    }
}

fn has_capture_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("pcap") | Some("pcapng")
    )
}

fn resolve_output(options: NameOptions<'_>) -> Result<ResolvedOutput, OutputError> {
    let requested = options.format.map(str::to_string);
    let Some(output) = options.output else {
        let format = requested.ok_or(OutputError::FormatUnspecified)?;
        let path = if options.files {
            PathBuf::from(DEFAULT_OUTPUT)
        } else {
            PathBuf::from(format!("{DEFAULT_OUTPUT}.{}", extension_for(&format)))
        };
        return Ok(ResolvedOutput {
            path,
            format,
            files: options.files,
        });
    };

    if let Some(ext) = output.extension().and_then(|ext| ext.to_str()) {
        let format = requested.unwrap_or_else(|| format_for_extension(ext));
        return Ok(ResolvedOutput {
            path: output.to_path_buf(),
            format,
            files: false,
        });
    }

    let format = requested.ok_or(OutputError::FormatUnspecified)?;
    let path = if options.files || !options.extension {
        output.to_path_buf()
    } else {
        let mut name = output.as_os_str().to_owned();
        name.push(".");
        name.push(extension_for(&format));
        PathBuf::from(name)
    };
    Ok(ResolvedOutput {
        path,
        format,
        files: options.files,
    })
}

/// File extension for a format name; unknown names are used as-is.
fn extension_for(format: &str) -> &str {
    match format.parse::<OutputFormat>() {
        Ok(format) => format.extension(),
        Err(_) => format,
    }
}

fn format_for_extension(ext: &str) -> String {
    match ext {
        "js" => "html".to_string(),
        "txt" => "tree".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{NameOptions, OutputTarget};
    use crate::output::OutputError;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn capture(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    fn with_input(input: &Path) -> NameOptions<'_> {
        NameOptions {
            input: Some(input),
            extension: true,
            ..NameOptions::default()
        }
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("missing.pcap");
        let err = OutputTarget::resolve(NameOptions {
            nofile: true,
            ..with_input(&input)
        })
        .unwrap_err();
        assert!(matches!(err, OutputError::InputNotFound(path) if path == input));
    }

    #[test]
    fn unsupported_format_is_rejected_before_the_input_is_checked() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("missing.pcap");
        let out = dir.path().join("report");
        for format in ["xml", "yaml"] {
            let err = OutputTarget::resolve(NameOptions {
                output: Some(&out),
                format: Some(format),
                ..with_input(&input)
            })
            .unwrap_err();
            assert!(matches!(err, OutputError::UnsupportedFormat(name) if name == format));
        }

        let out = dir.path().join("report.plist");
        let err = OutputTarget::resolve(NameOptions {
            output: Some(&out),
            ..with_input(&input)
        })
        .unwrap_err();
        assert!(matches!(err, OutputError::UnsupportedFormat(name) if name == "plist"));
        assert!(!out.exists());
    }

    #[test]
    fn pcap_suffix_is_appended_with_extension() {
        let dir = TempDir::new().unwrap();
        let file = capture(&dir, "trace.pcap");
        let stem = dir.path().join("trace");
        let target = OutputTarget::resolve(NameOptions {
            nofile: true,
            ..with_input(&stem)
        })
        .unwrap();
        assert_eq!(target.input, file);
        assert!(target.output.is_none());
    }

    #[test]
    fn pcapng_input_keeps_its_name() {
        let dir = TempDir::new().unwrap();
        let file = capture(&dir, "trace.pcapng");
        let target = OutputTarget::resolve(NameOptions {
            nofile: true,
            ..with_input(&file)
        })
        .unwrap();
        assert_eq!(target.input, file);
    }

    #[test]
    fn no_output_name_needs_a_format() {
        let dir = TempDir::new().unwrap();
        let file = capture(&dir, "a.pcap");
        let err = OutputTarget::resolve(with_input(&file)).unwrap_err();
        assert!(matches!(err, OutputError::FormatUnspecified));
    }

    #[test]
    fn default_output_uses_format_extension() {
        let dir = TempDir::new().unwrap();
        let file = capture(&dir, "a.pcap");
        let target = OutputTarget::resolve(NameOptions {
            format: Some("html"),
            ..with_input(&file)
        })
        .unwrap();
        let output = target.output.unwrap();
        assert_eq!(output.path, PathBuf::from("out.js"));
        assert!(!output.files);

        let target = OutputTarget::resolve(NameOptions {
            format: Some("tree"),
            files: true,
            ..with_input(&file)
        })
        .unwrap();
        let output = target.output.unwrap();
        assert_eq!(output.path, PathBuf::from("out"));
        assert!(output.files);
    }

    #[test]
    fn output_extension_selects_format_and_disables_files() {
        let dir = TempDir::new().unwrap();
        let file = capture(&dir, "a.pcap");
        let out = dir.path().join("report.json");
        let target = OutputTarget::resolve(NameOptions {
            output: Some(&out),
            files: true,
            ..with_input(&file)
        })
        .unwrap();
        let output = target.output.unwrap();
        assert_eq!(output.path, out);
        assert_eq!(output.format, "json");
        assert!(!output.files);

        let out = dir.path().join("report.txt");
        let target = OutputTarget::resolve(NameOptions {
            output: Some(&out),
            ..with_input(&file)
        })
        .unwrap();
        assert_eq!(target.output.unwrap().format, "tree");
    }

    #[test]
    fn bare_output_name_follows_flags() {
        let dir = TempDir::new().unwrap();
        let file = capture(&dir, "a.pcap");
        let out = dir.path().join("report");

        let err = OutputTarget::resolve(NameOptions {
            output: Some(&out),
            ..with_input(&file)
        })
        .unwrap_err();
        assert!(matches!(err, OutputError::FormatUnspecified));

        let target = OutputTarget::resolve(NameOptions {
            output: Some(&out),
            format: Some("json"),
            ..with_input(&file)
        })
        .unwrap();
        assert_eq!(target.output.unwrap().path, dir.path().join("report.json"));

        let target = OutputTarget::resolve(NameOptions {
            output: Some(&out),
            format: Some("json"),
            files: true,
            ..with_input(&file)
        })
        .unwrap();
        let output = target.output.unwrap();
        assert_eq!(output.path, out);
        assert!(output.files);

        let target = OutputTarget::resolve(NameOptions {
            output: Some(&out),
            format: Some("json"),
            extension: false,
            ..with_input(&file)
        })
        .unwrap();
        assert_eq!(target.output.unwrap().path, out);
    }
}
