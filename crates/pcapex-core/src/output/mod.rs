//! Output sinks for extracted records.
//!
//! An extraction records the global header as `"Global Header"` and every
//! frame as `"Frame N"`. A [`Sink`] receives those records in order; single
//! file sinks stream them into one document, the files sink writes one
//! document per record into an output directory.

use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::str::FromStr;

use serde_json::Value;

pub mod error;
mod target;
mod writer;

pub use error::OutputError;
pub use target::{DEFAULT_INPUT, DEFAULT_OUTPUT, NameOptions, OutputTarget, ResolvedOutput};
pub use writer::{FilesSink, JsonSink, TreeSink};

/// Receiver of named records.
pub trait Sink {
    fn record(&mut self, name: &str, value: &Value) -> Result<(), OutputError>;

    /// Complete the document and flush it. Later records are rejected.
    fn finish(&mut self) -> Result<(), OutputError>;
}

/// Known output format names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Json,
    Tree,
    /// JSON embedded in a JavaScript assignment.
    Html,
    Plist,
    Xml,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Tree => "tree",
            OutputFormat::Html => "html",
            OutputFormat::Plist => "plist",
            OutputFormat::Xml => "xml",
        }
    }

    /// Extension of the files written in this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Html => "js",
            OutputFormat::Tree => "txt",
            other => other.name(),
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(
            self,
            OutputFormat::Json | OutputFormat::Tree | OutputFormat::Html
        )
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "tree" => Ok(OutputFormat::Tree),
            "html" => Ok(OutputFormat::Html),
            "plist" => Ok(OutputFormat::Plist),
            "xml" => Ok(OutputFormat::Xml),
            _ => Err(OutputError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Open the sink described by a resolved output.
///
/// # Errors
/// `UnsupportedFormat` for unknown names and for `plist`/`xml`; I/O errors
/// when the file or directory cannot be created.
pub fn create_sink(output: &ResolvedOutput) -> Result<Box<dyn Sink>, OutputError> {
    let format = output.format()?;
    if output.files {
        fs::create_dir_all(&output.path)?;
        return Ok(Box::new(FilesSink::new(output.path.clone(), format)));
    }
    if let Some(parent) = output.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = BufWriter::new(File::create(&output.path)?);
    Ok(writer::boxed_sink(format, file))
}

#[cfg(test)]
mod tests {
    use super::{OutputError, OutputFormat, ResolvedOutput, create_sink};
    use tempfile::TempDir;

    #[test]
    fn format_names_round_trip_through_extensions() {
        let format: OutputFormat = "HTML".parse().unwrap();
        assert_eq!(format, OutputFormat::Html);
        assert_eq!(format.extension(), "js");
        assert_eq!(OutputFormat::Tree.extension(), "txt");
        assert_eq!(OutputFormat::Json.extension(), "json");
    }

    #[test]
    fn plist_and_xml_are_rejected_when_opening() {
        let dir = TempDir::new().unwrap();
        for name in ["plist", "xml", "csv"] {
            let output = ResolvedOutput {
                path: dir.path().join(format!("out.{name}")),
                format: name.to_string(),
                files: false,
            };
            let err = create_sink(&output).err().unwrap();
            assert!(matches!(err, OutputError::UnsupportedFormat(_)));
            assert!(!output.path.exists());
        }
    }
}
