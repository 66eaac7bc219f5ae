use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde_json::Value;

use super::error::OutputError;
use super::{OutputFormat, Sink};

const JAVASCRIPT_PREFIX: &str = "var data = ";
const JAVASCRIPT_SUFFIX: &str = ";";
const TREE_INDENT: &str = "  ";

/// Box a single-document sink for `format` around `writer`.
pub(super) fn boxed_sink<W: Write + 'static>(format: OutputFormat, writer: W) -> Box<dyn Sink> {
    match format {
        OutputFormat::Tree => Box::new(TreeSink::new(writer)),
        OutputFormat::Html => Box::new(JsonSink::javascript(writer)),
        _ => Box::new(JsonSink::new(writer)),
    }
}

/// Streams records as members of one JSON object.
///
/// Each record is written as soon as it arrives; the closing brace is
/// written by [`Sink::finish`].
#[derive(Debug)]
pub struct JsonSink<W: Write> {
    writer: Option<W>,
    prefix: &'static str,
    suffix: &'static str,
    records: usize,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
            prefix: "",
            suffix: "",
            records: 0,
        }
    }

    /// JSON document assigned to a JavaScript variable, for HTML viewers.
    pub fn javascript(writer: W) -> Self {
        Self {
            prefix: JAVASCRIPT_PREFIX,
            suffix: JAVASCRIPT_SUFFIX,
            ..Self::new(writer)
        }
    }

    /// Consume the sink and return the underlying writer, if not finished.
    pub fn into_inner(self) -> Option<W> {
        self.writer
    }

    fn open(&mut self) -> Result<&mut W, OutputError> {
        let writer = self.writer.as_mut().ok_or(OutputError::Finished)?;
        if self.records == 0 {
            write!(writer, "{}{{", self.prefix)?;
        }
        Ok(writer)
    }
}

impl<W: Write> Sink for JsonSink<W> {
    fn record(&mut self, name: &str, value: &Value) -> Result<(), OutputError> {
        let first = self.records == 0;
        let writer = self.open()?;
        writer.write_all(if first { b"\n  " } else { b",\n  " })?;
        serde_json::to_writer(&mut *writer, name)?;
        writer.write_all(b": ")?;
        serde_json::to_writer(&mut *writer, value)?;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        if self.writer.is_none() {
            return Ok(());
        }
        let suffix = self.suffix;
        let writer = self.open()?;
        writeln!(writer, "\n}}{suffix}")?;
        writer.flush()?;
        self.writer = None;
        Ok(())
    }
}

/// Plain-text tree view, one block per record.
#[derive(Debug)]
pub struct TreeSink<W: Write> {
    writer: Option<W>,
    records: usize,
}

impl<W: Write> TreeSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
            records: 0,
        }
    }
}

impl<W: Write> Sink for TreeSink<W> {
    fn record(&mut self, name: &str, value: &Value) -> Result<(), OutputError> {
        let writer = self.writer.as_mut().ok_or(OutputError::Finished)?;
        if self.records > 0 {
            writeln!(writer)?;
        }
        match value {
            Value::Object(_) | Value::Array(_) => {
                writeln!(writer, "{name}")?;
                write_tree(writer, value, 1)?;
            }
            scalar => writeln!(writer, "{name}: {}", scalar_text(scalar))?,
        }
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

fn write_tree<W: Write>(writer: &mut W, value: &Value, depth: usize) -> Result<(), OutputError> {
    let children: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(idx, v)| (format!("[{idx}]"), v))
            .collect(),
        _ => Vec::new(),
    };
    let indent = TREE_INDENT.repeat(depth);
    for (key, child) in children {
        match child {
            Value::Object(_) | Value::Array(_) => {
                writeln!(writer, "{indent}|-- {key}")?;
                write_tree(writer, child, depth + 1)?;
            }
            scalar => writeln!(writer, "{indent}|-- {key}: {}", scalar_text(scalar))?,
        }
    }
    Ok(())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Writes every record to its own file, `<dir>/<name>.<ext>`.
#[derive(Debug)]
pub struct FilesSink {
    dir: PathBuf,
    format: OutputFormat,
    finished: bool,
}

impl FilesSink {
    /// `dir` must exist.
    pub fn new(dir: PathBuf, format: OutputFormat) -> Self {
        Self {
            dir,
            format,
            finished: false,
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{}", self.format.extension()))
    }
}

impl Sink for FilesSink {
    fn record(&mut self, name: &str, value: &Value) -> Result<(), OutputError> {
        if self.finished {
            return Err(OutputError::Finished);
        }
        let file = BufWriter::new(File::create(self.path_for(name))?);
        let mut sink = boxed_sink(self.format, file);
        sink.record(name, value)?;
        sink.finish()
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        self.finished = true;
        Ok(())
    }
}
