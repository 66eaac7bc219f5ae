use std::path::PathBuf;

use serde::Deserialize;

use crate::output::NameOptions;

/// Extraction settings.
///
/// The default stores frames, appends missing file extensions and enables
/// nothing else. Without `nofile`, an output `format` (or an output name with
/// an extension) is required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractorOptions {
    /// Keep every frame in memory.
    pub store: bool,
    /// Shorthand for `ipv4` and `ipv6`.
    pub ip: bool,
    pub ipv4: bool,
    pub ipv6: bool,
    pub tcp: bool,
    /// Cut incomplete reassembled data at its first hole.
    pub strict: bool,
    pub trace: bool,
    /// Log one `info` event per frame.
    pub verbose: bool,
    pub output: Option<PathBuf>,
    pub format: Option<String>,
    pub extension: bool,
    /// Write one file per record into the output directory.
    pub files: bool,
    /// Do not write any output.
    pub nofile: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            store: true,
            ip: false,
            ipv4: false,
            ipv6: false,
            tcp: false,
            strict: false,
            trace: false,
            verbose: false,
            output: None,
            format: None,
            extension: true,
            files: false,
            nofile: false,
        }
    }
}

impl ExtractorOptions {
    pub fn ipv4_enabled(&self) -> bool {
        self.ip || self.ipv4
    }

    pub fn ipv6_enabled(&self) -> bool {
        self.ip || self.ipv6
    }

    pub fn tcp_enabled(&self) -> bool {
        self.tcp
    }

    /// Naming options for `input`, as resolved by [`OutputTarget::resolve`].
    ///
    /// [`OutputTarget::resolve`]: crate::OutputTarget::resolve
    pub fn names<'a>(&'a self, input: &'a std::path::Path) -> NameOptions<'a> {
        NameOptions {
            input: Some(input),
            output: self.output.as_deref(),
            format: self.format.as_deref(),
            extension: self.extension,
            files: self.files,
            nofile: self.nofile,
        }
    }
}
