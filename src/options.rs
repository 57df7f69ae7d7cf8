//! Parsing of the `-agentpath:<lib>=<options>` argument.
//!
//! The accepted form is `<path>,<port>[,<timeout-seconds>][,...]`. The path is
//! everything before the first comma, so it may not itself contain one.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Printed to stderr, line by line, when the option string is malformed.
pub const USAGE: [&str; 3] = [
    "Profiler Agent: -agentpath:<PATH>/profilerinterface should be called with two parameters:",
    "Profiler Agent: path to Profiler agent libraries and port number, separated by comma, for example:",
    "Profiler Agent: java -agentpath:/mypath/profilerinterface=/home/me/nb-profiler-server/profiler-ea-libs,5500",
];

const SEPARATOR: char = ',';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("expected '<path>,<port>', found no ',' separator")]
    MissingSeparator,

    #[error("the library path is empty")]
    EmptyPath,

    #[error("'{0}' is not a valid port number")]
    InvalidPort(String),
}

/// Configuration handed over by the host on the dynamic-attach entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOptions {
    /// Directory holding the profiler server libraries.
    pub library_path: PathBuf,
    /// Port the profiling server listens on.
    pub port: u16,
    /// How long to wait for the server, when given as the third field.
    pub connect_timeout: Option<Duration>,
    /// Any further fields, verbatim.
    pub extra: Vec<String>,
}

/// Whether `raw` has the shape of a full option string.
pub fn has_separator(raw: &str) -> bool {
    raw.contains(SEPARATOR)
}

impl AgentOptions {
    pub fn parse(raw: &str) -> Result<Self, OptionsError> {
        let (path, rest) = raw.split_once(SEPARATOR).ok_or(OptionsError::MissingSeparator)?;
        if path.is_empty() {
            return Err(OptionsError::EmptyPath);
        }

        let mut fields = rest.split(SEPARATOR);
        let port_field = fields.next().unwrap_or_default();
        let port = match port_field.trim().parse::<u16>() {
            Ok(0) | Err(_) => return Err(OptionsError::InvalidPort(port_field.to_string())),
            Ok(port) => port,
        };

        let mut extra: Vec<String> = fields.map(str::to_string).collect();
        let connect_timeout = match extra.first().and_then(|f| f.trim().parse::<u64>().ok()) {
            Some(secs) => {
                extra.remove(0);
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(AgentOptions {
            library_path: PathBuf::from(path),
            port,
            connect_timeout,
            extra,
        })
    }
}
