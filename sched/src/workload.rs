//! Workload loading: one command line per text line, blank lines ignored.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use log::debug;

use crate::error::{SchedError, SchedResult};
use crate::process::ProcessEntry;

/// Reads entries from any buffered source.
pub fn load<R: BufRead>(reader: R) -> io::Result<Vec<ProcessEntry>> {
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(entry) = ProcessEntry::from_command_line(&line) {
            debug!("workload[{}]: {}", entries.len(), entry.command_line());
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Loads from `path`, or from stdin when no path is given.
pub fn load_from(path: Option<&Path>) -> SchedResult<Vec<ProcessEntry>> {
    let source: Box<dyn Read> = match path {
        Some(p) => Box::new(File::open(p).map_err(|source| SchedError::Workload {
            path: Some(p.to_path_buf()),
            source,
        })?),
        None => Box::new(io::stdin()),
    };
    load(BufReader::new(source)).map_err(|source| SchedError::Workload {
        path: path.map(Path::to_path_buf),
        source,
    })
}
