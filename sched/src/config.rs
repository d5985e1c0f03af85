//! Command-line and environment configuration.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::error::{SchedError, SchedResult};
use crate::quantum::{Clamp, Quantum};

pub const QUANTUM_ENV: &str = "RRSCHED_QUANTUM_MSEC";
pub const MONITOR_ENV: &str = "RRSCHED_MONITOR";

#[derive(Debug, Clone)]
pub struct Config {
    pub quantum: Quantum,
    /// Set when the requested quantum was outside the allowed range
    pub clamp: Option<Clamp>,
    /// Workload file; stdin when absent
    pub workload: Option<PathBuf>,
    pub monitor: bool,
}

pub fn build_cli() -> Command {
    Command::new("rrsched")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Round-robin scheduler for a list of command lines")
        .arg(Arg::new("quantum")
            .help("Time quantum in milliseconds (clamped to 100..=1000, rounded to 100)")
            .short('q')
            .long("quantum")
            .value_name("MSEC")
            .env(QUANTUM_ENV))
        .arg(Arg::new("monitor")
            .help("Print /proc statistics each time a process is preempted")
            .short('m')
            .long("monitor")
            .env(MONITOR_ENV)
            .value_parser(FalseyValueParser::new())
            .action(ArgAction::SetTrue))
        .arg(Arg::new("workload")
            .help("File with one command line per line (default: stdin)")
            .value_name("WORKLOAD")
            .value_parser(clap::value_parser!(PathBuf))
            .index(1))
}

impl Config {
    pub fn from_matches(matches: &ArgMatches) -> SchedResult<Self> {
        let raw = matches
            .get_one::<String>("quantum")
            .ok_or(SchedError::QuantumMissing)?;
        let requested = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| SchedError::InvalidQuantum(raw.clone()))?;
        let (quantum, clamp) = Quantum::from_millis(requested);

        Ok(Self {
            quantum,
            clamp,
            workload: matches.get_one::<PathBuf>("workload").cloned(),
            monitor: matches.get_flag("monitor"),
        })
    }

    /// Parses an explicit argument list; clap usage errors are returned as is.
    pub fn try_from_args<I, T>(args: I) -> Result<SchedResult<Self>, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = build_cli().try_get_matches_from(args)?;
        Ok(Self::from_matches(&matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> SchedResult<Config> {
        Config::try_from_args(args.iter().copied()).expect("usage error")
    }

    #[test]
    fn test_quantum_flag_and_workload_path() {
        let config = parse(&["rrsched", "--quantum=300", "jobs.txt"]).unwrap();
        assert_eq!(config.quantum.millis(), 300);
        assert_eq!(config.quantum.ticks(), 15);
        assert_eq!(config.clamp, None);
        assert_eq!(config.workload, Some(PathBuf::from("jobs.txt")));
        assert!(!config.monitor);
    }

    #[test]
    fn test_short_flags() {
        let config = parse(&["rrsched", "-q", "50", "-m"]).unwrap();
        assert_eq!(config.quantum.millis(), 100);
        assert!(config.clamp.is_some());
        assert!(config.monitor);
        assert_eq!(config.workload, None);
    }

    #[test]
    fn test_non_numeric_quantum_is_rejected() {
        match parse(&["rrsched", "--quantum", "fast"]) {
            Err(SchedError::InvalidQuantum(raw)) => assert_eq!(raw, "fast"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_flag_is_a_usage_error() {
        assert!(Config::try_from_args(["rrsched", "--bogus"]).is_err());
    }
}
