use clap::{Arg, ArgMatches, Command};
use log::{debug, error, info};
use std::io;
use std::time::{Duration, Instant};

/// Consumed CPU time between two progress lines
const REPORT_EVERY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct BurnConfig {
    budget: Duration,
    label: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("rrsched-burn")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Burns a fixed amount of CPU time, reporting progress as it goes")
        .arg(Arg::new("millis")
            .help("CPU time to consume in milliseconds")
            .short('n')
            .long("millis")
            .value_name("MSEC")
            .value_parser(clap::value_parser!(u64))
            .default_value("2000"))
        .arg(Arg::new("label")
            .help("Name printed on every progress line")
            .short('l')
            .long("label")
            .value_name("NAME")
            .default_value("burn"))
        .get_matches();

    let config = config_from(&matches);
    let code = match burn(&config) {
        Ok(wall) => {
            info!("{}: done after {:?} wall clock", config.label, wall);
            0
        }
        Err(e) => {
            error!("{}: cannot read CPU clock: {}", config.label, e);
            1
        }
    };
    std::process::exit(code);
}

fn config_from(matches: &ArgMatches) -> BurnConfig {
    BurnConfig {
        budget: Duration::from_millis(matches.get_one::<u64>("millis").copied().unwrap_or(2000)),
        label: matches
            .get_one::<String>("label")
            .cloned()
            .unwrap_or_else(|| "burn".to_string()),
    }
}

/// CPU time consumed by this process. Time spent stopped does not count.
fn cpu_time() -> io::Result<Duration> {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    if unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &mut ts) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
}

fn percent(used: Duration, budget: Duration) -> u128 {
    if budget.is_zero() {
        return 100;
    }
    (used.as_micros() * 100 / budget.as_micros()).min(100)
}

/// Spins until `budget` of CPU time is used. Returns the wall-clock time taken.
fn burn(config: &BurnConfig) -> io::Result<Duration> {
    let wall = Instant::now();
    let origin = cpu_time()?;
    let mut next_report = REPORT_EVERY;
    let mut spins: u64 = 0;

    debug!("{}: burning {:?} of CPU", config.label, config.budget);
    loop {
        for _ in 0..10_000 {
            spins = std::hint::black_box(spins.wrapping_add(1));
        }
        let used = cpu_time()?.saturating_sub(origin);
        if used >= config.budget {
            break;
        }
        if used >= next_report {
            println!(
                "{:<10} {:>6}ms cpu {:>6}ms wall {:>3}%",
                config.label,
                used.as_millis(),
                wall.elapsed().as_millis(),
                percent(used, config.budget)
            );
            next_report += REPORT_EVERY;
        }
    }
    println!("{:<10} finished", config.label);
    Ok(wall.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_time_is_monotonic() {
        let a = cpu_time().unwrap();
        let b = cpu_time().unwrap();
        assert!(b >= a);
    }

    #[test]
    fn test_percent_is_capped() {
        let budget = Duration::from_millis(2000);
        assert_eq!(percent(Duration::from_millis(500), budget), 25);
        assert_eq!(percent(Duration::from_millis(2500), budget), 100);
        assert_eq!(percent(Duration::ZERO, Duration::ZERO), 100);
    }

    #[test]
    fn test_burn_consumes_at_least_its_budget() {
        let config = BurnConfig {
            budget: Duration::from_millis(30),
            label: "test".to_string(),
        };
        let before = cpu_time().unwrap();
        burn(&config).unwrap();
        assert!(cpu_time().unwrap() - before >= config.budget);
    }
}
