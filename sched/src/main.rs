use log::{error, info, warn};

use rrsched::{
    config, launch, launch_all, workload, Config, EventSources, Monitor, Quantum, RunSummary,
    SchedError, SchedResult, Scheduler, SignalControl,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = config::build_cli().get_matches();

    let code = match Config::from_matches(&matches).and_then(|config| run(&config)) {
        Ok(summary) => {
            print_summary(&summary);
            0
        }
        Err(e) => {
            error!("{}", e);
            1
        }
    };

    std::process::exit(code);
}

fn run(config: &Config) -> SchedResult<RunSummary> {
    if let Some(clamp) = &config.clamp {
        warn!("{}", clamp);
    }
    info!("quantum {}", config.quantum);

    let mut entries = workload::load_from(config.workload.as_deref())?;
    if entries.is_empty() {
        info!("workload is empty, nothing to schedule");
        return Ok(RunSummary::default());
    }

    // Children must be forked before any helper thread exists
    launch_all(&mut entries, config.quantum)?;
    let pids: Vec<_> = entries.iter().filter_map(|e| e.pid()).collect();
    let pids_for_reaper = pids.clone();
    info!("launched {} processes", entries.len());

    let scheduler = match Scheduler::new(entries, SignalControl) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            launch::kill_pids(pids, &mut SignalControl);
            return Err(e);
        }
    };

    let (mut sources, events) = match EventSources::spawn(Quantum::tick_period(), pids_for_reaper) {
        Ok(spawned) => spawned,
        Err(e) => {
            let mut scheduler = scheduler;
            scheduler.abort();
            return Err(SchedError::EventSource(e));
        }
    };

    let result = if config.monitor {
        let mut scheduler = scheduler.with_monitor(Monitor::stdout());
        scheduler.run(&events)
    } else {
        let mut scheduler = scheduler;
        scheduler.run(&events)
    };

    sources.shutdown();
    result
}

fn print_summary(summary: &RunSummary) {
    for finished in &summary.processes {
        let status = match finished.status {
            Some(status) => status.to_string(),
            None => "unknown".to_string(),
        };
        info!(
            "  {} - {} ({}, {} grants)",
            finished.pid, finished.command, status, finished.grants
        );
    }
    info!(
        "{} processes, {} grants in total",
        summary.processes.len(),
        summary.total_grants()
    );
}
