use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::shutdown::DelegatedShutdownListener;

/// CPU share, with respect to every core, above which a warning is logged.
const HIGH_CPU_PERCENT: f32 = 80.0;

/// Monitor the resource usage of the harness process and report high usage.
///
/// Note that this won't stop the run, it just lets the user know that latencies might be inflated
/// by the load generator itself rather than the service under test.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] and checked.
pub(crate) fn start_monitor(shutdown_listener: DelegatedShutdownListener) {
    let spawned = std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len().max(1);

            loop {
                if shutdown_listener.should_shutdown() {
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[this_process_pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                let Some(process) = sys.process(this_process_pid) else {
                    log::debug!("Resource monitor cannot see its own process, stopping");
                    break;
                };

                let usage = process.cpu_usage() / cpu_count as f32;
                if usage > HIGH_CPU_PERCENT {
                    log::warn!(
                        "High CPU usage detected. Stampede is using {usage:.2}% of the CPU, with {cpu_count} available cores. Latencies may be inflated by the load generator"
                    );
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(std::time::Duration::from_secs(1)));
            }
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start resource monitor: {e}");
    }
}
