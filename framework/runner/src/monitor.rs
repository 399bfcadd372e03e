use std::thread::JoinHandle;

use anyhow::Context;
use crosswind_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// The share of the machine's CPU, in percent, above which the harness warns about itself.
const HIGH_CPU_PERCENT: f32 = 10.0;

/// Monitor the resource usage of the Crosswind process and report high usage.
///
/// Note that this won't stop the scenario proceeding, it will just log a warning to let the user
/// know that latencies may be inflated by the harness rather than the target.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] and checked.
/// If it is above 10% with respect to the number of cores then a warning is logged.
pub(crate) fn start_monitor(
    shutdown_listener: DelegatedShutdownListener,
) -> anyhow::Result<JoinHandle<()>> {
    std::thread::Builder::new()
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
                    log::debug!("Could not read process info, resource monitor stopping");
                    break;
                };

                let usage = (process.cpu_usage() / (cpu_count * 100) as f32) * 100.0;
                if usage > HIGH_CPU_PERCENT {
                    log::warn!(
                        "High CPU usage detected. Crosswind is using {:.2}% of the CPU, with {} available cores",
                        usage,
                        cpu_count
                    );
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        })
        .context("Failed to start monitor thread")
}
