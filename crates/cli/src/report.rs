//! Console presentation of run events.

use gitp4sync_core::report::{Event, Reporter};
use tracing::debug;

use crate::style;

/// Prints a colourised narrative of the run to stdout.
///
/// Mirror decisions and VCS commands are shown when `verbose` is set, and
/// always when they were skipped by a dry run.
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn detail(&self, line: String, applied: bool) {
        if applied {
            if self.verbose {
                println!("    {}", style::dim(&line));
            }
        } else {
            println!("    {} {}", style::dry_run_tag(), line);
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: &Event) {
        match event {
            Event::Mirror { action, applied } => self.detail(action.to_string(), *applied),
            Event::Command { vcs, command, applied } => {
                self.detail(format!("{} {}", vcs, command), *applied)
            }
            Event::Phase(phase) => debug!(%phase, "phase changed"),
            Event::NoChanges(range) => {
                println!(
                    "{}",
                    style::warn(&format!("No changes to mapped paths in range @{}", range))
                );
            }
            Event::Discovered(ids) => {
                let listed: Vec<String> = ids.iter().map(ToString::to_string).collect();
                println!(
                    "{}",
                    style::header(&format!("Found {} changelist(s): {}", ids.len(), listed.join(", ")))
                );
            }
            Event::Replaying(change) => {
                println!(
                    "  CL {} {}",
                    change.id,
                    style::dim(&format!(
                        "{} {}",
                        change.submit_time.format("%Y-%m-%d %H:%M:%S"),
                        change.user
                    ))
                );
            }
            Event::Committed(change) => {
                println!(
                    "  {}",
                    style::success(&format!("Committed CL {}: {}", change.id, change.summary()))
                );
            }
            Event::CommitFailed { change, detail } => {
                println!("  {}", style::error(&format!("Commit of CL {} failed", change)));
                for line in detail.lines() {
                    println!("    {}", style::dim(line));
                }
            }
        }
    }
}
