//! Progress bars for the work queue.
//!
//! One bar per queue group. A reporter thread polls
//! [`WorkQueue::stats`] and moves the bars; nothing in the workers knows
//! about the terminal.

use crate::prompt;
use hoist_import::Console;
use hoist_queue::{GroupStats, WorkQueue};
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const BAR_TEMPLATE: &str = "[{elapsed_precise}] {prefix:>9.bold} {bar:30.blue} {pos}/{len} {msg}";

struct Reporter {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Terminal console: prompts on stdin/stdout, bars on stderr.
pub struct ProgressConsole {
    /// No bars at all
    quiet: bool,
    multi: MultiProgress,
    bars: Vec<(&'static str, ProgressBar)>,
    reporter: Option<Reporter>,
}

impl ProgressConsole {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            bars: Vec::new(),
            reporter: None,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }

    fn stop_reporter(&mut self) {
        if let Some(reporter) = self.reporter.take() {
            reporter.stop.store(true, Ordering::Relaxed);
            if reporter.handle.join().is_err() {
                tracing::debug!("progress reporter panicked");
            }
        }
    }
}

/// Move `bar` to reflect `stats`.
fn update(bar: &ProgressBar, stats: &GroupStats) {
    bar.set_position((stats.completed + stats.errored) as u64);
    let message = match stats.errored {
        0 => HumanBytes(stats.bytes).to_string(),
        errored => format!("{} ({errored} failed)", HumanBytes(stats.bytes)),
    };
    bar.set_message(message);
}

impl Console for ProgressConsole {
    fn confirm(&mut self, question: &str) -> bool {
        self.multi.suspend(|| prompt::confirm(question, None)).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not read answer");
            false
        })
    }

    fn started(&mut self, queue: Arc<WorkQueue>, totals: &[(&'static str, usize)]) {
        if self.quiet {
            return;
        }
        self.bars = totals
            .iter()
            .filter(|(_, total)| *total > 0)
            .map(|(group, total)| {
                let bar = self.multi.add(ProgressBar::new(*total as u64).with_style(Self::style()));
                bar.set_prefix(*group);
                (*group, bar)
            })
            .collect();

        let stop = Arc::new(AtomicBool::new(false));
        let bars = self.bars.clone();
        let flag = stop.clone();
        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                let stats = queue.stats();
                for (group, bar) in &bars {
                    if let Some(stats) = stats.get(group) {
                        update(bar, stats);
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        });
        self.reporter = Some(Reporter { stop, handle });
    }

    fn suspend(&mut self) {
        self.multi.set_draw_target(ProgressDrawTarget::hidden());
    }

    fn resume(&mut self) {
        if !self.quiet {
            self.multi.set_draw_target(ProgressDrawTarget::stderr());
        }
    }

    fn finished(&mut self) {
        self.stop_reporter();
        for (_, bar) in self.bars.drain(..) {
            bar.finish_and_clear();
        }
        if let Err(err) = self.multi.clear() {
            tracing::debug!(error = %err, "could not clear progress bars");
        }
    }
}

impl Drop for ProgressConsole {
    fn drop(&mut self) {
        self.stop_reporter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update() {
        let bar = ProgressBar::hidden();
        bar.set_length(10);
        let stats = GroupStats {
            waiting: 4,
            pending: 1,
            completed: 3,
            errored: 2,
            bytes: 2048,
        };
        update(&bar, &stats);
        assert_eq!(bar.position(), 5);
        assert_eq!(bar.message(), "2.00 KiB (2 failed)");
    }
}
