// ABOUTME: Progress sinks for the command line: per-database bars or a silent counter
// ABOUTME: Bars are created lazily the first time a database reports status

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;

use crate::replication::{JobOutcome, JobRecord, ProgressSink, StatusEvent};

const BAR_TEMPLATE: &str = "{prefix:20} {bar:40} | {msg:10} | {percent:>3}%";

/// One progress bar per database.
pub struct BarSink {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: HashMap<String, ProgressBar>,
}

impl BarSink {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        Self {
            multi: MultiProgress::new(),
            style,
            bars: HashMap::new(),
        }
    }

    fn bar(&mut self, database: &str) -> &ProgressBar {
        let Self { multi, style, bars } = self;
        bars.entry(database.to_string()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            bar.set_prefix(database.to_string());
            bar.set_message("_");
            bar
        })
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn on_status(&mut self, event: &StatusEvent) {
        let bar = self.bar(&event.database_name);
        bar.set_position(percent_position(event.percent_complete));
        bar.set_message(event.state.to_string());
    }

    fn on_finished(&mut self, record: &JobRecord) {
        let status = &record.status;
        let bar = self.bar(&status.database_name);
        if record.is_error() {
            bar.set_message("error");
            bar.abandon();
        } else {
            if record.outcome == JobOutcome::Completed {
                bar.set_position(100);
            }
            bar.set_message(status.state.to_string());
            bar.finish();
        }
    }
}

fn percent_position(fraction: f64) -> u64 {
    (fraction * 100.0).floor().clamp(0.0, 100.0) as u64
}

/// Quiet mode: nothing is drawn, finished jobs are only counted.
#[derive(Debug, Default)]
pub struct CountingSink {
    pub updates: usize,
    pub finished: usize,
    pub failed: usize,
}

impl ProgressSink for CountingSink {
    fn on_status(&mut self, _event: &StatusEvent) {
        self.updates += 1;
    }

    fn on_finished(&mut self, record: &JobRecord) {
        self.finished += 1;
        if record.is_error() {
            self.failed += 1;
        }
    }
}
