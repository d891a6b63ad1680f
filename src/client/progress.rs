use std::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{prefix}: [{bar:40.cyan/blue}] {percent}% | {msg} | Elapsed: {elapsed} | ETA: {eta}";

/// Progress over a known number of connection attempts.
pub struct ConnectProgress {
    bar: ProgressBar,
}

impl ConnectProgress {
    /// A hidden bar swallows every update, so callers never need to branch on `visible`.
    pub fn new(total: u64, description: &str, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(total)
        } else {
            ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden())
        };
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█░")
        );
        bar.set_prefix(description.to_owned());
        Self { bar }
    }

    pub fn update(&self, position: u64, status: impl Into<String>) {
        self.bar.set_position(position);
        self.bar.set_message(status.into());
    }

    pub fn finish(&self) {
        let total = self.bar.length().unwrap_or(0);
        self.bar.set_position(total);
        self.bar.finish_with_message("Complete");
    }
}

/// Indeterminate indicator shown while waiting on task and chat replies.
pub fn spinner(msg: impl Into<String>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} | Elapsed: {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    );
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
