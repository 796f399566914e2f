//! Terminal progress bar for item-by-item jobs.

use indicatif::{ProgressBar, ProgressStyle};
use stocksync_lib::Progress;

pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(message: &'static str) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(message);
        Self { bar }
    }
}

impl Progress for BarProgress {
    fn start(&self, total: u64) {
        self.bar.set_length(total);
    }

    fn advance(&self, symbol: &str) {
        self.bar.set_message(symbol.to_string());
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
