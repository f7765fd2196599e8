use std::io::Write;

use crate::cli::renderer::render_alert;
use crate::core::poller::PollObserver;

/// Delivers threshold alerts to the terminal (stderr, with a bell).
pub struct TerminalNotifier {
    use_color: bool,
}

impl TerminalNotifier {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    pub fn deliver(&self, percentage: u8) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "\x07{}", render_alert(percentage, self.use_color));
    }
}

impl PollObserver for TerminalNotifier {
    fn on_alert(&self, threshold: u8, percentage: u8) {
        tracing::debug!("Sending notification for {}% threshold", threshold);
        self.deliver(percentage);
    }
}
