//! Terminal progress bar for the transfer in flight.

use std::sync::{Mutex, PoisonError};

use bulkfetch_core::progress::{ProgressSink, ProgressUpdate};
use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

const BAR_TEMPLATE: &str =
    "{msg:30!} [{bar:40}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}";
const SPINNER_TEMPLATE: &str = "{spinner} {msg:30!} {bytes} {bytes_per_sec}";

/// Whether to draw progress at all.
pub(crate) fn should_show_progress(stderr_is_terminal: bool, quiet: bool) -> bool {
    stderr_is_terminal && !quiet
}

/// Draws one bar per transfer; only one transfer is ever in flight.
#[derive(Debug)]
pub(crate) struct ConsoleProgress {
    current: Mutex<Option<(Url, ProgressBar)>>,
}

impl ConsoleProgress {
    pub(crate) fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = current
            .as_ref()
            .is_none_or(|(url, bar)| url != &update.url || bar.length() != update.total_bytes);
        if stale {
            if let Some((_, old)) = current.take() {
                old.finish_and_clear();
            }
            *current = Some((update.url.clone(), new_bar(update)));
        }
        if let Some((_, bar)) = current.as_ref() {
            bar.set_position(update.bytes_transferred);
        }
    }

    fn on_finish(&self, update: &ProgressUpdate) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((url, bar)) = current.take() {
            if url == update.url {
                bar.set_position(update.bytes_transferred);
            }
            bar.finish_and_clear();
        }
    }
}

fn new_bar(update: &ProgressUpdate) -> ProgressBar {
    let bar = match update.total_bytes {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        }
    };
    bar.set_message(display_name(&update.url));
    bar
}

fn display_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map_or_else(|| url.to_string(), str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn update(bytes: u64, total: Option<u64>) -> ProgressUpdate {
        ProgressUpdate {
            url: Url::parse("https://data.example.org/dir/granule.h5").unwrap(),
            bytes_transferred: bytes,
            total_bytes: total,
        }
    }

    #[test]
    fn test_should_show_progress() {
        assert!(should_show_progress(true, false));
        assert!(!should_show_progress(false, false));
        assert!(!should_show_progress(true, true));
    }

    #[test]
    fn test_bar_tracks_position_and_clears_on_finish() {
        let progress = ConsoleProgress::new();
        progress.on_progress(&update(1000, Some(5000)));
        progress.on_progress(&update(3000, Some(5000)));
        {
            let current = progress.current.lock().unwrap();
            let (_, bar) = current.as_ref().unwrap();
            assert_eq!(bar.position(), 3000);
            assert_eq!(bar.length(), Some(5000));
        }
        progress.on_finish(&update(5000, Some(5000)));
        assert!(progress.current.lock().unwrap().is_none());
    }

    #[test]
    fn test_changed_total_replaces_bar() {
        let progress = ConsoleProgress::new();
        progress.on_progress(&update(1000, Some(5000)));
        progress.on_progress(&update(0, Some(6000)));
        let current = progress.current.lock().unwrap();
        assert_eq!(current.as_ref().unwrap().1.length(), Some(6000));
    }

    #[test]
    fn test_display_name_uses_last_segment() {
        assert_eq!(
            display_name(&Url::parse("https://data.example.org/a/b.zip").unwrap()),
            "b.zip"
        );
    }
}
