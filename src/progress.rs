//! Progress bars for long listings, bulk deletes and large uploads.

use indicatif::{ProgressBar, ProgressStyle};

/// Width of the bar between the brackets.
pub const BAR_WIDTH: usize = 60;

const TEMPLATE: &str = "{percent:>3}% [{bar:60}]";

/// `NNN% [|||   ]` with a [`BAR_WIDTH`] column bar.
pub fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("|| ")
}

/// Bar on stderr against `total`. An unknown total gives a hidden bar.
pub fn progress_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(total) => ProgressBar::new(total).with_style(progress_style()),
        None => ProgressBar::hidden(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::{InMemoryTerm, ProgressDrawTarget};
    use std::io::Read;

    fn drawn(total: u64, position: u64) -> String {
        let term = InMemoryTerm::new(4, 100);
        let bar = ProgressBar::with_draw_target(
            Some(total),
            ProgressDrawTarget::term_like(Box::new(term.clone())),
        )
        .with_style(progress_style());
        bar.set_position(position);
        bar.abandon();
        term.contents().trim_end().to_string()
    }

    #[test]
    fn test_render_bounds() {
        assert_eq!(drawn(10, 0), format!("  0% [{}]", " ".repeat(BAR_WIDTH)));
        assert_eq!(drawn(10, 10), format!("100% [{}]", "|".repeat(BAR_WIDTH)));
    }

    #[test]
    fn test_render_partial() {
        let line = drawn(100, 50);
        assert!(line.starts_with(" 50% ["), "{line}");
        assert!(line.ends_with(']'));
        let bar = &line[" 50% [".len()..line.len() - 1];
        assert_eq!(bar.chars().count(), BAR_WIDTH);
        assert!(bar.starts_with(&"|".repeat(30)));
        assert!(bar.ends_with(&" ".repeat(25)));
    }

    #[test]
    fn test_hidden_bar_tracks_reads() {
        let data = vec![7u8; 100];
        let bar = progress_bar(None);
        assert!(bar.is_hidden());
        let mut reader = bar.wrap_read(&data[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(bar.position(), 100);
    }

    #[test]
    fn test_known_total_sets_length() {
        let bar = progress_bar(Some(3));
        assert_eq!(bar.length(), Some(3));
    }
}
