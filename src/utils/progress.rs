//! Progress bars for training, validation and test passes

use indicatif::{ProgressBar, ProgressStyle};

const PASS_TEMPLATE: &str =
    "{msg:>8} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({eta})";

/// A bar over the batches of one pass; hidden when `visible` is false
pub fn pass_bar(batches: usize, label: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(batches as u64);
    let style = ProgressStyle::default_bar()
        .template(PASS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    bar.set_style(style);
    bar.set_message(label.to_string());
    bar
}
