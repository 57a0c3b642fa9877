use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Bar for a batch of bookmark moves or deletions, one tick per host call.
///
/// Draws to stderr, and not at all for an empty batch or a non-terminal.
pub fn batch_bar(total: u64, action: &str) -> ProgressBar {
    let target = if total == 0 {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stderr()
    };
    let pb = ProgressBar::with_draw_target(Some(total), target);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_message(format!("{} bookmarks", action));
    pb
}

pub fn finish_batch(pb: &ProgressBar, action: &str, done: usize) {
    pb.finish_with_message(format!("✅ {} {} bookmarks", action, done));
}

/// Leaves the bar where the batch stopped.
pub fn abandon_batch(pb: &ProgressBar, action: &str, done: usize) {
    pb.abandon_with_message(format!("❌ {} failed after {} bookmarks", action, done));
}
