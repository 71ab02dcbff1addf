use indicatif::{ProgressBar, ProgressStyle};

/// A counter of processed entities, drawn as a bar on stderr unless disabled.
#[derive(Clone, Debug)]
pub struct Progress(ProgressBar);

impl Progress {
    pub fn new(label: &'static str, total: usize, visible: bool) -> Self {
        let total = total as u64;
        if !visible {
            let bar = ProgressBar::hidden();
            bar.set_length(total);
            return Self(bar);
        }

        let bar = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::with_template("{msg:>12} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(label);
        Self(bar)
    }

    pub fn inc(&self) {
        self.0.inc(1);
    }

    pub fn finish(&self) {
        self.0.finish();
    }
}
