use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

/// Spinners for the two phases of a parallel run.
pub struct PhaseProgress {
    pb: ProgressBar,
}

impl PhaseProgress {
    pub fn start_queueing(repo_count: usize) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        let pb = create_spinner(
            bright_yellow(format!("Phase 1/2: Queueing {repo_count} migrations")).to_string(),
        );
        Self { pb }
    }

    pub fn finish_queueing_start_waiting(self, queued: usize) -> Self {
        self.pb.finish_with_message(
            bright_green(format!("Phase 1/2: Queued {queued} migrations ✓")).to_string(),
        );
        let pb = create_spinner(
            bright_yellow("Phase 2/2: Waiting for migrations to finish").to_string(),
        );
        Self { pb }
    }

    pub fn finish_waiting(self) {
        self.pb
            .finish_with_message(bright_green("Phase 2/2: All migrations finished ✓").to_string());
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
