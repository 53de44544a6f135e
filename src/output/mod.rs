mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold};
pub use summary::print_run_summary;
pub use tables::print_plan;

/// Prints the ado2gh banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🚚 ado2gh"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Azure DevOps to GitHub migrations")
    );
}
