use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{create_cyan_header, create_table};
use crate::scheduler::RunReport;

/// Prints the outcome of a migration run to stdout.
///
/// Shows the per-repository counters, then any repos whose GitHub names
/// collided and the orgs whose pipelines could not be rewired.
pub fn print_run_summary(report: &RunReport) {
    println!("{}", render_run_summary(report));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_run_summary(report: &RunReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Migration Summary");

    let status = if report.is_success() {
        bright_green("completed")
    } else {
        bright_red("completed with failures")
    };

    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n",
        dim("Mode:"),
        cyan(report.mode),
        dim("Status:"),
        status,
        dim("Finished at:"),
        dim(report.collected_at.format("%Y-%m-%d %H:%M UTC")),
    );

    let mut counts = create_table();
    counts.set_header(create_cyan_header(&["Total", "Succeeded", "Failed", "Skipped"]));
    counts.add_row(vec![
        Cell::new(report.total_repositories),
        Cell::new(report.succeeded).fg(TableColor::Green),
        count_cell(report.failed, TableColor::Red),
        count_cell(report.skipped, TableColor::Yellow),
    ]);
    let _ = writeln!(output, "{counts}\n");

    if !report.duplicate_target_names.is_empty() {
        add_section_header(&mut output, "⚠️", "Duplicate GitHub Repo Names");

        let mut table = create_table();
        table.set_header(create_cyan_header(&["GitHub Repo", "Azure DevOps Repos"]));
        for duplicate in &report.duplicate_target_names {
            let sources: Vec<String> =
                duplicate.sources.iter().map(ToString::to_string).collect();
            table.add_row(vec![
                Cell::new(&duplicate.target_name),
                Cell::new(sources.join("\n")),
            ]);
        }
        let _ = writeln!(output, "{table}\n");
    }

    if !report.missing_credentials.is_empty() {
        add_section_header(&mut output, "🔌", "Pipelines Not Rewired");
        for org in &report.missing_credentials {
            let _ = writeln!(
                output,
                "  {} {}",
                bright_yellow(org),
                dim("has no GitHub service connection")
            );
        }
    }

    output
}

fn count_cell(count: usize, color: TableColor) -> Cell {
    if count == 0 {
        Cell::new(count)
    } else {
        Cell::new(count).fg(color)
    }
}
