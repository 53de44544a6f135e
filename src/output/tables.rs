use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use super::styling::{bright_yellow, dim};
use crate::steps::MigrationPlan;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Prints the ordered steps of `plan`, one row per team project and
/// repository.
pub fn print_plan(plan: &MigrationPlan, github_org: &str) {
    println!("{}", render_plan(plan, github_org));
}

fn render_plan(plan: &MigrationPlan, github_org: &str) -> String {
    let mut table = create_table();
    table.set_header(create_cyan_header(&["Azure DevOps", "GitHub", "Steps"]));

    for org in &plan.orgs {
        for project in &org.projects {
            if !project.setup.is_empty() {
                table.add_row(vec![
                    Cell::new(format!("{}/{}", org.name, project.name)),
                    Cell::new(github_org).fg(TableColor::DarkGrey),
                    Cell::new(numbered(project.setup.iter())),
                ]);
            }

            for repo in &project.repos {
                table.add_row(vec![
                    Cell::new(format!("{}/{}/{}", org.name, project.name, repo.name)),
                    Cell::new(format!("{github_org}/{}", repo.target_name)),
                    Cell::new(numbered(repo.steps.iter())),
                ]);
            }
        }
    }

    format!(
        "{table}\n{} {} {}",
        bright_yellow(plan.repo_count()),
        dim("repositories,"),
        dim(format!("{} steps", plan.step_count())),
    )
}

fn numbered<'a, T: std::fmt::Display + 'a>(steps: impl Iterator<Item = &'a T>) -> String {
    steps
        .enumerate()
        .map(|(i, step)| format!("{}. {step}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
