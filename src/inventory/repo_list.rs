use std::path::Path;

use indexmap::IndexMap;
use log::debug;

use crate::error::{MigrationError, Result};

/// Externally supplied `(org, team project, repo)` list that replaces
/// repository discovery, typically the `repos.csv` of an earlier inventory
/// report trimmed down by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoList {
    entries: IndexMap<String, IndexMap<String, Vec<String>>>,
}

impl RepoList {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let list = Self::parse(&contents)?;
        debug!(
            "Loaded {} repos from {}",
            list.repo_count(),
            path.display()
        );
        Ok(list)
    }

    /// Parses CSV text. The header row locates the `org`, `teamproject` and
    /// `repo` columns; other columns are ignored.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut lines = contents
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());

        let (header_line, header) = lines.next().ok_or(MigrationError::RepoList {
            line: 1,
            message: "file is empty".into(),
        })?;
        let header = split_csv_line(header, header_line)?;

        let org_col = find_column(&header, &["org"], header_line)?;
        let team_project_col = find_column(
            &header,
            &["teamproject", "team-project", "team_project"],
            header_line,
        )?;
        let repo_col = find_column(&header, &["repo"], header_line)?;

        let mut list = Self::default();

        for (line_number, line) in lines {
            let fields = split_csv_line(line, line_number)?;
            let field = |col: usize| {
                fields
                    .get(col)
                    .map(|f| f.trim())
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| MigrationError::RepoList {
                        line: line_number,
                        message: format!("expected a value in column {}", col + 1),
                    })
            };

            list.insert(field(org_col)?, field(team_project_col)?, field(repo_col)?);
        }

        Ok(list)
    }

    pub fn insert(&mut self, org: &str, team_project: &str, repo: &str) {
        let repos = self
            .entries
            .entry(org.to_owned())
            .or_default()
            .entry(team_project.to_owned())
            .or_default();

        if !repos.iter().any(|r| r == repo) {
            repos.push(repo.to_owned());
        }
    }

    pub fn orgs(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn team_projects(&self, org: &str) -> Vec<String> {
        self.entries
            .get(org)
            .map(|projects| projects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn repos(&self, org: &str, team_project: &str) -> Vec<String> {
        self.entries
            .get(org)
            .and_then(|projects| projects.get(team_project))
            .cloned()
            .unwrap_or_default()
    }

    pub fn repo_count(&self) -> usize {
        self.entries
            .values()
            .flat_map(IndexMap::values)
            .map(Vec::len)
            .sum()
    }
}

fn find_column(header: &[String], names: &[&str], line: usize) -> Result<usize> {
    header
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        .ok_or_else(|| MigrationError::RepoList {
            line,
            message: format!("missing '{}' column", names[0]),
        })
}

fn split_csv_line(line: &str, line_number: usize) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err(MigrationError::RepoList {
            line: line_number,
            message: "unterminated quoted field".into(),
        });
    }

    fields.push(current);
    Ok(fields)
}
