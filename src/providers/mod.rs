//! Azure DevOps and GitHub implementations of the platform traits.

mod ado;
mod github;
mod http;

pub use ado::AdoProvider;
pub use github::GitHubProvider;
