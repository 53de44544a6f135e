mod client;
mod provider;
mod queries;
mod types;


pub use provider::GitHubProvider;
