//! Diffstat command - prints the directory summary the card would show

use anyhow::Context;
use prcard_core::diffstat::grouping_depth;
use prcard_core::{aggregate, DiffSummary};
use prcard_triggers::GitHubPlatform;

use crate::config::Settings;

pub async fn execute(settings: &Settings, repo: &str, number: u64) -> anyhow::Result<()> {
    let github = GitHubPlatform::new(settings.github.clone())?;
    let files = github
        .list_pull_request_files(repo, number)
        .await
        .with_context(|| format!("Failed to fetch files for {}#{}", repo, number))?;

    println!("{}#{}: {} files changed", repo, number, files.len());
    let summary = aggregate(&files);
    if let DiffSummary::Groups(entries) = &summary {
        println!(
            "{} groups at depth {}",
            entries.len(),
            grouping_depth(&files)
        );
    }
    println!("{}", summary);
    Ok(())
}
