use anyhow::Result;

use crate::config::AppConfig;
use crate::service::note::SearchRequest;

/// Run a one-off semantic search from the terminal.
pub async fn search(
    config: AppConfig,
    project_id: &str,
    group_id: Option<String>,
    top_k: Option<usize>,
    query: &str,
) -> Result<()> {
    let services = crate::server::build_services(config)?;

    let response = services
        .notes
        .search(SearchRequest {
            project_id: project_id.to_string(),
            group_id,
            query: query.to_string(),
            top_k,
            ..Default::default()
        })
        .await?;

    if response.results.is_empty() {
        println!("No results found in namespace {}.", response.namespace);
        return Ok(());
    }

    println!(
        "Found {} result(s) in namespace {}\n",
        response.results.len(),
        response.namespace
    );

    for (i, hit) in response.results.iter().enumerate() {
        let note = &hit.note;
        println!(
            "  {}. [{}] {} (score: {:.4})",
            i + 1,
            note.group_id,
            note.id,
            hit.score,
        );
        if let Some(title) = &note.title {
            println!("     {title}");
        }
        println!("     {}", super::preview(&note.text, 120));
        if !note.tags.is_empty() {
            println!("     tags: {}", note.tags.join(", "));
        }
        println!();
    }

    Ok(())
}
