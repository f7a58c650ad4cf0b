//! Status dashboard command.

use anyhow::{Context, Result};
use console::style;

use factbank_core::memory::embedder::Embedder;

use crate::state::AppState;

/// Display configuration and store status.
///
/// Shows the active backends, the stored memory count and the data directory.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let count = state
        .engine
        .count()
        .await
        .context("Failed to count stored memories")?;
    let config = &state.config;
    let embedder = state.engine.embedder();
    let settings = state.engine.settings();

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "memories": count,
            "store": {
                "backend": config.store.backend.to_string(),
                "table": config.store.table,
            },
            "embedding": {
                "provider": config.embedding.provider.to_string(),
                "model": embedder.model_name(),
                "dimension": embedder.dimension(),
            },
            "llm": {
                "provider": config.llm.provider.to_string(),
                "model": config.llm.model,
            },
            "search": {
                "top_k": settings.search.top_k,
                "threshold": settings.search.threshold,
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} factbank v{}",
        style("◆").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Store ──").dim());
    println!("  Backend:   {}", style(&config.store.backend).cyan());
    println!("  Table:     {}", config.store.table);
    println!("  Memories:  {}", style(count).bold());
    println!();

    println!("  {}", style("── Models ──").dim());
    println!(
        "  Embedding: {} {} ({}-dim)",
        style(&config.embedding.provider).cyan(),
        embedder.model_name(),
        embedder.dimension()
    );
    println!(
        "  LLM:       {} {}",
        style(&config.llm.provider).cyan(),
        config.llm.model
    );
    println!();

    println!("  {}", style("── Search ──").dim());
    println!("  Top k:     {}", settings.search.top_k);
    println!("  Threshold: {}", settings.search.threshold);
    println!();

    println!("  {}", style("── Storage ──").dim());
    println!("  Data dir:  {}", style(state.data_dir.display()).dim());
    println!();

    Ok(())
}
