//! Memory CLI commands: add, search, list, get, delete.

use anyhow::{Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use factbank_types::memory::{ListOptions, Memory, MemoryId, SearchOptions};

use crate::state::AppState;

/// Reconcile `content` and print what changed.
///
/// # Examples
///
/// ```bash
/// factbank add "I moved to Lisbon last month"
/// ```
pub async fn add(state: &AppState, content: &str, json: bool) -> Result<()> {
    let changed = match state.engine.add(content).await {
        Ok(changed) => changed,
        Err(e) => {
            if e.is_partial() && !json {
                eprintln!(
                    "  {} {} action(s) were applied before the failure and remain in the store",
                    style("!").yellow().bold(),
                    e.applied().len()
                );
            }
            return Err(e).context("Failed to reconcile content");
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&changed)?);
        return Ok(());
    }

    println!();
    if changed.is_empty() {
        println!(
            "  {} Nothing new to remember.",
            style("i").blue().bold()
        );
    } else {
        for memory in &changed {
            let verb = if memory.updated_at.is_some() {
                style("updated").yellow()
            } else {
                style("added").green()
            };
            println!(
                "  {} {:<7} {}  {}",
                style("✓").green().bold(),
                verb,
                style(short_id(&memory.id)).dim(),
                memory.content
            );
        }
    }
    println!();
    Ok(())
}

/// Semantic search, closest first.
pub async fn search(
    state: &AppState,
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f32>,
    json: bool,
) -> Result<()> {
    let defaults = state.engine.settings().search;
    let options = SearchOptions {
        top_k: top_k.unwrap_or(defaults.top_k),
        threshold: threshold.unwrap_or(defaults.threshold),
    };

    let hits = state
        .engine
        .search_with(query, &options)
        .await
        .context("Search failed")?;

    if json {
        let out: Vec<_> = hits
            .into_iter()
            .map(|hit| {
                serde_json::json!({
                    "memory": Memory::from(hit.record),
                    "distance": hit.distance,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!();
        println!(
            "  {} No memories within distance {} of '{}'.",
            style("i").blue().bold(),
            options.threshold,
            style(query).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = new_table(&["Distance", "Memory", "Id"]);
    for hit in &hits {
        table.add_row(vec![
            Cell::new(format!("{:.3}", hit.distance)).fg(distance_color(hit.distance)),
            Cell::new(truncate(&hit.record.content, 70)).fg(Color::White),
            Cell::new(short_id(&hit.record.id)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// One page of memories ordered by id.
pub async fn list(
    state: &AppState,
    cursor: Option<String>,
    offset: usize,
    limit: usize,
    json: bool,
) -> Result<()> {
    let options = ListOptions {
        cursor: cursor.map(MemoryId::from),
        offset,
        limit,
    };
    let page = state.engine.list(&options).await.context("Failed to list memories")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.is_empty() {
        println!();
        println!(
            "  {} No memories yet. Add some with 'factbank add <text>'.",
            style("i").blue().bold()
        );
        println!();
        return Ok(());
    }

    let mut table = new_table(&["Id", "Memory", "Created", "Updated"]);
    for memory in &page {
        table.add_row(vec![
            Cell::new(memory.id.as_str()).fg(Color::DarkGrey),
            Cell::new(truncate(&memory.content, 60)).fg(Color::White),
            Cell::new(memory.created_at.format("%Y-%m-%d %H:%M").to_string())
                .fg(Color::DarkGrey),
            Cell::new(
                memory
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
            )
            .fg(Color::Yellow),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} memor{}",
        style(page.len()).bold(),
        if page.len() == 1 { "y" } else { "ies" }
    );
    if page.len() == limit {
        if let Some(last) = page.last() {
            println!(
                "  {}",
                style(format!("More: factbank list --cursor {}", last.id)).dim()
            );
        }
    }
    println!();
    Ok(())
}

/// Show a single memory in full.
pub async fn get(state: &AppState, id: &str, json: bool) -> Result<()> {
    let memory = state
        .engine
        .get(&MemoryId::from(id))
        .await?
        .with_context(|| format!("Memory '{id}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&memory)?);
        return Ok(());
    }

    println!();
    println!("  {}", style(&memory.content).bold());
    println!();
    println!("  {}  {}", style("Id:     ").dim(), memory.id);
    println!(
        "  {}  {}",
        style("Created:").dim(),
        memory.created_at.to_rfc3339()
    );
    if let Some(updated) = memory.updated_at {
        println!("  {}  {}", style("Updated:").dim(), updated.to_rfc3339());
    }
    if !memory.metadata.is_empty() {
        println!(
            "  {}  {}",
            style("Metadata:").dim(),
            serde_json::Value::Object(memory.metadata.clone())
        );
    }
    println!();
    Ok(())
}

/// Delete a memory. Deleting an unknown id is not an error.
pub async fn delete(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id = MemoryId::from(id);
    state
        .engine
        .delete(&id)
        .await
        .with_context(|| format!("Failed to delete memory '{id}'"))?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!();
        println!("  {} Deleted {}", style("✓").green().bold(), style(&id).dim());
        println!();
    }
    Ok(())
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::White))
            .collect::<Vec<_>>(),
    );
    table
}

fn distance_color(distance: f32) -> Color {
    if distance < 0.2 {
        Color::Green
    } else if distance < 0.4 {
        Color::Yellow
    } else {
        Color::DarkGrey
    }
}

/// First 8 characters of an id, for compact display.
fn short_id(id: &MemoryId) -> String {
    id.as_str().chars().take(8).collect()
}

/// Truncate on a character boundary, appending "..." when shortened.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
