//! Summarization-based history compaction
//!
//! Keeps each actor's stored history bounded by folding the oldest
//! turns into the rolling summary once the turn count crosses a
//! threshold, then deleting exactly the summarized turns. Works like
//! log compaction for conversational memory: best-effort, asynchronous,
//! and invisible to users. A failed or empty summarization leaves the
//! batch in place for the next trigger.

use anyhow::Result;
use log::{debug, info, warn};

use super::prompt;
use crate::core::config::Config;
use crate::database::Database;
use crate::features::completion::{ChatMessage, CompletionBackend, CompletionReply};

#[derive(Debug, Clone)]
pub struct CompactionSettings {
    /// No-op while the stored turn count is at or below this.
    pub threshold: i64,
    /// How many of the oldest turns one pass folds into the summary.
    pub batch: i64,
    pub max_summary_tokens: usize,
}

impl CompactionSettings {
    pub fn from_config(config: &Config) -> Self {
        CompactionSettings {
            threshold: config.summary_compact_threshold,
            batch: config.summary_compact_batch,
            max_summary_tokens: config.max_summary_tokens,
        }
    }
}

/// Build the user-side summarization request: the existing summary (if
/// any) and the new batch, both labeled.
pub fn build_summary_request(existing_summary: Option<&str>, lines: &[String]) -> String {
    let mut request = String::new();
    if let Some(existing) = existing_summary {
        request.push_str(&format!("Existing summary:\n{existing}\n\n"));
    }
    request.push_str("New conversation lines:\n");
    request.push_str(&lines.join("\n"));
    request
}

/// Run one compaction pass for an actor.
///
/// Turns are deleted by identity, never by count, so a turn inserted
/// while the summarization call is in flight can never be swept out
/// with the batch.
pub async fn compact_history(
    database: &Database,
    completion: &dyn CompletionBackend,
    settings: &CompactionSettings,
    actor_id: i64,
) -> Result<()> {
    let count = database.turn_count(actor_id).await?;
    if count <= settings.threshold {
        return Ok(());
    }

    let batch = database.oldest_turns(actor_id, settings.batch).await?;
    if batch.is_empty() {
        return Ok(());
    }
    let batch_ids: Vec<i64> = batch.iter().map(|t| t.id).collect();
    let lines: Vec<String> = batch
        .iter()
        .map(|t| format!("{}: {}", t.author_name, t.content))
        .collect();

    let existing_summary = database
        .actor_by_id(actor_id)
        .await?
        .and_then(|a| a.summary);

    debug!(
        "Compacting {} of {count} stored turns for actor {actor_id}",
        batch.len()
    );

    let messages = vec![
        ChatMessage::system(prompt::build_summary_system_prompt(
            settings.max_summary_tokens,
        )),
        ChatMessage::user(build_summary_request(existing_summary.as_deref(), &lines)),
    ];

    let summary = match completion.complete(messages).await {
        Ok(CompletionReply::Text(text)) => text,
        Ok(CompletionReply::QuotaExhausted) => {
            warn!("Summary update skipped for actor {actor_id}: quota exhausted");
            return Ok(());
        }
        Err(e) => {
            warn!("Summary update skipped for actor {actor_id}: {e}");
            return Ok(());
        }
    };
    if summary.is_empty() {
        warn!("Summary update skipped for actor {actor_id}: empty digest");
        return Ok(());
    }

    database.set_summary(actor_id, &summary).await?;
    database.delete_turns(&batch_ids).await?;
    info!(
        "Compacted {} turns into the rolling summary for actor {actor_id}",
        batch_ids.len()
    );
    Ok(())
}
