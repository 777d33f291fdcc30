//! Budgeted multi-source context assembly
//!
//! Builds the role-tagged message list for a completion call by merging
//! three history sources under one shared token budget:
//!
//! 1. the reply chain of the triggering message (oldest first),
//! 2. recent background chatter from the same channel,
//! 3. the actor's stored history and rolling summary.
//!
//! Budget is spent strictly in that order; whatever an earlier source
//! consumes is gone for later ones. A single de-duplication set spans
//! all sources so no line ever appears twice. The character-instruction
//! preamble and the two section separators are not charged against the
//! budget; every content line is.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, warn};
use serenity::builder::GetMessages;
use serenity::model::channel::Message;
use serenity::prelude::Context;
use std::collections::HashSet;

use super::{prompt, resolve_role_mentions};
use crate::core::config::Config;
use crate::core::response::compact_inline;
use crate::database::{Actor, Database};
use crate::features::completion::ChatMessage;

/// Separator introducing reply-chain and stored-history lines.
pub const PRIOR_MESSAGES_HEADER: &str = "Prior messages (oldest to newest):";
/// Separator introducing background-channel lines.
pub const BACKGROUND_HEADER: &str = "Background discussion (last 10 minutes, same channel):";

/// Estimated token cost of a line: one token per four characters, at
/// least one. Deliberately an approximation; every budget decision in
/// this module uses this same function so behavior stays deterministic.
pub fn approx_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

/// What to do with a candidate line that does not fit the remaining budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverBudget {
    /// Truncate the source there; later lines are not considered.
    Stop,
    /// Drop only that line and keep trying the rest.
    Skip,
}

/// Settings for one assembly pass. Derived from [`Config`] at startup.
#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub max_tokens: usize,
    pub max_history_messages: i64,
    pub max_history_age_seconds: i64,
    pub max_reply_chain: usize,
    pub background_window_seconds: i64,
    pub background_max_messages: usize,
    pub background_max_chars: usize,
}

impl ContextSettings {
    pub fn from_config(config: &Config) -> Self {
        ContextSettings {
            max_tokens: config.max_context_tokens,
            max_history_messages: config.max_history_messages,
            max_history_age_seconds: config.max_history_age_seconds,
            max_reply_chain: config.max_reply_chain,
            background_window_seconds: config.background_window_seconds,
            background_max_messages: config.background_max_messages,
            background_max_chars: config.background_max_chars,
        }
    }
}

/// A channel message reduced to what background selection needs.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub timestamp: i64,
    pub author: String,
    pub content: String,
}

/// Consume candidate lines against the shared budget and dedup set.
///
/// Lines already present in `seen` are skipped without cost. Lines that
/// fit are charged, recorded in `seen`, and returned as user-role
/// messages in input order.
pub fn spend_budget(
    lines: impl IntoIterator<Item = String>,
    budget: &mut usize,
    seen: &mut HashSet<String>,
    over_budget: OverBudget,
) -> Vec<ChatMessage> {
    let mut taken = Vec::new();
    for line in lines {
        if seen.contains(&line) {
            continue;
        }
        let cost = approx_tokens(&line);
        if cost > *budget {
            match over_budget {
                OverBudget::Stop => break,
                OverBudget::Skip => continue,
            }
        }
        *budget -= cost;
        seen.insert(line.clone());
        taken.push(ChatMessage::user(line));
    }
    taken
}

/// Pick the background window: messages within `window_seconds` before
/// `reference_ts`, keeping only the most recent `max_messages`, returned
/// oldest first.
pub fn select_background(
    messages: &[RawMessage],
    reference_ts: i64,
    window_seconds: i64,
    max_messages: usize,
) -> Vec<RawMessage> {
    let cutoff = reference_ts - window_seconds;
    let mut qualifying: Vec<RawMessage> = messages
        .iter()
        .filter(|m| m.timestamp >= cutoff && m.timestamp < reference_ts)
        .cloned()
        .collect();
    qualifying.sort_by_key(|m| m.timestamp);
    if qualifying.len() > max_messages {
        qualifying.drain(..qualifying.len() - max_messages);
    }
    qualifying
}

/// Render background messages into budget candidates, compacting each
/// to `max_chars`. Empty lines disappear here.
pub fn background_candidates(window: &[RawMessage], max_chars: usize) -> Vec<String> {
    window
        .iter()
        .filter_map(|m| {
            let compacted = compact_inline(&m.content, max_chars);
            if compacted.is_empty() {
                None
            } else {
                Some(format!("[background] {}: {}", m.author, compacted))
            }
        })
        .collect()
}

/// Fold the rolling summary and stored turns into the context.
///
/// The summary rides along as a single system line when it fits; stored
/// turn lines that would not fit are skipped individually rather than
/// cutting the source off, since they are not ordered by relevance the
/// way a reply chain is.
pub fn take_saved_lines(
    summary: Option<&str>,
    turn_lines: Vec<String>,
    budget: &mut usize,
    seen: &mut HashSet<String>,
) -> Vec<ChatMessage> {
    let mut taken = Vec::new();
    if let Some(summary) = summary {
        let line = format!("Summary so far: {summary}");
        let cost = approx_tokens(&line);
        if cost <= *budget {
            *budget -= cost;
            taken.push(ChatMessage::system(line));
        }
    }
    taken.extend(spend_budget(turn_lines, budget, seen, OverBudget::Skip));
    taken
}

/// Final ordering: character instructions, then prior messages (reply
/// chain before saved history) behind one separator, then background
/// behind another. Sections that contributed nothing get no separator.
pub fn assemble(
    system_prompt: String,
    chain: Vec<ChatMessage>,
    saved: Vec<ChatMessage>,
    background: Vec<ChatMessage>,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];
    if !chain.is_empty() || !saved.is_empty() {
        messages.push(ChatMessage::system(PRIOR_MESSAGES_HEADER));
        messages.extend(chain);
        messages.extend(saved);
    }
    if !background.is_empty() {
        messages.push(ChatMessage::system(BACKGROUND_HEADER));
        messages.extend(background);
    }
    messages
}

/// Assemble the full completion context for one actor and one
/// triggering message.
///
/// `chain` is the already-fetched reply chain, nearest reference first.
/// Background fetching is best-effort: a failed channel-history call is
/// logged and treated as an empty window, never as a hard failure.
pub async fn build_context(
    ctx: &Context,
    database: &Database,
    settings: &ContextSettings,
    actor: &Actor,
    msg: &Message,
    chain: &[Message],
) -> Result<Vec<ChatMessage>> {
    let mut budget = settings.max_tokens;
    let mut seen: HashSet<String> = HashSet::new();

    // 1. Reply chain, oldest first.
    let chain_lines: Vec<String> = chain
        .iter()
        .rev()
        .filter_map(|item| {
            let content = resolve_role_mentions(ctx, item);
            let content = content.trim();
            if content.is_empty() {
                None
            } else {
                Some(format!("{}: {}", item.author.name, content))
            }
        })
        .collect();
    let chain_messages = spend_budget(chain_lines, &mut budget, &mut seen, OverBudget::Stop);

    // 2. Background window from the same channel.
    let raw_background = fetch_background(ctx, msg, settings).await;
    let window = select_background(
        &raw_background,
        msg.timestamp.unix_timestamp(),
        settings.background_window_seconds,
        settings.background_max_messages,
    );
    let background_messages = spend_budget(
        background_candidates(&window, settings.background_max_chars),
        &mut budget,
        &mut seen,
        OverBudget::Stop,
    );

    // 3. Stored history, only with leftover budget.
    let saved_messages = if budget > 0 {
        let cutoff = (Utc::now() - ChronoDuration::seconds(settings.max_history_age_seconds))
            .to_rfc3339();
        let mut turns = database
            .recent_turns(actor.id, &cutoff, settings.max_history_messages)
            .await?;
        turns.reverse(); // newest-relevant set, presented oldest first
        let turn_lines: Vec<String> = turns
            .iter()
            .map(|t| format!("{}: {}", t.author_name, t.content))
            .collect();
        take_saved_lines(actor.summary.as_deref(), turn_lines, &mut budget, &mut seen)
    } else {
        Vec::new()
    };

    debug!(
        "Context for actor '{}': {} chain, {} background, {} saved lines, {} tokens left",
        actor.name,
        chain_messages.len(),
        background_messages.len(),
        saved_messages.len(),
        budget
    );

    Ok(assemble(
        prompt::build_system_prompt(actor),
        chain_messages,
        saved_messages,
        background_messages,
    ))
}

async fn fetch_background(
    ctx: &Context,
    msg: &Message,
    settings: &ContextSettings,
) -> Vec<RawMessage> {
    let fetch_limit = (settings.background_max_messages * 3).min(100) as u64;
    let fetched = msg
        .channel_id
        .messages(&ctx.http, |builder: &mut GetMessages| {
            builder.before(msg.id).limit(fetch_limit)
        })
        .await;
    match fetched {
        Ok(messages) => messages
            .iter()
            .map(|item| RawMessage {
                timestamp: item.timestamp.unix_timestamp(),
                author: item.author.name.clone(),
                content: resolve_role_mentions(ctx, item),
            })
            .collect(),
        Err(e) => {
            warn!("Failed loading background context: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::completion::ChatRole;

    fn line(n: usize, chars: usize) -> String {
        // deterministic line of an exact character length
        let body = "x".repeat(chars.saturating_sub(4));
        format!("u{n}: {body}")
    }

    #[test]
    fn test_approx_tokens_floor() {
        assert_eq!(approx_tokens(""), 1);
        assert_eq!(approx_tokens("abc"), 1);
        assert_eq!(approx_tokens("abcd"), 1);
        assert_eq!(approx_tokens(&"x".repeat(40)), 10);
    }

    #[test]
    fn test_spend_budget_never_exceeds() {
        let lines: Vec<String> = (0..50).map(|n| line(n, 40)).collect();
        let mut budget = 100;
        let mut seen = HashSet::new();
        let taken = spend_budget(lines, &mut budget, &mut seen, OverBudget::Stop);

        let spent: usize = taken.iter().map(|m| approx_tokens(&m.content)).sum();
        assert!(spent <= 100);
        assert_eq!(spent + budget, 100);
        assert_eq!(taken.len(), 10); // 10 tokens per 40-char line
    }

    #[test]
    fn test_spend_budget_stop_truncates_at_oversized_line() {
        let lines = vec![line(0, 8), line(1, 4000), line(2, 8)];
        let mut budget = 50;
        let mut seen = HashSet::new();
        let taken = spend_budget(lines, &mut budget, &mut seen, OverBudget::Stop);
        // the huge line stops the walk; the small line after it is lost
        assert_eq!(taken.len(), 1);
        assert!(taken[0].content.starts_with("u0:"));
    }

    #[test]
    fn test_spend_budget_skip_continues_past_oversized_line() {
        let lines = vec![line(0, 8), line(1, 4000), line(2, 8)];
        let mut budget = 50;
        let mut seen = HashSet::new();
        let taken = spend_budget(lines, &mut budget, &mut seen, OverBudget::Skip);
        assert_eq!(taken.len(), 2);
        assert!(taken[1].content.starts_with("u2:"));
    }

    #[test]
    fn test_spend_budget_dedups_across_calls() {
        let mut budget = 1000;
        let mut seen = HashSet::new();
        let first = spend_budget(
            vec!["alice: hi".to_string()],
            &mut budget,
            &mut seen,
            OverBudget::Stop,
        );
        let second = spend_budget(
            vec!["alice: hi".to_string(), "bob: yo".to_string()],
            &mut budget,
            &mut seen,
            OverBudget::Stop,
        );
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].content, "bob: yo");
    }

    #[test]
    fn test_select_background_most_recent_oldest_first() {
        // ten qualifying messages, newest-first as the API delivers them
        let messages: Vec<RawMessage> = (0..10)
            .map(|i| RawMessage {
                timestamp: 1000 - i * 10,
                author: format!("user{i}"),
                content: format!("message {i}"),
            })
            .collect();

        let window = select_background(&messages, 1001, 600, 8);
        assert_eq!(window.len(), 8);
        // oldest-first ordering of the most recent eight
        assert_eq!(window[0].content, "message 7");
        assert_eq!(window[7].content, "message 0");
    }

    #[test]
    fn test_select_background_window_cutoff() {
        let messages = vec![
            RawMessage {
                timestamp: 100, // too old
                author: "a".into(),
                content: "stale".into(),
            },
            RawMessage {
                timestamp: 950,
                author: "b".into(),
                content: "fresh".into(),
            },
            RawMessage {
                timestamp: 1002, // not before the trigger
                author: "c".into(),
                content: "later".into(),
            },
        ];
        let window = select_background(&messages, 1000, 600, 8);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].content, "fresh");
    }

    #[test]
    fn test_background_candidates_compact_and_drop_empty() {
        let window = vec![
            RawMessage {
                timestamp: 1,
                author: "alice".into(),
                content: "   ".into(),
            },
            RawMessage {
                timestamp: 2,
                author: "bob".into(),
                content: "w ".repeat(300),
            },
        ];
        let candidates = background_candidates(&window, 240);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].starts_with("[background] bob: "));
        assert!(candidates[0].chars().count() <= 240 + "[background] bob: ".chars().count());
    }

    #[test]
    fn test_take_saved_lines_summary_first_when_it_fits() {
        let mut budget = 100;
        let mut seen = HashSet::new();
        let taken = take_saved_lines(
            Some("Alice asked about spells."),
            vec!["alice: anything new?".to_string()],
            &mut budget,
            &mut seen,
        );
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].role, ChatRole::System);
        assert!(taken[0].content.starts_with("Summary so far: "));
        assert_eq!(taken[1].role, ChatRole::User);
    }

    #[test]
    fn test_take_saved_lines_summary_skipped_when_over_budget() {
        let mut budget = 2;
        let mut seen = HashSet::new();
        let taken = take_saved_lines(
            Some(&"long summary ".repeat(50)),
            vec!["hi: ok".to_string()],
            &mut budget,
            &mut seen,
        );
        // summary did not fit, the short turn line still did
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].content, "hi: ok");
    }

    #[test]
    fn test_assemble_separator_placement() {
        let messages = assemble(
            "instructions".to_string(),
            vec![ChatMessage::user("a: one")],
            vec![ChatMessage::user("b: two")],
            vec![ChatMessage::user("[background] c: three")],
        );
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "instructions",
                PRIOR_MESSAGES_HEADER,
                "a: one",
                "b: two",
                BACKGROUND_HEADER,
                "[background] c: three",
            ]
        );
    }

    #[test]
    fn test_assemble_omits_unused_separators() {
        let empty = assemble("instructions".to_string(), vec![], vec![], vec![]);
        assert_eq!(empty.len(), 1);

        let background_only = assemble(
            "instructions".to_string(),
            vec![],
            vec![],
            vec![ChatMessage::user("[background] c: three")],
        );
        let contents: Vec<&str> = background_only.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["instructions", BACKGROUND_HEADER, "[background] c: three"]
        );
    }

    #[test]
    fn test_no_duplicate_content_lines_across_sources() {
        let mut budget = 1000;
        let mut seen = HashSet::new();
        let chain = spend_budget(
            vec!["alice: hello".to_string()],
            &mut budget,
            &mut seen,
            OverBudget::Stop,
        );
        let background = spend_budget(
            vec!["[background] bob: noise".to_string()],
            &mut budget,
            &mut seen,
            OverBudget::Stop,
        );
        let saved = take_saved_lines(
            None,
            vec!["alice: hello".to_string(), "alice: again".to_string()],
            &mut budget,
            &mut seen,
        );

        let all = assemble("sys".to_string(), chain, saved, background);
        let mut content_lines: Vec<&str> = all
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .collect();
        let before = content_lines.len();
        content_lines.sort_unstable();
        content_lines.dedup();
        assert_eq!(before, content_lines.len());
        assert_eq!(before, 3);
    }
}
