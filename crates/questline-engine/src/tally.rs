//! Deterministic vote tallying.
//!
//! The tally is a pure function of the persisted vote snapshot, so it can be
//! recomputed after a crash and must land on the same winner. Tie-break: the
//! option whose first vote was cast earliest wins; if that still ties, the
//! lowest option index wins.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use questline_core::config::VotePolicy;
use questline_core::error::EngineError;
use questline_core::vote::ChapterVote;
use tracing::debug;

/// Outcome of tallying one chapter's votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyResult {
    /// Index of the winning option.
    pub winning_option: usize,
    /// Votes counted per option index.
    pub vote_counts: Vec<u32>,
    /// Valid ballots counted.
    pub participation: usize,
}

/// Reduces the raw vote snapshot to countable ballots per the policy.
///
/// `AllBallots` passes the snapshot through; `LastPerUser` keeps only each
/// user's latest vote. Output order is by `voted_at`, which downstream
/// counting relies on for the earliest-first-vote tie-break.
#[must_use]
pub fn apply_vote_policy(policy: VotePolicy, mut votes: Vec<ChapterVote>) -> Vec<ChapterVote> {
    votes.sort_by_key(|vote| vote.voted_at);
    match policy {
        VotePolicy::AllBallots => votes,
        VotePolicy::LastPerUser => {
            let mut latest: HashMap<String, ChapterVote> = HashMap::new();
            for vote in votes {
                latest.insert(vote.user_id.clone(), vote);
            }
            let mut ballots: Vec<ChapterVote> = latest.into_values().collect();
            ballots.sort_by_key(|vote| vote.voted_at);
            ballots
        }
    }
}

/// Counts `ballots` against the ordered `options` list.
///
/// Ballots whose `selected_option` falls outside the option range are
/// discarded before counting. With zero valid ballots the configured
/// `default_option` wins (clamped into range) so the quest always advances.
///
/// # Errors
///
/// Returns `Validation` if `options` is empty; a chapter without options
/// cannot be tallied.
pub fn tally(
    options: &[String],
    ballots: &[ChapterVote],
    default_option: usize,
) -> Result<TallyResult, EngineError> {
    if options.is_empty() {
        return Err(EngineError::Validation(
            "cannot tally a chapter with no options".into(),
        ));
    }

    let mut vote_counts = vec![0u32; options.len()];
    let mut first_vote_at: Vec<Option<DateTime<Utc>>> = vec![None; options.len()];

    let mut ordered: Vec<&ChapterVote> = ballots.iter().collect();
    ordered.sort_by_key(|vote| vote.voted_at);

    for vote in ordered {
        let Ok(index) = usize::try_from(vote.selected_option) else {
            debug!(vote_id = %vote.id, selected = vote.selected_option, "discarding negative option index");
            continue;
        };
        if index >= options.len() {
            debug!(vote_id = %vote.id, selected = vote.selected_option, "discarding out-of-range vote");
            continue;
        }
        vote_counts[index] += 1;
        if first_vote_at[index].is_none() {
            first_vote_at[index] = Some(vote.voted_at);
        }
    }

    let participation: usize = vote_counts.iter().map(|&count| count as usize).sum();
    if participation == 0 {
        let fallback = if default_option < options.len() {
            default_option
        } else {
            0
        };
        return Ok(TallyResult {
            winning_option: fallback,
            vote_counts,
            participation: 0,
        });
    }

    let top_count = vote_counts.iter().copied().max().unwrap_or(0);
    let winning_option = (0..options.len())
        .filter(|&index| vote_counts[index] == top_count)
        .min_by_key(|&index| (first_vote_at[index], index))
        .ok_or_else(|| EngineError::Validation("tally produced no winner".into()))?;

    Ok(TallyResult {
        winning_option,
        vote_counts,
        participation,
    })
}
