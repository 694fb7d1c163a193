//! Resumption planning
//!
//! Two mechanisms let an interrupted harvest pick up where it stopped:
//! - the progress cursor's `current_letter` truncates the first-level list so
//!   letters before it are not revisited
//! - each discovered URL is checked against the crawl state store before it is
//!   dispatched, according to a [`ResumePolicy`]

use crate::state::{StatusKind, UrlStatus};
use crate::url::letter_segment;
use serde::Deserialize;

/// How stored URL statuses gate dispatch
///
/// Success is recorded by deleting a URL's entry, so the store can never hold
/// a positive "done" marker. `Literal` keeps the historical check anyway, which
/// means it dispatches everything; `AbsenceAsSuccess` reads a missing entry as
/// "done" and only re-dispatches recorded failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResumePolicy {
    /// Skip only URLs whose stored status is `success`
    #[default]
    Literal,

    /// Skip URLs with no stored entry; a retry-failures-only pass
    AbsenceAsSuccess,
}

/// Returns the first-level links starting at `current_letter`
///
/// The list starts at the first link whose letter segment equals the cursor.
/// Without a cursor, or when no link matches, the whole list is returned.
pub fn resume_from_letter<'a>(links: &'a [String], current_letter: Option<&str>) -> &'a [String] {
    let Some(letter) = current_letter.filter(|l| !l.is_empty()) else {
        return links;
    };

    match links
        .iter()
        .position(|link| letter_segment(link) == Some(letter))
    {
        Some(start) => {
            if start > 0 {
                tracing::info!("Resuming at letter '{}', skipping {} letters", letter, start);
            }
            &links[start..]
        }
        None => {
            tracing::warn!(
                "No first-level link matches saved letter '{}', starting from the beginning",
                letter
            );
            links
        }
    }
}

/// Decides whether a URL with the given stored status should be fetched
pub fn should_dispatch(stored: Option<&UrlStatus>, policy: ResumePolicy) -> bool {
    match policy {
        ResumePolicy::Literal => !stored.is_some_and(|s| s.status == StatusKind::Success),
        ResumePolicy::AbsenceAsSuccess => stored.is_some(),
    }
}
