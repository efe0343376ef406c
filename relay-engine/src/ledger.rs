//! Comment ledger: what the bot has already said on a contribution.
//!
//! Built by scanning the contribution's comments for ones the bot authored
//! that carry a marker. There is no other store.

use std::collections::BTreeMap;

use relay_core::types::{Comment, CommentId, TrackerLink};
use relay_renderer::{parse_data, parse_kind, CommentData, CommentKind};

/// One live bot comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: CommentId,
    pub kind: CommentKind,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommentLedger {
    entries: BTreeMap<CommentKind, LedgerEntry>,
    /// Extra comments of a kind already seen, oldest first.
    duplicates: Vec<LedgerEntry>,
    lead: Option<CommentKind>,
}

impl CommentLedger {
    /// Scan `comments` (in posting order) for marked comments by `bot_login`.
    pub fn scan(bot_login: &str, comments: &[Comment]) -> Self {
        let mut ledger = CommentLedger::default();
        for comment in comments {
            if !comment.author.eq_ignore_ascii_case(bot_login) {
                continue;
            }
            let Some(kind) = parse_kind(&comment.body) else {
                continue;
            };
            ledger.record(kind, comment.id.clone(), comment.body.clone());
        }
        ledger
    }

    pub fn has_comment(&self, kind: CommentKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn get(&self, kind: CommentKind) -> Option<&LedgerEntry> {
        self.entries.get(&kind)
    }

    /// Note a comment the bot has posted. A second comment of the same kind
    /// is kept as a duplicate, never as the live one.
    pub fn record(&mut self, kind: CommentKind, id: CommentId, body: String) {
        let entry = LedgerEntry { id, kind, body };
        if self.entries.contains_key(&kind) {
            self.duplicates.push(entry);
            return;
        }
        if kind.is_lead() && self.lead.is_none() {
            self.lead = Some(kind);
        }
        self.entries.insert(kind, entry);
    }

    /// The first lead comment, which carries the tracker link.
    pub fn lead(&self) -> Option<&LedgerEntry> {
        self.lead.and_then(|kind| self.entries.get(&kind))
    }

    pub fn lead_data(&self) -> Option<CommentData> {
        self.lead().and_then(|entry| parse_data(&entry.body))
    }

    /// The tracker link recorded in the lead comment.
    pub fn tracker_link(&self) -> Option<TrackerLink> {
        self.lead_data().and_then(|data| data.tracker)
    }

    pub fn duplicates(&self) -> &[LedgerEntry] {
        &self.duplicates
    }

    /// Live comments, in kind order.
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }
}
