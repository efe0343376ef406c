//! Self-identifying bot comments.
//!
//! Every body the bot posts ends with an invisible marker naming its
//! [`CommentKind`]; lead comments also carry a base64 JSON data block:
//!
//! ```text
//! <!-- relay:comment external-pr-welcome -->
//! <!-- relay:data eyJ0cmFja2VyIjp7...fQ== -->
//! ```
//!
//! Scanning existing comments for these markers is the only record of what
//! the bot has already said, so the markers must stay stable forever.

use std::fmt;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::{Deserialize, Serialize};

use relay_core::types::TrackerLink;

use crate::error::RenderError;

/// The comments the bot can leave on a contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    Welcome,
    WelcomeClosed,
    BlendedWelcome,
    NoContributions,
    NeedsCla,
    DraftNotice,
    Survey,
}

impl CommentKind {
    /// All kinds in a stable order.
    pub fn all() -> &'static [CommentKind] {
        &[
            CommentKind::Welcome,
            CommentKind::WelcomeClosed,
            CommentKind::BlendedWelcome,
            CommentKind::NoContributions,
            CommentKind::NeedsCla,
            CommentKind::DraftNotice,
            CommentKind::Survey,
        ]
    }

    /// The stable token embedded in the body.
    pub fn marker(self) -> &'static str {
        match self {
            CommentKind::Welcome => "external-pr-welcome",
            CommentKind::WelcomeClosed => "external-pr-welcome-closed",
            CommentKind::BlendedWelcome => "blended-pr-welcome",
            CommentKind::NoContributions => "no-contributions",
            CommentKind::NeedsCla => "needs-cla",
            CommentKind::DraftNotice => "draft-notice",
            CommentKind::Survey => "end-of-review-survey",
        }
    }

    pub fn from_marker(token: &str) -> Option<CommentKind> {
        CommentKind::all()
            .iter()
            .copied()
            .find(|kind| kind.marker() == token)
    }

    /// Lead comments are the first bot comment; they carry the tracker link
    /// and are edited in place rather than duplicated.
    pub fn is_lead(self) -> bool {
        matches!(
            self,
            CommentKind::Welcome
                | CommentKind::WelcomeClosed
                | CommentKind::BlendedWelcome
                | CommentKind::NoContributions
        )
    }

    /// Whether the bot deletes this comment once it is no longer wanted.
    /// Welcomes are permanent history.
    pub fn is_retractable(self) -> bool {
        matches!(
            self,
            CommentKind::NoContributions
                | CommentKind::NeedsCla
                | CommentKind::DraftNotice
                | CommentKind::Survey
        )
    }

    /// Embedded template rendered for this kind.
    pub fn template_name(self) -> &'static str {
        match self {
            CommentKind::Welcome => "welcome.md.tera",
            CommentKind::WelcomeClosed => "welcome_closed.md.tera",
            CommentKind::BlendedWelcome => "blended_welcome.md.tera",
            CommentKind::NoContributions => "no_contributions.md.tera",
            CommentKind::NeedsCla => "needs_cla.md.tera",
            CommentKind::DraftNotice => "draft_notice.md.tera",
            CommentKind::Survey => "survey.md.tera",
        }
    }
}

impl fmt::Display for CommentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// State recorded in the lead comment's data block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<TrackerLink>,
    #[serde(default)]
    pub draft: bool,
}

/// `<!-- relay:comment <token> -->`
pub fn marker_line(kind: CommentKind) -> String {
    format!("<!-- relay:comment {} -->", kind.marker())
}

/// `<!-- relay:data <base64 json> -->`
pub fn data_line(data: &CommentData) -> Result<String, RenderError> {
    let json = serde_json::to_vec(data)?;
    Ok(format!("<!-- relay:data {} -->", STANDARD.encode(json)))
}

/// The kind named by the first marker in `body`, if any.
pub fn parse_kind(body: &str) -> Option<CommentKind> {
    marker_regex()
        .captures_iter(body)
        .find_map(|caps| CommentKind::from_marker(&caps[1]))
}

/// The data block in `body`. Corrupt blocks read as absent.
pub fn parse_data(body: &str) -> Option<CommentData> {
    let caps = data_regex().captures(body)?;
    let raw = STANDARD.decode(&caps[1]).ok()?;
    serde_json::from_slice(&raw).ok()
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<!-- relay:comment ([a-z-]+) -->").expect("static marker regex")
    })
}

fn data_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<!-- relay:data ([A-Za-z0-9+/=]+) -->").expect("static data regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::types::{ServerNick, TrackerKey};

    #[test]
    fn markers_are_unique_and_parse_back() {
        let mut seen = std::collections::HashSet::new();
        for kind in CommentKind::all() {
            assert!(seen.insert(kind.marker()), "duplicate marker for {kind:?}");
            let body = format!("Hello!\n\n{}\n", marker_line(*kind));
            assert_eq!(parse_kind(&body), Some(*kind));
        }
    }

    #[test]
    fn closed_welcome_is_not_confused_with_welcome() {
        let body = marker_line(CommentKind::WelcomeClosed);
        assert_eq!(parse_kind(&body), Some(CommentKind::WelcomeClosed));
    }

    #[test]
    fn unknown_marker_tokens_are_ignored() {
        assert_eq!(parse_kind("<!-- relay:comment something-else -->"), None);
        assert_eq!(parse_kind("plain human comment"), None);
    }

    #[test]
    fn data_block_carries_tracker_link() {
        let data = CommentData {
            tracker: Some(TrackerLink {
                server: ServerNick::from("openedx"),
                key: TrackerKey::from("OSPR-77"),
            }),
            draft: true,
        };
        let body = format!("welcome\n{}\n", data_line(&data).expect("encode"));
        assert_eq!(parse_data(&body), Some(data));
    }

    #[test]
    fn corrupt_data_block_reads_as_absent() {
        assert_eq!(parse_data("<!-- relay:data bm90IGpzb24= -->"), None);
        assert_eq!(parse_data("no block here"), None);
    }

    #[test]
    fn lead_and_retractable_sets() {
        assert!(CommentKind::Welcome.is_lead());
        assert!(!CommentKind::Welcome.is_retractable());
        assert!(CommentKind::Survey.is_retractable());
        assert!(!CommentKind::Survey.is_lead());
        assert!(CommentKind::NoContributions.is_lead());
        assert!(CommentKind::NoContributions.is_retractable());
    }
}
