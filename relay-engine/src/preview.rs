//! Dry-run comment preview: the bodies a plan would post, edit or delete,
//! as unified diffs against what is there now.

use std::fmt;

use similar::TextDiff;

use relay_core::types::{CommentId, TrackerLink};
use relay_renderer::{CommentKind, CommentRenderer, RenderError};

use crate::apply::render_comment;
use crate::pipeline::PlannedPass;
use crate::plan::{placeholder_key, Operation, RecordRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAction {
    Post,
    Edit,
    Delete,
}

impl fmt::Display for CommentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentAction::Post => write!(f, "post"),
            CommentAction::Edit => write!(f, "edit"),
            CommentAction::Delete => write!(f, "delete"),
        }
    }
}

/// One comment change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPreview {
    pub kind: CommentKind,
    pub action: CommentAction,
    pub unified_diff: String,
}

/// Render every comment change in `pass`. Nothing is written.
///
/// A record the plan would create is shown under a placeholder key.
pub fn preview_comments(
    pass: &PlannedPass,
    renderer: &CommentRenderer,
) -> Result<Vec<CommentPreview>, RenderError> {
    let observed = &pass.observed;
    let pending = pass.plan.operations.iter().find_map(|op| match op {
        Operation::CreateRecord { server, record } => Some(TrackerLink {
            server: server.clone(),
            key: placeholder_key(&record.project),
        }),
        _ => None,
    });
    let live = pending.clone().or_else(|| observed.tracker.link().cloned());
    let resolve = |tracker: &Option<RecordRef>| match tracker {
        Some(RecordRef::Existing(link)) => Some(link.clone()),
        Some(RecordRef::Created) => pending.clone(),
        None => None,
    };
    let current = |comment: &CommentId| {
        observed
            .ledger
            .entries()
            .chain(observed.ledger.duplicates())
            .find(|e| &e.id == comment)
            .map(|e| e.body.clone())
            .unwrap_or_default()
    };

    let mut previews = Vec::new();
    for op in &pass.plan.operations {
        let (kind, action, old, new) = match op {
            Operation::PostComment {
                kind,
                tracker,
                draft,
            } => {
                let link = if kind.is_lead() { resolve(tracker) } else { live.clone() };
                let body =
                    render_comment(renderer, observed, &pass.policy, *kind, link.as_ref(), *draft)?;
                (*kind, CommentAction::Post, String::new(), body)
            }
            Operation::EditComment {
                comment,
                kind,
                tracker,
                draft,
            } => {
                let link = resolve(tracker);
                let body =
                    render_comment(renderer, observed, &pass.policy, *kind, link.as_ref(), *draft)?;
                (*kind, CommentAction::Edit, current(comment), body)
            }
            Operation::DeleteComment { comment, kind } => {
                (*kind, CommentAction::Delete, current(comment), String::new())
            }
            _ => continue,
        };
        let old_header = format!("a/{kind}");
        let new_header = format!("b/{kind}");
        let unified_diff = TextDiff::from_lines(&old, &new)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();
        previews.push(CommentPreview {
            kind,
            action,
            unified_diff,
        });
    }
    Ok(previews)
}
