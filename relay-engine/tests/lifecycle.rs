mod common;

use common::{contribution, set, Harness, BOT};
use relay_core::ports::TrackerPort;
use relay_core::types::{
    ContributionState, FieldChange, ServerNick, TrackerFields, TrackerKey, TrackerLink, TrackerRecord,
};
use relay_engine::{Category, ContributionAction, Operation, Phase, ReconcileError, Trigger};
use relay_renderer::marker::marker_line;
use relay_renderer::CommentKind;

fn merge(h: &Harness, id: &relay_core::types::ContributionId) {
    h.edit(id, |c| {
        c.state = ContributionState::Merged;
        c.closed_at = Some(c.updated_at);
    });
}

// ---------------------------------------------------------------------------
// Draft ↔ ready
// ---------------------------------------------------------------------------

#[test]
fn ready_for_review_moves_draft_status_to_triage() {
    let h = Harness::new();
    let id = h.add({
        let mut c = contribution("openedx/edx-platform", 10, "outsider", "Fix typo");
        c.draft = true;
        c
    });
    h.run(&id);
    assert_eq!(h.record(&id).expect("record").status, "Waiting on Author");
    assert_eq!(
        h.bot_comments(&id),
        vec![CommentKind::Welcome, CommentKind::DraftNotice]
    );

    h.edit(&id, |c| c.draft = false);
    let result = h.run_action(&id, ContributionAction::ReadyForReview);

    assert_eq!(result.phase, Phase::Open);
    assert_eq!(h.record(&id).expect("record").status, "Needs Triage");
    assert_eq!(h.bot_comments(&id), vec![CommentKind::Welcome]);
    assert!(h.run(&id).is_noop());
}

#[test]
fn ready_for_review_keeps_manual_progress() {
    let h = Harness::new();
    let id = h.add({
        let mut c = contribution("openedx/edx-platform", 11, "outsider", "Fix typo");
        c.draft = true;
        c
    });
    h.run(&id);
    let link = h.link(&id).expect("link");
    h.world.set_status(&link, "Architecture Review");

    h.edit(&id, |c| c.draft = false);
    let result = h.run_action(&id, ContributionAction::ReadyForReview);

    assert!(!result
        .planned
        .iter()
        .any(|op| matches!(op, Operation::TransitionStatus { .. })));
    assert_eq!(h.world.record(&link).expect("record").status, "Architecture Review");
    // The lead comment is rewritten for the new draft flag, not reposted.
    assert_eq!(h.world.count_writes("edit_comment"), 1);
    assert_eq!(h.bot_comments(&id), vec![CommentKind::Welcome]);
}

#[test]
fn converting_back_to_draft_only_replaces_engine_statuses() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 12, "outsider", "Fix typo"));
    h.run(&id);

    h.edit(&id, |c| c.draft = true);
    h.run_action(&id, ContributionAction::ConvertedToDraft);
    assert_eq!(h.record(&id).expect("record").status, "Waiting on Author");

    let link = h.link(&id).expect("link");
    h.world.set_status(&link, "In Review");
    h.edit(&id, |c| c.draft = false);
    h.run(&id);
    h.edit(&id, |c| c.draft = true);
    h.run(&id);
    assert_eq!(h.world.record(&link).expect("record").status, "In Review");
}

// ---------------------------------------------------------------------------
// Field updates
// ---------------------------------------------------------------------------

#[test]
fn edited_title_and_size_update_only_the_changed_fields() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 15, "outsider", "Fix typo"));
    h.run(&id);
    let link = h.link(&id).expect("link");

    h.edit(&id, |c| {
        c.title = "Fix two typos".to_string();
        c.additions = 25;
    });
    let result = h.run_action(&id, ContributionAction::Edited);

    assert_eq!(
        result.applied,
        vec![Operation::UpdateFields {
            link: link.clone(),
            changes: vec![
                FieldChange::Summary("Fix two typos".to_string()),
                FieldChange::LinesAdded(25),
            ],
            notify: true,
        }]
    );
    let record = h.world.record(&link).expect("record");
    assert_eq!(record.fields.summary, "Fix two typos");
    assert_eq!(record.fields.lines_added, 25);
    assert!(h.run(&id).is_noop());
}

#[test]
fn size_only_change_does_not_notify_watchers() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 16, "outsider", "Fix typo"));
    h.run(&id);

    h.edit(&id, |c| c.deletions = 7);
    let result = h.run(&id);

    assert!(matches!(
        result.applied.as_slice(),
        [Operation::UpdateFields { changes, notify: false, .. }]
            if *changes == vec![FieldChange::LinesRemoved(7)]
    ));
}

#[test]
fn record_description_points_back_at_the_contribution() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 17, "outsider", "Fix typo"));
    h.run(&id);

    assert_eq!(
        h.record(&id).expect("record").fields.description,
        "(From https://github.com/openedx/edx-platform/pull/17 by https://github.com/outsider)\n\
         ------\n\nPlease review."
    );

    h.edit(&id, |c| c.body = None);
    let result = h.run(&id);
    assert!(matches!(
        result.applied.as_slice(),
        [Operation::UpdateFields { changes, notify: true, .. }]
            if matches!(changes.as_slice(), [FieldChange::Description(d)] if d.ends_with("------\n\n"))
    ));
}

// ---------------------------------------------------------------------------
// Category changes
// ---------------------------------------------------------------------------

#[test]
fn becoming_blended_recreates_the_record() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 20, "outsider", "Fix typo"));
    h.run(&id);
    let old = h.link(&id).expect("link");
    assert_eq!(old.key.project(), "OSPR");

    h.edit(&id, |c| c.title = "[BD-42] Fix typo".to_string());
    let result = h.run_action(&id, ContributionAction::Edited);

    assert_eq!(result.category, Category::Blended);
    let create = result
        .applied
        .iter()
        .position(|op| matches!(op, Operation::CreateRecord { .. }));
    let delete = result
        .applied
        .iter()
        .position(|op| matches!(op, Operation::DeleteRecord { .. }));
    assert!(create.expect("created") < delete.expect("deleted"));
    assert!(h.world.record(&old).is_none());

    let new = h.record(&id).expect("new record");
    assert_eq!(new.project, "BLENDED");
    assert_eq!(new.labels, set(&["blended"]));
    assert_eq!(h.labels(&id), set(&["blended"]));
    assert_eq!(h.bot_comments(&id), vec![CommentKind::BlendedWelcome]);
    assert!(h.run(&id).is_noop());
}

#[test]
fn leaving_blended_recreates_the_record() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 21, "outsider", "[BD-42] add X"));
    h.run(&id);
    let old = h.link(&id).expect("link");

    h.edit(&id, |c| c.title = "add X".to_string());
    let result = h.run_action(&id, ContributionAction::Edited);

    assert_eq!(result.category, Category::RegularExternal);
    assert!(h.world.record(&old).is_none());
    let new = h.record(&id).expect("new record");
    assert_eq!(new.project, "OSPR");
    assert!(new.epic.is_none());
    assert_eq!(h.labels(&id), set(&["open-source-contribution"]));
    assert_eq!(h.bot_comments(&id), vec![CommentKind::Welcome]);
    assert!(h.run(&id).is_noop());
}

#[test]
fn failed_create_keeps_the_old_record() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 22, "outsider", "Fix typo"));
    h.run(&id);
    let old = h.link(&id).expect("link");

    h.world
        .fail("create_record", relay_core::error::RemoteErrorKind::Transient);
    h.edit(&id, |c| c.title = "[BD-42] Fix typo".to_string());
    let result = h.run(&id);

    assert_eq!(result.failed.len(), 1);
    assert!(result
        .skipped
        .iter()
        .any(|s| matches!(s.operation, Operation::DeleteRecord { .. })));
    assert!(h.world.record(&old).is_some());
    assert_eq!(h.link(&id), Some(old));
}

// ---------------------------------------------------------------------------
// Close, survey, reopen
// ---------------------------------------------------------------------------

#[test]
fn survey_is_posted_once_across_many_passes() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 30, "outsider", "Fix typo"));
    h.run(&id);
    merge(&h, &id);

    for _ in 0..5 {
        h.run(&id);
    }

    assert_eq!(
        h.bot_comments(&id),
        vec![CommentKind::Welcome, CommentKind::Survey]
    );
    assert_eq!(h.world.count_writes("post_comment"), 2);
}

#[test]
fn duplicate_survey_is_deleted() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 31, "outsider", "Fix typo"));
    h.run(&id);
    merge(&h, &id);
    h.run(&id);
    let stray = h.world.put_comment(&id, BOT, &marker_line(CommentKind::Survey));

    let result = h.run(&id);

    assert_eq!(
        result.applied,
        vec![Operation::DeleteComment {
            comment: stray,
            kind: CommentKind::Survey,
        }]
    );
    assert_eq!(
        h.bot_comments(&id),
        vec![CommentKind::Welcome, CommentKind::Survey]
    );
}

#[test]
fn closing_records_prior_status_and_mirrors_final_status() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 32, "outsider", "Fix typo"));
    h.run(&id);
    let link = h.link(&id).expect("link");
    h.world.set_status(&link, "In Review");

    merge(&h, &id);
    h.run_action(&id, ContributionAction::Closed);
    let record = h.world.record(&link).expect("record");
    assert_eq!(record.status, "In Review");
    assert_eq!(record.fields.prior_status.as_deref(), Some("In Review"));

    // Review staff close out the record.
    h.world.set_status(&link, "Merged");
    let result = h.run_trigger(&Trigger::TrackerStatusChanged { link: link.clone() }, false);

    assert_eq!(result.contribution, id);
    assert_eq!(h.labels(&id), set(&["open-source-contribution", "merged"]));
    let record = h.world.record(&link).expect("record");
    assert_eq!(record.fields.prior_status.as_deref(), Some("In Review"));
    assert!(h.run(&id).is_noop());
}

#[test]
fn reopening_restores_the_pre_close_status() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 33, "outsider", "Fix typo"));
    h.run(&id);
    let link = h.link(&id).expect("link");
    h.world.set_status(&link, "In Review");
    h.edit(&id, |c| c.state = ContributionState::Closed);
    h.run_action(&id, ContributionAction::Closed);
    h.world.set_status(&link, "Rejected");
    h.run_trigger(&Trigger::TrackerStatusChanged { link: link.clone() }, false);
    assert!(h.labels(&id).contains("rejected"));

    h.edit(&id, |c| c.state = ContributionState::Open);
    let result = h.run_action(&id, ContributionAction::Reopened);

    assert_eq!(result.phase, Phase::Reopened);
    let record = h.world.record(&link).expect("record");
    assert_eq!(record.status, "In Review");
    assert_eq!(record.fields.prior_status, None);
    assert_eq!(h.labels(&id), set(&["open-source-contribution"]));
    assert_eq!(h.bot_comments(&id), vec![CommentKind::Welcome]);
    assert!(h.run(&id).is_noop());
}

#[test]
fn failed_reopen_transition_keeps_prior_status() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 36, "outsider", "Fix typo"));
    h.run(&id);
    let link = h.link(&id).expect("link");
    h.world.set_status(&link, "In Review");
    h.edit(&id, |c| c.state = ContributionState::Closed);
    h.run_action(&id, ContributionAction::Closed);
    h.world.set_status(&link, "Rejected");

    h.world
        .fail("transition", relay_core::error::RemoteErrorKind::Transient);
    h.edit(&id, |c| c.state = ContributionState::Open);
    let result = h.run_action(&id, ContributionAction::Reopened);

    assert_eq!(result.failed.len(), 1);
    assert!(result.skipped.iter().any(|s| {
        s.reason == "status transition failed"
            && matches!(&s.operation, Operation::UpdateFields { changes, .. }
                if changes.contains(&FieldChange::PriorStatus(None)))
    }));
    let record = h.world.record(&link).expect("record");
    assert_eq!(record.status, "Rejected");
    assert_eq!(record.fields.prior_status.as_deref(), Some("In Review"));

    h.world.clear_failures();
    let result = h.run(&id);

    assert_eq!(result.phase, Phase::Reopened);
    assert!(!result.has_failures());
    let record = h.world.record(&link).expect("record");
    assert_eq!(record.status, "In Review");
    assert_eq!(record.fields.prior_status, None);
    assert!(h.run(&id).is_noop());
}

#[test]
fn reopen_missed_by_events_is_caught_by_rescan() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 34, "outsider", "Fix typo"));
    h.run(&id);
    let link = h.link(&id).expect("link");
    h.edit(&id, |c| c.state = ContributionState::Closed);
    h.run(&id);
    h.world.set_status(&link, "Rejected");

    h.edit(&id, |c| c.state = ContributionState::Open);
    let result = h.run(&id);

    assert_eq!(result.phase, Phase::Reopened);
    assert_eq!(h.world.record(&link).expect("record").status, "Needs Triage");
}

#[test]
fn closed_before_first_pass_gets_closed_welcome() {
    let h = Harness::new();
    let id = h.add({
        let mut c = contribution("openedx/edx-platform", 35, "outsider", "Fix typo");
        c.state = ContributionState::Merged;
        c.labels = set(&["open-source-contribution"]);
        c
    });

    h.run(&id);

    assert_eq!(
        h.bot_comments(&id),
        vec![CommentKind::WelcomeClosed, CommentKind::Survey]
    );
    let record = h.record(&id).expect("record");
    assert_eq!(record.fields.prior_status.as_deref(), Some("Needs Triage"));
    assert!(h.run(&id).is_noop());
}

// ---------------------------------------------------------------------------
// Broken links and tracker triggers
// ---------------------------------------------------------------------------

#[test]
fn deleted_record_is_recreated_and_relinked() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 40, "outsider", "Fix typo"));
    h.run(&id);
    let old = h.link(&id).expect("link");
    h.world.delete_record(&old).expect("delete");

    let result = h.run(&id);

    assert!(!result.has_failures());
    let new = h.link(&id).expect("relinked");
    assert_ne!(new, old);
    assert!(h.world.record(&new).is_some());
    assert_eq!(h.bot_comments(&id), vec![CommentKind::Welcome]);
    assert!(h.run(&id).is_noop());
}

#[test]
fn tracker_trigger_for_unlinked_record_is_an_error() {
    let h = Harness::new();
    let server = ServerNick::from("openedx");
    h.world.put_record(
        &server,
        TrackerRecord {
            key: TrackerKey::from("OSPR-900"),
            project: "OSPR".to_string(),
            issue_type: "Pull Request Review".to_string(),
            status: "Needs Triage".to_string(),
            labels: Default::default(),
            fields: TrackerFields::default(),
            epic: None,
        },
    );
    let trigger = Trigger::TrackerStatusChanged {
        link: TrackerLink {
            server,
            key: TrackerKey::from("OSPR-900"),
        },
    };

    let err = h.reconciler.reconcile(&trigger, false).unwrap_err();

    assert!(matches!(err, ReconcileError::UnlinkedRecord { .. }));
}

#[test]
fn unknown_repo_is_a_policy_conflict() {
    let h = Harness::new();
    let id = h.add(contribution("someone/else", 1, "outsider", "Fix typo"));

    let err = h.reconciler.reconcile(&Trigger::rescan(id), false).unwrap_err();

    assert!(matches!(err, ReconcileError::PolicyConflict { .. }));
    assert!(h.world.writes().is_empty());
}
