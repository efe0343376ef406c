mod common;

use common::{contribution, set, Harness};
use relay_core::error::RemoteErrorKind;
use relay_engine::{preview_comments, CommentAction, FailureKind, Operation, Trigger};
use relay_renderer::CommentKind;

#[test]
fn one_failed_operation_does_not_stop_the_rest() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 50, "outsider", "Fix typo"));
    h.world.fail("add_labels", RemoteErrorKind::PermissionDenied);

    let result = h.run(&id);

    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].kind, FailureKind::PermissionDenied);
    assert!(matches!(
        result.failed[0].operation,
        Operation::AddContributionLabels { .. }
    ));
    assert_eq!(result.applied.len(), 2);
    assert!(h.record(&id).is_some());
    assert_eq!(h.bot_comments(&id), vec![CommentKind::Welcome]);

    h.world.clear_failures();
    let retry = h.run(&id);
    assert_eq!(
        retry.applied,
        vec![Operation::AddContributionLabels {
            labels: set(&["open-source-contribution"]),
        }]
    );
}

#[test]
fn comments_naming_an_uncreated_record_are_skipped() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 51, "newcomer", "Fix typo"));
    h.world.fail("create_record", RemoteErrorKind::Transient);

    let result = h.run(&id);

    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].kind, FailureKind::Transient);
    assert_eq!(result.skipped.len(), 1);
    assert!(matches!(
        result.skipped[0].operation,
        Operation::PostComment {
            kind: CommentKind::Welcome,
            ..
        }
    ));
    // The CLA notice does not name the record, so it still goes out.
    assert_eq!(h.bot_comments(&id), vec![CommentKind::NeedsCla]);
    assert!(h.labels(&id).contains("open-source-contribution"));

    h.world.clear_failures();
    h.run(&id);
    assert!(h.record(&id).is_some());
    assert!(h.run(&id).is_noop());
}

#[test]
fn dry_run_writes_nothing_and_matches_live_fingerprint() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 52, "outsider", "Fix typo"));

    let dry = h.dry_run(&id);

    assert!(dry.dry_run);
    assert_eq!(dry.planned.len(), 3);
    assert!(dry.applied.is_empty());
    assert!(h.world.writes().is_empty());
    assert!(h.world.records().is_empty());

    let live = h.run(&id);
    assert_eq!(live.fingerprint, dry.fingerprint);
    assert_eq!(live.planned, dry.planned);
}

#[test]
fn preview_shows_new_comment_under_placeholder_key() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 53, "outsider", "Fix typo"));

    let pass = h.reconciler.plan(&Trigger::rescan(id.clone())).expect("plan");
    let previews = preview_comments(&pass, h.reconciler.renderer()).expect("preview");

    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0].kind, CommentKind::Welcome);
    assert_eq!(previews[0].action, CommentAction::Post);
    assert!(previews[0].unified_diff.contains("+++ b/external-pr-welcome"));
    assert!(previews[0].unified_diff.contains("OSPR-NEW"));
    assert!(h.world.writes().is_empty());
}

#[test]
fn preview_diffs_an_edited_lead_against_its_current_body() {
    let h = Harness::new();
    let id = h.add(contribution("openedx/edx-platform", 54, "outsider", "Fix typo"));
    h.run(&id);
    h.edit(&id, |c| c.title = "[BD-42] Fix typo".to_string());

    let pass = h.reconciler.plan(&Trigger::rescan(id.clone())).expect("plan");
    let previews = preview_comments(&pass, h.reconciler.renderer()).expect("preview");

    let edit = previews
        .iter()
        .find(|p| p.action == CommentAction::Edit)
        .expect("lead edit");
    assert_eq!(edit.kind, CommentKind::BlendedWelcome);
    assert!(edit.unified_diff.contains("-<!-- relay:comment external-pr-welcome -->"));
    assert!(edit.unified_diff.contains("+<!-- relay:comment blended-pr-welcome -->"));
    assert!(edit.unified_diff.contains("BLENDED-NEW"));
}
