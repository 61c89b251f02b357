//! Property-based tests for the attachment lifecycle.

use bytes::Bytes;
use chrono::Utc;
use incident_shared::types::UserId;
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::AttachmentError;
use super::policy::AttachmentPolicy;
use super::service::tests::fixture;
use super::types::{Attachment, AttachmentStatus, NewAttachment, ParentType};
use incident_shared::config::AttachmentSettings;

/// Operations that can be attempted on an aggregate.
#[derive(Debug, Clone)]
enum Op {
    AssignPath,
    Complete(u64),
    ApplySanitized(u64),
    Block,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::AssignPath),
        (1u64..1_000_000).prop_map(Op::Complete),
        (1u64..1_000_000).prop_map(Op::ApplySanitized),
        Just(Op::Block),
    ]
}

fn apply(attachment: &mut Attachment, op: &Op) {
    let _ = match op {
        Op::AssignPath => attachment.assign_storage_path("incidents/1/2/a.png"),
        Op::Complete(size) => attachment.complete(*size, false, Utc::now()),
        Op::ApplySanitized(size) => attachment.apply_sanitized(*size, None),
        Op::Block => attachment.block(),
    };
}

fn pending() -> Attachment {
    Attachment::new_pending(
        NewAttachment {
            parent_type: ParentType::Incident,
            parent_id: Uuid::nil(),
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
            uploaded_by: UserId::new(),
        },
        &AttachmentPolicy::from(&AttachmentSettings::default()),
        Utc::now(),
    )
    .unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Once an attachment leaves Pending it never returns.
    #[test]
    fn prop_status_never_returns_to_pending(ops in proptest::collection::vec(arb_op(), 0..20)) {
        let mut attachment = pending();
        let mut left_pending = false;
        for op in &ops {
            apply(&mut attachment, op);
            if attachment.status() != AttachmentStatus::Pending {
                left_pending = true;
            }
            prop_assert!(!(left_pending && attachment.status() == AttachmentStatus::Pending));
        }
    }

    /// Pending exactly when size and completion time are unset.
    #[test]
    fn prop_completion_fields_track_status(ops in proptest::collection::vec(arb_op(), 0..20)) {
        let mut attachment = pending();
        for op in &ops {
            apply(&mut attachment, op);
            let has_completion = attachment.size().is_some() && attachment.completed_at().is_some();
            let has_none = attachment.size().is_none() && attachment.completed_at().is_none();
            match attachment.status() {
                AttachmentStatus::Completed | AttachmentStatus::Blocked => prop_assert!(has_completion),
                AttachmentStatus::Pending => prop_assert!(has_none),
            }
            prop_assert!(!attachment.storage_path().is_empty());
            prop_assert!(Attachment::from_snapshot(attachment.to_snapshot()).is_ok());
        }
    }

    /// Abort by anyone other than the uploader or an admin is forbidden and changes nothing.
    #[test]
    fn prop_abort_by_stranger_is_forbidden(upload in proptest::bool::ANY) {
        runtime().block_on(async {
            let fx = fixture();
            let started = fx.start_png().await;
            if upload {
                fx.upload(&started, b"png", "image/png");
            }
            let before = fx.repo.stored(started.attachment_id).unwrap();

            let result = fx
                .service
                .abort(started.attachment_id, UserId::new(), false, &CancellationToken::new())
                .await;

            prop_assert!(matches!(result, Err(AttachmentError::Forbidden(_))));
            prop_assert_eq!(fx.repo.stored(started.attachment_id).unwrap(), before);
            prop_assert_eq!(fx.store.properties(&started.storage_path).is_some(), upload);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Complete rejects any stored content type that differs from the declared one.
    #[test]
    fn prop_content_type_mismatch_rejected(
        observed in prop_oneof![
            Just("image/jpeg"),
            Just("image/gif"),
            Just("application/pdf"),
            Just("text/plain"),
            Just("image/png; charset=binary"),
        ],
        size in 1usize..1024,
    ) {
        runtime().block_on(async {
            let fx = fixture();
            let started = fx.start_png().await;
            fx.store
                .absorb_upload(
                    &started.storage_path,
                    Bytes::from(vec![0u8; size]),
                    Some(observed),
                    Utc::now(),
                )
                .unwrap();

            let result = fx
                .service
                .complete(started.attachment_id, &CancellationToken::new())
                .await;

            prop_assert!(
                matches!(result, Err(AttachmentError::ContentTypeMismatch { .. })),
                "expected mismatch"
            );
            prop_assert_eq!(
                fx.repo.stored(started.attachment_id).unwrap().status(),
                AttachmentStatus::Pending
            );
            Ok::<(), TestCaseError>(())
        })?;
    }
}
