//! End-to-end workflow scenarios over the in-memory stores.

#![allow(clippy::unwrap_used)]

use campusdesk_common::AppError;
use campusdesk_core::services::{
    AccessPolicy, Actor, AddRemarkInput, CreateComplaintInput, RequestContext,
    UpdateStatusInput, VerifyResolutionInput,
};
use campusdesk_core::testing::{Harness, user_fixture};
use campusdesk_db::entities::{
    audit_log::{AuditAction, AuditStatus},
    complaint::{ComplaintStatus, VerificationStatus},
    notification::NotificationType,
    user::UserRole,
};
use chrono::{Duration, Utc};

fn ctx() -> RequestContext {
    RequestContext {
        correlation_id: Some("req-1".to_string()),
        ip_address: Some("10.0.0.7".to_string()),
        user_agent: Some("scenario-test".to_string()),
    }
}

fn student() -> Actor {
    Actor::Student {
        id: "s1".to_string(),
    }
}

fn staff(id: &str, dept: &str) -> Actor {
    Actor::Staff {
        id: id.to_string(),
        department_key: dept.to_string(),
    }
}

fn status(s: &str) -> UpdateStatusInput {
    UpdateStatusInput {
        status: s.to_string(),
        rejection_reason: None,
    }
}

fn harness() -> Harness {
    let h = Harness::new();
    h.users.insert(user_fixture("s1", UserRole::Student, None));
    h.users
        .insert(user_fixture("cs1", UserRole::Staff, Some("Computer Science")));
    h.users
        .insert(user_fixture("ph1", UserRole::Staff, Some("Physics")));
    h.users.insert(user_fixture("admin1", UserRole::Admin, None));
    h
}

async fn file_complaint(h: &Harness, priority: &str, anonymous: bool) -> String {
    h.orchestrator
        .create_complaint(
            &student(),
            CreateComplaintInput {
                title: "Lab machines keep crashing".to_string(),
                description: "Half the machines in lab 3 crash during compilation".to_string(),
                category: "academic".to_string(),
                department: "Computer  Science".to_string(),
                priority: Some(priority.to_string()),
                is_anonymous: anonymous,
                attachments: Vec::new(),
            },
            &ctx(),
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn full_lifecycle_with_reopen() {
    let h = harness();
    let before = Utc::now();
    let id = file_complaint(&h, "high", false).await;

    let stored = h.complaints.get(&id).unwrap();
    let window = stored.due_date.with_timezone(&Utc) - stored.created_at.with_timezone(&Utc);
    assert_eq!(window, Duration::hours(24));
    assert!(stored.created_at.with_timezone(&Utc) >= before);

    // Staff of another department cannot touch it
    let result = h
        .orchestrator
        .update_status(&staff("ph1", "physics"), &id, status("open"), &ctx())
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let cs = staff("cs1", "computer science");
    for target in ["open", "in_progress", "resolved"] {
        h.orchestrator
            .update_status(&cs, &id, status(target), &ctx())
            .await
            .unwrap();
    }

    let resolved = h.complaints.get(&id).unwrap();
    assert_eq!(resolved.status, ComplaintStatus::Resolved);
    assert_eq!(resolved.verification_status, Some(VerificationStatus::Pending));
    assert!(resolved.resolved_at.is_some());
    assert!(resolved.resolution_time_hours.unwrap() >= 0.0);

    let view = h
        .orchestrator
        .verify_resolution(
            &student(),
            &id,
            VerifyResolutionInput {
                action: "reopen".to_string(),
                comment: Some("Still crashing".to_string()),
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(view.status, ComplaintStatus::InProgress);
    let verification = view.resolution_verification.unwrap();
    assert_eq!(verification.status, VerificationStatus::Reopened);
    assert_eq!(verification.comment.as_deref(), Some("Still crashing"));

    // Reopening again is not possible once the complaint is back in progress
    let again = h
        .orchestrator
        .verify_resolution(
            &student(),
            &id,
            VerifyResolutionInput {
                action: "reopen".to_string(),
                comment: None,
            },
            &ctx(),
        )
        .await;
    assert!(matches!(again, Err(AppError::Validation(_))));

    h.bus.idle().await;

    let entries = h.audit.entries();
    let count = |action| {
        entries
            .iter()
            .filter(|e| e.action == action && e.status == AuditStatus::Success)
            .count()
    };
    assert_eq!(count(AuditAction::ComplaintCreate), 1);
    assert_eq!(count(AuditAction::ComplaintStatusUpdate), 3);
    assert_eq!(count(AuditAction::ComplaintResolutionReopen), 1);
    assert!(entries.iter().any(|e| {
        e.action == AuditAction::ComplaintStatusUpdate
            && e.status == AuditStatus::Failure
            && e.actor_id.as_deref() == Some("ph1")
    }));
    assert!(entries
        .iter()
        .all(|e| e.correlation_id.as_deref() == Some("req-1")));

    let notes = h.notifications.all();
    let to_creator = notes
        .iter()
        .filter(|n| n.recipient_id == "s1" && n.notification_type == NotificationType::StatusUpdated)
        .count();
    assert_eq!(to_creator, 3);
    assert!(notes.iter().any(|n| {
        n.recipient_id == "admin1" && n.notification_type == NotificationType::ComplaintReopened
    }));
}

#[tokio::test]
async fn email_failure_does_not_block_audit_or_response() {
    let h = harness();
    h.email.fail_all(true);
    let id = file_complaint(&h, "medium", false).await;

    let view = h
        .orchestrator
        .update_status(
            &staff("cs1", "computer science"),
            &id,
            status("open"),
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(view.status, ComplaintStatus::Open);

    h.bus.idle().await;

    let updates: Vec<_> = h
        .audit
        .entries()
        .into_iter()
        .filter(|e| e.action == AuditAction::ComplaintStatusUpdate)
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].status, AuditStatus::Success);

    let to_creator: Vec<_> = h
        .notifications
        .all()
        .into_iter()
        .filter(|n| n.recipient_id == "s1")
        .collect();
    assert_eq!(to_creator.len(), 1);
    assert!(h.email.sent().is_empty());
}

#[tokio::test]
async fn rejection_without_reason_changes_nothing() {
    let h = harness();
    let id = file_complaint(&h, "low", false).await;
    h.bus.idle().await;
    let audit_before = h.audit.entries().len();
    let notes_before = h.notifications.all().len();

    let result = h
        .orchestrator
        .update_status(
            &staff("cs1", "computer science"),
            &id,
            UpdateStatusInput {
                status: "rejected".to_string(),
                rejection_reason: Some("   ".to_string()),
            },
            &ctx(),
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    h.bus.idle().await;
    let stored = h.complaints.get(&id).unwrap();
    assert_eq!(stored.status, ComplaintStatus::PendingReview);
    assert_eq!(stored.version, 1);
    assert_eq!(h.audit.entries().len(), audit_before);
    assert_eq!(h.notifications.all().len(), notes_before);
}

#[tokio::test]
async fn repeated_status_is_rejected() {
    let h = harness();
    let id = file_complaint(&h, "medium", false).await;
    let cs = staff("cs1", "computer science");

    h.orchestrator
        .update_status(&cs, &id, status("open"), &ctx())
        .await
        .unwrap();
    let result = h
        .orchestrator
        .update_status(&cs, &id, status("open"), &ctx())
        .await;
    assert!(matches!(result, Err(AppError::InvalidTransition(_))));

    let result = h
        .orchestrator
        .update_status(&cs, &id, status("resolved"), &ctx())
        .await;
    assert!(matches!(result, Err(AppError::InvalidTransition(_))));
}

#[tokio::test]
async fn concurrent_write_is_a_conflict() {
    let h = harness();
    let id = file_complaint(&h, "medium", false).await;
    h.bus.idle().await;
    let audit_before = h.audit.entries().len();

    h.complaints.race_next_write();
    let result = h
        .orchestrator
        .update_status(
            &staff("cs1", "computer science"),
            &id,
            status("open"),
            &ctx(),
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    h.bus.idle().await;
    assert_eq!(h.complaints.get(&id).unwrap().status, ComplaintStatus::PendingReview);
    assert_eq!(h.audit.entries().len(), audit_before);
}

#[tokio::test]
async fn purge_racing_another_write_is_a_conflict() {
    let h = harness();
    let id = file_complaint(&h, "low", false).await;
    let cs = staff("cs1", "computer science");
    for target in ["open", "in_progress", "resolved"] {
        h.orchestrator
            .update_status(&cs, &id, status(target), &ctx())
            .await
            .unwrap();
    }
    h.orchestrator
        .verify_resolution(
            &student(),
            &id,
            VerifyResolutionInput {
                action: "confirm".to_string(),
                comment: None,
            },
            &ctx(),
        )
        .await
        .unwrap();
    let admin = Actor::Admin {
        id: "admin1".to_string(),
    };

    h.complaints.race_next_write();
    let result = h.orchestrator.delete_complaint(&admin, &id, &ctx()).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(h.complaints.get(&id).is_some());

    // A fresh read sees the current version and goes through
    h.orchestrator
        .delete_complaint(&admin, &id, &ctx())
        .await
        .unwrap();
    assert!(h.complaints.get(&id).is_none());

    h.bus.idle().await;
    let deletes = h
        .audit
        .entries()
        .iter()
        .filter(|e| e.action == AuditAction::ComplaintDelete)
        .count();
    assert_eq!(deletes, 1);
}

#[tokio::test]
async fn anonymous_identity_is_masked_on_every_read() {
    let h = harness();
    let id = file_complaint(&h, "medium", true).await;
    let cs = staff("cs1", "computer science");
    let admin = Actor::Admin {
        id: "admin1".to_string(),
    };

    for actor in [&cs, &admin] {
        let view = h.orchestrator.get_complaint(actor, &id, &ctx()).await.unwrap();
        assert_eq!(view.creator.id, "s1");
        assert!(view.creator.name.is_none());
        assert!(view.creator.email.is_none());
        assert!(view.creator.student_id.is_none());
    }

    let view = h
        .orchestrator
        .add_remark(
            &cs,
            &id,
            AddRemarkInput {
                comment: "We are replacing the RAM".to_string(),
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert!(view.creator.email.is_none());

    let own = h.orchestrator.get_complaint(&student(), &id, &ctx()).await.unwrap();
    assert_eq!(own.creator.student_id.as_deref(), Some("S-s1"));
    assert_eq!(own.remarks.unwrap().len(), 1);

    // The staff channel announcement carries no identity either
    h.bus.idle().await;
    for (_, frame) in h.realtime.role_frames() {
        let data = frame.data.to_string();
        assert!(!data.contains("s1@example.edu"));
        assert!(!data.contains("User s1"));
    }
    let stored = h.complaints.get(&id).unwrap();
    assert!(AccessPolicy::can_access(&cs, &stored));
}

#[tokio::test]
async fn confirmed_resolution_notifies_admins_only() {
    let h = harness();
    let id = file_complaint(&h, "high", false).await;
    let cs = staff("cs1", "computer science");
    for target in ["open", "in_progress", "resolved"] {
        h.orchestrator
            .update_status(&cs, &id, status(target), &ctx())
            .await
            .unwrap();
    }
    h.bus.idle().await;
    let before = h.notifications.all().len();

    let view = h
        .orchestrator
        .verify_resolution(
            &student(),
            &id,
            VerifyResolutionInput {
                action: "confirm".to_string(),
                comment: None,
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(view.status, ComplaintStatus::Resolved);

    h.bus.idle().await;
    let new: Vec<_> = h.notifications.all().into_iter().skip(before).collect();
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].recipient_id, "admin1");
    assert_eq!(new[0].notification_type, NotificationType::ResolutionConfirmed);

    // Staff cannot verify on the student's behalf
    let result = h
        .orchestrator
        .verify_resolution(
            &cs,
            &id,
            VerifyResolutionInput {
                action: "confirm".to_string(),
                comment: None,
            },
            &ctx(),
        )
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let result = h
        .orchestrator
        .verify_resolution(
            &student(),
            &id,
            VerifyResolutionInput {
                action: "escalate".to_string(),
                comment: None,
            },
            &ctx(),
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}
