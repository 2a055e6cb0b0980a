//! Complaint status state machine and SLA arithmetic.
//!
//! Everything here is a pure function of the complaint and `now`. Nothing is
//! computed implicitly on save.
//!
//! ```text
//! pending_review -> open | rejected
//! open           -> in_progress | rejected
//! in_progress    -> resolved | rejected
//! resolved       -> (reopen through verification only)
//! rejected       -> (terminal)
//! ```

use campusdesk_common::{AppError, AppResult};
use campusdesk_db::entities::complaint::{
    self, Attachments, ComplaintStatus, Priority, VerificationStatus,
};
use chrono::{DateTime, Duration, Utc};

/// Input for a new complaint, already validated.
#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    pub category: complaint::ComplaintCategory,
    pub department: String,
    pub priority: Priority,
    pub is_anonymous: bool,
    pub attachments: Attachments,
}

/// The complaint status state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplaintWorkflowEngine;

impl ComplaintWorkflowEngine {
    /// Statuses reachable from `from` by a direct status request.
    #[must_use]
    pub const fn allowed_targets(from: ComplaintStatus) -> &'static [ComplaintStatus] {
        use ComplaintStatus::{InProgress, Open, PendingReview, Rejected, Resolved};
        match from {
            PendingReview => &[Open, Rejected],
            Open => &[InProgress, Rejected],
            InProgress => &[Resolved, Rejected],
            Resolved | Rejected => &[],
        }
    }

    /// Time allowed to handle a complaint of this priority.
    #[must_use]
    pub fn sla_window(priority: Priority) -> Duration {
        match priority {
            Priority::High => Duration::hours(24),
            Priority::Medium => Duration::hours(72),
            Priority::Low => Duration::hours(168),
        }
    }

    /// Build a fresh `pending_review` complaint with its SLA fields derived.
    #[must_use]
    pub fn new_complaint(
        id: String,
        creator_id: String,
        input: NewComplaint,
        now: DateTime<Utc>,
    ) -> complaint::Model {
        let department_key = super::access_policy::normalize_department(&input.department);
        let due_date = now + Self::sla_window(input.priority);

        let mut model = complaint::Model {
            id,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            category: input.category,
            department: input.department.trim().to_string(),
            department_key,
            priority: input.priority,
            attachments: input.attachments,
            is_anonymous: input.is_anonymous,
            status: ComplaintStatus::PendingReview,
            rejection_reason: None,
            verification_status: None,
            verification_comment: None,
            verified_by: None,
            verified_at: None,
            resolved_at: None,
            resolution_time_hours: None,
            due_date: due_date.into(),
            is_overdue: false,
            hours_remaining: 0.0,
            creator_id,
            assigned_to: None,
            version: 1,
            created_at: now.into(),
            updated_at: now.into(),
        };
        Self::refresh_sla(&mut model, now);
        model
    }

    /// Recompute `hours_remaining` and `is_overdue`. No-op once resolved.
    pub fn refresh_sla(complaint: &mut complaint::Model, now: DateTime<Utc>) {
        if complaint.status == ComplaintStatus::Resolved {
            return;
        }
        let remaining = complaint.due_date.with_timezone(&Utc) - now;
        let hours = remaining.num_milliseconds() as f64 / 3_600_000.0;
        complaint.hours_remaining = (hours * 10.0).round() / 10.0;
        complaint.is_overdue = complaint.hours_remaining < 0.0;
    }

    /// Apply a status request. Returns the previous status.
    ///
    /// Fails without touching `complaint` if the edge is not in the graph,
    /// the target equals the current status, or a rejection has no reason.
    pub fn transition(
        complaint: &mut complaint::Model,
        target: ComplaintStatus,
        rejection_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<ComplaintStatus> {
        let old = complaint.status;
        if old == target {
            return Err(AppError::InvalidTransition(format!(
                "Complaint is already {target}"
            )));
        }
        if !Self::allowed_targets(old).contains(&target) {
            return Err(AppError::InvalidTransition(format!(
                "Cannot move complaint from {old} to {target}"
            )));
        }

        let reason = rejection_reason.map(str::trim).filter(|r| !r.is_empty());
        if target == ComplaintStatus::Rejected && reason.is_none() {
            return Err(AppError::Validation(
                "A rejection reason is required to reject a complaint".to_string(),
            ));
        }

        // SLA freezes at the values it had when the complaint was resolved
        Self::refresh_sla(complaint, now);

        complaint.status = target;
        complaint.rejection_reason = if target == ComplaintStatus::Rejected {
            reason.map(str::to_string)
        } else {
            None
        };

        if target == ComplaintStatus::Resolved {
            complaint.verification_status = Some(VerificationStatus::Pending);
            complaint.verification_comment = None;
            complaint.verified_by = None;
            complaint.verified_at = None;
            complaint.resolved_at = Some(now.into());
            complaint.resolution_time_hours =
                Some(Self::hours_between(complaint.created_at.with_timezone(&Utc), now));
        }

        Ok(old)
    }

    /// Stamp a write: refresh SLA, bump `updated_at` and `version`.
    ///
    /// Returns the version the stored row must still have.
    pub fn prepare_save(complaint: &mut complaint::Model, now: DateTime<Utc>) -> i32 {
        Self::refresh_sla(complaint, now);
        let expected = complaint.version;
        complaint.version += 1;
        complaint.updated_at = now.into();
        expected
    }

    fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        let ms = (to - from).num_milliseconds().max(0);
        ms as f64 / 3_600_000.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::complaint_fixture;
    use campusdesk_db::entities::complaint::ComplaintCategory;
    use chrono::TimeZone;

    const ALL: [ComplaintStatus; 5] = [
        ComplaintStatus::PendingReview,
        ComplaintStatus::Open,
        ComplaintStatus::InProgress,
        ComplaintStatus::Resolved,
        ComplaintStatus::Rejected,
    ];

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn input(priority: Priority) -> NewComplaint {
        NewComplaint {
            title: "  Wi-Fi outage ".to_string(),
            description: "No connectivity in the east wing since Monday".to_string(),
            category: ComplaintCategory::Facilities,
            department: " Computer  Science ".to_string(),
            priority,
            is_anonymous: false,
            attachments: Attachments::default(),
        }
    }

    #[test]
    fn test_due_date_follows_priority() {
        for (priority, hours) in [
            (Priority::High, 24),
            (Priority::Medium, 72),
            (Priority::Low, 168),
        ] {
            let c = ComplaintWorkflowEngine::new_complaint(
                "c1".to_string(),
                "s1".to_string(),
                input(priority),
                t0(),
            );
            assert_eq!(c.due_date.with_timezone(&Utc), t0() + Duration::hours(hours));
            assert_eq!(c.hours_remaining, hours as f64);
            assert!(!c.is_overdue);
        }
    }

    #[test]
    fn test_new_complaint_normalizes() {
        let c = ComplaintWorkflowEngine::new_complaint(
            "c1".to_string(),
            "s1".to_string(),
            input(Priority::Medium),
            t0(),
        );
        assert_eq!(c.status, ComplaintStatus::PendingReview);
        assert_eq!(c.title, "Wi-Fi outage");
        assert_eq!(c.department, "Computer  Science");
        assert_eq!(c.department_key, "computer science");
        assert_eq!(c.version, 1);
    }

    #[test]
    fn test_transition_accepted_iff_edge_exists() {
        for from in ALL {
            for to in ALL {
                let mut c = complaint_fixture("c1", "s1", "Physics");
                c.status = from;
                let result =
                    ComplaintWorkflowEngine::transition(&mut c, to, Some("duplicate"), t0());
                let expected = from != to && ComplaintWorkflowEngine::allowed_targets(from).contains(&to);
                assert_eq!(result.is_ok(), expected, "{from} -> {to}");
                if expected {
                    assert_eq!(c.status, to);
                } else {
                    assert_eq!(c.status, from);
                }
            }
        }
    }

    #[test]
    fn test_same_status_is_invalid_transition() {
        let mut c = complaint_fixture("c1", "s1", "Physics");
        c.status = ComplaintStatus::Open;
        let err =
            ComplaintWorkflowEngine::transition(&mut c, ComplaintStatus::Open, None, t0()).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn test_reject_requires_reason() {
        for reason in [None, Some(""), Some("   ")] {
            let mut c = complaint_fixture("c1", "s1", "Physics");
            let before = c.clone();
            let err = ComplaintWorkflowEngine::transition(
                &mut c,
                ComplaintStatus::Rejected,
                reason,
                t0(),
            )
            .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            assert_eq!(c, before);
        }

        let mut c = complaint_fixture("c1", "s1", "Physics");
        ComplaintWorkflowEngine::transition(
            &mut c,
            ComplaintStatus::Rejected,
            Some("  Duplicate of CMP-2026-abc123 "),
            t0(),
        )
        .unwrap();
        assert_eq!(
            c.rejection_reason.as_deref(),
            Some("Duplicate of CMP-2026-abc123")
        );
    }

    #[test]
    fn test_reason_ignored_for_other_targets() {
        let mut c = complaint_fixture("c1", "s1", "Physics");
        ComplaintWorkflowEngine::transition(&mut c, ComplaintStatus::Open, Some("x"), t0()).unwrap();
        assert!(c.rejection_reason.is_none());
    }

    #[test]
    fn test_resolve_stamps_resolution_and_freezes_sla() {
        let mut c = complaint_fixture("c1", "s1", "Physics");
        c.created_at = t0().into();
        c.due_date = (t0() + Duration::hours(72)).into();
        c.status = ComplaintStatus::InProgress;

        let resolved_at = t0() + Duration::minutes(90);
        let old = ComplaintWorkflowEngine::transition(
            &mut c,
            ComplaintStatus::Resolved,
            None,
            resolved_at,
        )
        .unwrap();

        assert_eq!(old, ComplaintStatus::InProgress);
        assert_eq!(c.verification_status, Some(VerificationStatus::Pending));
        assert_eq!(c.resolved_at.unwrap().with_timezone(&Utc), resolved_at);
        assert_eq!(c.resolution_time_hours, Some(1.5));
        assert_eq!(c.hours_remaining, 70.5);

        // Far past the due date: frozen values stay
        ComplaintWorkflowEngine::refresh_sla(&mut c, t0() + Duration::days(30));
        assert_eq!(c.hours_remaining, 70.5);
        assert!(!c.is_overdue);
    }

    #[test]
    fn test_resolve_clears_previous_verification() {
        let mut c = complaint_fixture("c1", "s1", "Physics");
        c.status = ComplaintStatus::InProgress;
        c.verification_status = Some(VerificationStatus::Reopened);
        c.verification_comment = Some("Still broken".to_string());
        c.verified_by = Some("s1".to_string());

        ComplaintWorkflowEngine::transition(&mut c, ComplaintStatus::Resolved, None, Utc::now())
            .unwrap();

        assert_eq!(c.verification_status, Some(VerificationStatus::Pending));
        assert!(c.verification_comment.is_none());
        assert!(c.verified_by.is_none());
    }

    #[test]
    fn test_refresh_sla_rounds_and_flags_overdue() {
        let mut c = complaint_fixture("c1", "s1", "Physics");
        c.due_date = t0().into();

        ComplaintWorkflowEngine::refresh_sla(&mut c, t0() - Duration::minutes(100));
        assert_eq!(c.hours_remaining, 1.7);
        assert!(!c.is_overdue);

        ComplaintWorkflowEngine::refresh_sla(&mut c, t0() + Duration::minutes(30));
        assert_eq!(c.hours_remaining, -0.5);
        assert!(c.is_overdue);
    }

    #[test]
    fn test_prepare_save_bumps_version() {
        let mut c = complaint_fixture("c1", "s1", "Physics");
        let expected = ComplaintWorkflowEngine::prepare_save(&mut c, t0());
        assert_eq!(expected, 1);
        assert_eq!(c.version, 2);
        assert_eq!(c.updated_at.with_timezone(&Utc), t0());
    }
}
