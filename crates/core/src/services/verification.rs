//! Post-resolution review by the complaint's creator.

use campusdesk_common::{AppError, AppResult};
use campusdesk_db::entities::complaint::{self, ComplaintStatus, VerificationStatus};
use chrono::{DateTime, Utc};

use super::access_policy::{AccessPolicy, Actor};

/// What the creator decided about a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationAction {
    /// Accept the resolution. Status stays `resolved`.
    Confirm,
    /// Reject the resolution. Status goes back to `in_progress`.
    Reopen,
}

impl VerificationAction {
    /// Parse `"confirm"` or `"reopen"`.
    pub fn parse(s: &str) -> AppResult<Self> {
        match s.trim() {
            "confirm" => Ok(Self::Confirm),
            "reopen" => Ok(Self::Reopen),
            other => Err(AppError::Validation(format!(
                "Unknown verification action '{other}', expected 'confirm' or 'reopen'"
            ))),
        }
    }
}

/// Applies confirm/reopen to a resolved complaint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionVerificationEngine;

impl ResolutionVerificationEngine {
    /// Record the creator's verdict, overwriting any previous one.
    ///
    /// Reopen is the only way back from `resolved`. It bypasses the
    /// transition table on purpose.
    pub fn apply(
        complaint: &mut complaint::Model,
        actor: &Actor,
        action: VerificationAction,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if !AccessPolicy::can_verify(actor, complaint) {
            return Err(AppError::Forbidden(
                "Only the student who filed this complaint can verify its resolution".to_string(),
            ));
        }
        if complaint.status != ComplaintStatus::Resolved {
            return Err(AppError::Validation(format!(
                "Only resolved complaints can be verified; this one is {}",
                complaint.status
            )));
        }

        complaint.verification_status = Some(match action {
            VerificationAction::Confirm => VerificationStatus::Confirmed,
            VerificationAction::Reopen => VerificationStatus::Reopened,
        });
        complaint.verification_comment = comment
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        complaint.verified_by = Some(actor.id().to_string());
        complaint.verified_at = Some(now.into());

        if action == VerificationAction::Reopen {
            complaint.status = ComplaintStatus::InProgress;
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::complaint_fixture;

    fn resolved() -> complaint::Model {
        let mut c = complaint_fixture("c1", "student1", "Physics");
        c.status = ComplaintStatus::Resolved;
        c.verification_status = Some(VerificationStatus::Pending);
        c
    }

    fn creator() -> Actor {
        Actor::Student {
            id: "student1".to_string(),
        }
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(VerificationAction::parse("confirm").unwrap(), VerificationAction::Confirm);
        assert_eq!(VerificationAction::parse("reopen").unwrap(), VerificationAction::Reopen);
        assert!(matches!(
            VerificationAction::parse("approve"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_confirm_keeps_resolved() {
        let mut c = resolved();
        ResolutionVerificationEngine::apply(
            &mut c,
            &creator(),
            VerificationAction::Confirm,
            Some("Thanks, fixed"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(c.status, ComplaintStatus::Resolved);
        assert_eq!(c.verification_status, Some(VerificationStatus::Confirmed));
        assert_eq!(c.verification_comment.as_deref(), Some("Thanks, fixed"));
        assert_eq!(c.verified_by.as_deref(), Some("student1"));
        assert!(c.verified_at.is_some());
    }

    #[test]
    fn test_reopen_moves_back_to_in_progress() {
        let mut c = resolved();
        ResolutionVerificationEngine::apply(
            &mut c,
            &creator(),
            VerificationAction::Reopen,
            None,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(c.status, ComplaintStatus::InProgress);
        assert_eq!(c.verification_status, Some(VerificationStatus::Reopened));
    }

    #[test]
    fn test_repeated_reopen_fails() {
        let mut c = resolved();
        ResolutionVerificationEngine::apply(&mut c, &creator(), VerificationAction::Reopen, None, Utc::now())
            .unwrap();

        let before = c.clone();
        let err = ResolutionVerificationEngine::apply(
            &mut c,
            &creator(),
            VerificationAction::Reopen,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(c, before);
    }

    #[test]
    fn test_non_creator_is_forbidden() {
        let mut c = resolved();
        for actor in [
            Actor::Student {
                id: "student2".to_string(),
            },
            Actor::Admin {
                id: "admin1".to_string(),
            },
            Actor::Staff {
                id: "staff1".to_string(),
                department_key: "physics".to_string(),
            },
        ] {
            let err = ResolutionVerificationEngine::apply(
                &mut c,
                &actor,
                VerificationAction::Confirm,
                None,
                Utc::now(),
            )
            .unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
        }
        assert_eq!(c.verification_status, Some(VerificationStatus::Pending));
    }
}
