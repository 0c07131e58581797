//! Single-role authorization shared by every gated workflow.

use crate::domain::ids::{Member, RoleId};
use crate::errors::{GatedAction, WorkflowError};

pub fn authorize(member: &Member, required: RoleId) -> bool {
    member.has_role(required)
}

/// Lifts a failed [`authorize`] into the error carrying the action's notice.
pub fn require_role(
    member: &Member,
    required: RoleId,
    action: GatedAction,
) -> Result<(), WorkflowError> {
    if authorize(member, required) {
        Ok(())
    } else {
        Err(WorkflowError::AuthorizationDenied {
            user_id: member.user_id,
            role_id: required,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{authorize, require_role};
    use crate::domain::ids::{Member, RoleId, UserId};
    use crate::errors::{GatedAction, WorkflowError};

    const DESIGNER: RoleId = RoleId(1342201759111712799);

    #[test]
    fn members_holding_the_role_pass() {
        let member = Member::new(UserId(1), [RoleId(5), DESIGNER]);
        assert!(authorize(&member, DESIGNER));
        assert_eq!(require_role(&member, DESIGNER, GatedAction::ClaimOrder), Ok(()));
    }

    #[test]
    fn members_without_the_role_are_denied_for_every_action() {
        let member = Member::new(UserId(2), [RoleId(5)]);
        for action in [
            GatedAction::SubmitQualityControl,
            GatedAction::ReviewQualityControl,
            GatedAction::ClaimOrder,
            GatedAction::ApproveLeave,
            GatedAction::DenyLeave,
        ] {
            let error = require_role(&member, DESIGNER, action).expect_err("must be denied");
            assert!(matches!(
                error,
                WorkflowError::AuthorizationDenied { user_id: UserId(2), role_id: DESIGNER, .. }
            ));
        }
    }

    #[test]
    fn empty_role_sets_never_pass() {
        assert!(!authorize(&Member::new(UserId(3), []), DESIGNER));
    }
}
