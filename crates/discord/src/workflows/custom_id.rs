//! Versioned custom ids carried by buttons, selects and forms. Each id is
//! `<action>:<token>`, where the token keys an in-memory registry entry.

pub const QC_SUBMIT: &str = "qc.submit.v1";
pub const QC_APPROVE: &str = "qc.approve.v1";
pub const QC_DENY: &str = "qc.deny.v1";
pub const QC_DENY_REASON: &str = "qc.deny_reason.v1";
pub const LOA_APPROVE: &str = "loa.approve.v1";
pub const LOA_DENY: &str = "loa.deny.v1";
pub const LOA_DENY_REASON: &str = "loa.deny_reason.v1";
pub const REVIEW_CATEGORY: &str = "review.category.v1";
pub const REVIEW_RATING: &str = "review.rating.v1";

pub const IMAGES_INPUT: &str = "images";
pub const REASON_INPUT: &str = "reason";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentAction {
    ApproveQualityControl,
    DenyQualityControl,
    ApproveLeave,
    DenyLeave,
    ChooseReviewCategory,
    ChooseReviewRating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModalAction {
    SubmitQualityControl,
    DenyQualityControl,
    DenyLeave,
}

pub fn encode(action: &str, token: &str) -> String {
    format!("{action}:{token}")
}

fn split(custom_id: &str) -> Option<(&str, &str)> {
    let (action, token) = custom_id.split_once(':')?;
    (!token.is_empty()).then_some((action, token))
}

pub fn parse_component(custom_id: &str) -> Option<(ComponentAction, &str)> {
    let (action, token) = split(custom_id)?;
    let action = match action {
        QC_APPROVE => ComponentAction::ApproveQualityControl,
        QC_DENY => ComponentAction::DenyQualityControl,
        LOA_APPROVE => ComponentAction::ApproveLeave,
        LOA_DENY => ComponentAction::DenyLeave,
        REVIEW_CATEGORY => ComponentAction::ChooseReviewCategory,
        REVIEW_RATING => ComponentAction::ChooseReviewRating,
        _ => return None,
    };
    Some((action, token))
}

pub fn parse_modal(custom_id: &str) -> Option<(ModalAction, &str)> {
    let (action, token) = split(custom_id)?;
    let action = match action {
        QC_SUBMIT => ModalAction::SubmitQualityControl,
        QC_DENY_REASON => ModalAction::DenyQualityControl,
        LOA_DENY_REASON => ModalAction::DenyLeave,
        _ => return None,
    };
    Some((action, token))
}
