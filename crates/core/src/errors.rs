use thiserror::Error;

use crate::domain::decision::DecisionKind;
use crate::domain::ids::{RoleId, UserId};

/// Action a role check guards; selects the notice shown to a rejected member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatedAction {
    SubmitQualityControl,
    ReviewQualityControl,
    ClaimOrder,
    ApproveLeave,
    DenyLeave,
}

/// Configured resource that failed to resolve on the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    QualityControlChannel,
    QualityControlResultsChannel,
    LeaveApprovalChannel,
    ReviewChannel,
    OrderLogChannel,
    WelcomeChannel,
}

impl Resource {
    pub fn label(self) -> &'static str {
        match self {
            Self::QualityControlChannel => "quality control channel",
            Self::QualityControlResultsChannel => "quality control results channel",
            Self::LeaveApprovalChannel => "leave approval channel",
            Self::ReviewChannel => "review channel",
            Self::OrderLogChannel => "order log channel",
            Self::WelcomeChannel => "welcome channel",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no valid media URL supplied")]
    NoMediaUrls,
    #[error("malformed duration token `{0}`")]
    MalformedDuration(String),
    #[error("duration `{0}` is out of range")]
    DurationOutOfRange(String),
    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),
    #[error("`{field}` exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("unknown product category `{0}`")]
    UnknownCategory(String),
    #[error("unknown star rating `{0}`")]
    UnknownRating(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("user {user_id} lacks role {role_id} for {action:?}")]
    AuthorizationDenied { user_id: UserId, role_id: RoleId, action: GatedAction },
    #[error(transparent)]
    ValidationFailed(#[from] ValidationError),
    #[error("{} could not be resolved", .0.label())]
    ResourceUnresolvable(Resource),
    #[error("request already decided as {0:?}")]
    AlreadyDecided(DecisionKind),
    #[error("unknown or expired interaction `{0}`")]
    UnknownInteraction(String),
    #[error("platform request failed: {0}")]
    Platform(String),
}

impl WorkflowError {
    /// Short fixed notice shown privately to the invoking user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied { action, .. } => match action {
                GatedAction::SubmitQualityControl => {
                    "❌ You must be a **Designer** to use this command."
                }
                GatedAction::ReviewQualityControl => {
                    "❌ You do not have permission to review Quality Control submissions."
                }
                GatedAction::ClaimOrder => "❌ You must be a **Designer** to claim an order.",
                GatedAction::ApproveLeave => "❌ You do not have permission to approve LOAs.",
                GatedAction::DenyLeave => "❌ You do not have permission to deny LOAs.",
            },
            Self::ValidationFailed(error) => match error {
                ValidationError::NoMediaUrls => {
                    "❌ You must provide at least one valid image URL."
                }
                ValidationError::MalformedDuration(_) => {
                    "❌ Invalid format! Use `d` for days, `m` for months, or `y` for years. Example: `5d`"
                }
                ValidationError::DurationOutOfRange(_) => "❌ That duration is too long.",
                ValidationError::EmptyField(_) => "❌ Required fields cannot be empty.",
                ValidationError::TooLong { .. } => "❌ Reasons must be 1000 characters or fewer.",
                ValidationError::UnknownCategory(_) => "❌ Unknown product type selected.",
                ValidationError::UnknownRating(_) => "❌ Unknown star rating selected.",
            },
            Self::ResourceUnresolvable(resource) => match resource {
                Resource::QualityControlChannel => "❌ Quality Control channel not found.",
                Resource::QualityControlResultsChannel => {
                    "❌ Quality Control results channel not found."
                }
                Resource::LeaveApprovalChannel => "❌ Failed to find the approval channel.",
                Resource::ReviewChannel => "❌ Review channel not found.",
                Resource::OrderLogChannel => "⚠️ Order log channel not found.",
                Resource::WelcomeChannel => "❌ Welcome channel not found.",
            },
            Self::AlreadyDecided(_) => "⚠️ This request has already been decided.",
            Self::UnknownInteraction(_) => "⌛ This request is no longer active.",
            Self::Platform(_) => "❌ Something went wrong talking to Discord. Please try again.",
        }
    }
}
