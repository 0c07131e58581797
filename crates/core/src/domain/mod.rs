pub mod claim;
pub mod decision;
pub mod ids;
pub mod leave;
pub mod review;
pub mod submission;
