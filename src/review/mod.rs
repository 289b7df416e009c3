//! Paper review lifecycle: intake, committee dispatch, status changes and
//! the reminder loop.

pub mod dispatch;
pub mod intake;
pub mod paper_id;
pub mod reminder;
pub mod status;

pub use dispatch::{send_to_committee, Recipients};
pub use intake::submit_paper;
pub use reminder::spawn_reminder_job;
pub use status::{update_expression_status, update_review_status, ReviewStatus};
