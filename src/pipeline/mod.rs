//! Staged spam-check pipeline.
//!
//! Raw addresses flow through:
//! 1. `SelectUsers` — resolve each address, forward each distinct user once
//! 2. `SelectMessages` — list message ids per fixed-size batch of users
//! 3. `CheckSpam` — classify each id on a fixed worker pool
//! 4. `CombineResults` — sort verdicts (spam first, then id) into report lines
//!
//! Stages are chained by `run_pipeline` over unbounded queues. Only the last
//! stage orders its output.

pub mod check_spam;
pub mod combine_results;
pub mod orchestrator;
pub mod queue;
pub mod select_messages;
pub mod select_users;
pub mod spam;
pub mod types;

pub use check_spam::CheckSpam;
pub use combine_results::CombineResults;
pub use orchestrator::{PipelineReport, Stage, run_pipeline};
pub use queue::{QueueReceiver, QueueSender, queue};
pub use select_messages::SelectMessages;
pub use select_users::SelectUsers;
pub use spam::{SpamPipeline, SpamReport};
pub use types::{Item, MsgData, MsgId, User};
