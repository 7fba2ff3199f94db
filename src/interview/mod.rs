//! Interview onboarding: state machine, live sessions, archival and the
//! per-guild registry.

pub mod archive;
pub mod prompts;
pub mod registry;
pub mod session;
pub mod state;

pub use archive::{ArchiveSlot, ArchiveSubject};
pub use registry::InterviewRegistry;
pub use session::{Interview, InterviewDeps, Timing};
pub use state::{Effect, InterviewState, InterviewType, Notice, ReplyOutcome};
