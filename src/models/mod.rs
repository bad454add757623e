pub mod account;
pub mod assignment;
pub mod bulletin;
pub mod format;
pub mod recording;
pub mod review;
pub mod score;
pub mod section;

pub use account::{AccountStatus, UserAccount};
pub use assignment::{Assignment, AssignmentStatus, UserAssignment};
pub use bulletin::{Announcement, Tournament};
pub use format::DebateFormat;
pub use recording::RecordingHandle;
pub use review::{ReviewScores, ReviewSubmission};
pub use score::PracticeScore;
pub use section::Section;
