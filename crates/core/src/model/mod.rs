mod blocks;
mod curriculum;
mod ids;
mod profile;
mod user;
mod video;

pub use blocks::{BlockKind, PageBlock, QuizBlock, QuizSummaryBlock, YouTubeBlock};
pub use curriculum::{
    CurriculumError, Hierarchy, PageVisit, QuizSubmission, Section, SectionNode, preorder,
};
pub use ids::{BlockId, HierarchyId, ParseIdError, SectionId, UserId};
pub use profile::{DEFAULT_RESEARCH_GROUP, ProfileError, ResearchGroup, UserProfile};
pub use user::UserAccount;
pub use video::{TrackingError, UserVideoView, VideoTracking};
