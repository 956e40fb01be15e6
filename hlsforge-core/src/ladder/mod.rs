pub mod error;
pub mod models;
pub mod planner;

pub use error::{LadderError, LadderResult};
pub use models::{RenditionDescriptor, RenditionLadder, SourceDimensions, Tier, TierPolicy};
pub use planner::plan_ladder;
