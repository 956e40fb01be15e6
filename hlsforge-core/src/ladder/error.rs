use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LadderError {
    #[error("invalid source dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("tier {tier} collapses to {width}x{height} for a {source_width}x{source_height} source")]
    DegenerateRendition {
        tier: &'static str,
        width: u32,
        height: u32,
        source_width: u32,
        source_height: u32,
    },
}

pub type LadderResult<T> = std::result::Result<T, LadderError>;
