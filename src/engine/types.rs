//! Result and state codes exchanged with the mapping engine.

/// Outcome of a mosaic insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosaicResult {
    Ok,
    /// Alignment found too few inliers; retry from a steadier pose.
    FewInliers,
    /// Any other engine code.
    Error(i32),
}

impl MosaicResult {
    pub const CODE_OK: i32 = 0;
    pub const CODE_ERROR: i32 = -1;
    pub const CODE_FEW_INLIERS: i32 = -2;

    pub fn from_code(code: i32) -> Self {
        match code {
            Self::CODE_OK => Self::Ok,
            Self::CODE_FEW_INLIERS => Self::FewInliers,
            other => Self::Error(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Ok => Self::CODE_OK,
            Self::FewInliers => Self::CODE_FEW_INLIERS,
            Self::Error(code) => *code,
        }
    }
}

/// Tracking state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineTrackingState {
    NotReady,
    NoImages,
    NotInitialized,
    Tracking,
    Lost,
}

impl EngineTrackingState {
    /// Map a raw engine code; unknown codes read as `NotReady`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::NoImages,
            1 => Self::NotInitialized,
            2 => Self::Tracking,
            3 => Self::Lost,
            _ => Self::NotReady,
        }
    }
}

impl Default for EngineTrackingState {
    fn default() -> Self {
        Self::NotReady
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mosaic_codes() {
        assert_eq!(MosaicResult::from_code(0), MosaicResult::Ok);
        assert_eq!(MosaicResult::from_code(-2), MosaicResult::FewInliers);
        assert_eq!(MosaicResult::from_code(-1), MosaicResult::Error(-1));
        assert_eq!(MosaicResult::from_code(7).code(), 7);
    }

    #[test]
    fn test_tracking_state_codes() {
        assert_eq!(EngineTrackingState::from_code(-1), EngineTrackingState::NotReady);
        assert_eq!(EngineTrackingState::from_code(2), EngineTrackingState::Tracking);
        assert_eq!(EngineTrackingState::from_code(42), EngineTrackingState::NotReady);
    }
}
