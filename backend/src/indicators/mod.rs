// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator helpers used by the confluence scorer.

pub mod moving_average;
pub mod rsi;
