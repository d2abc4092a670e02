//! Run scoring.
//!
//! A pass is always worth more than any fail, and fewer turns always beat
//! more turns. The pass floor sits at 1000 so downstream consumers can
//! threshold on it.

/// Turn count beyond which the efficiency bonus bottoms out.
const TURN_CEILING: u32 = 50;

/// Score a single run.
pub fn score_result(passed: bool, turns: u32) -> i64 {
    let efficiency = (TURN_CEILING.saturating_sub(turns.min(TURN_CEILING))) as i64;
    if passed {
        1000 + efficiency * 10
    } else {
        efficiency * 5
    }
}
