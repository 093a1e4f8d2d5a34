use crate::Tick;

const HALF_RANGE: Tick = Tick::MAX / 2 + 1;

/// Returns whether or not a wrapping tick is newer than another
/// tick_greater_than(2,1) will return true
/// tick_greater_than(1,2) will return false
/// tick_greater_than(1,1) will return false
pub fn tick_greater_than(t1: Tick, t2: Tick) -> bool {
    ((t1 > t2) && (t1 - t2 <= HALF_RANGE)) || ((t1 < t2) && (t2 - t1 > HALF_RANGE))
}

/// Returns whether or not a wrapping tick is older than another
pub fn tick_less_than(t1: Tick, t2: Tick) -> bool {
    tick_greater_than(t2, t1)
}

/// Signed distance from `a` forward to `b`, accounting for wrap-around
///
/// # Examples
/// ```
/// # use netrep_shared::wrapping_tick_diff;
/// assert_eq!(wrapping_tick_diff(1, 2), 1);
/// assert_eq!(wrapping_tick_diff(2, 1), -1);
/// assert_eq!(wrapping_tick_diff(u32::MAX, 0), 1);
/// ```
pub fn wrapping_tick_diff(a: Tick, b: Tick) -> i32 {
    b.wrapping_sub(a) as i32
}
