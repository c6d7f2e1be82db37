//! Utilities for aligning memory

/// Round `value` up to the next multiple of `alignment`. An alignment of zero leaves the value unchanged.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    match value % alignment {
        0 => value,
        rem => value + (alignment - rem),
    }
}
