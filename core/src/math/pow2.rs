/// Smallest power of two that is `>= x`; `1` for `x <= 1`.
///
/// Saturates at the largest representable power of two.
pub fn next_pow2(x: u32) -> u32 {
    if x <= 1 {
        return 1;
    }
    x.checked_next_power_of_two().unwrap_or(1 << 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_inputs_round_to_one() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
    }

    #[test]
    fn rounds_up_to_next_power() {
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(21), 32);
        assert_eq!(next_pow2(256), 256);
        assert_eq!(next_pow2(257), 512);
    }

    #[test]
    fn rounding_is_idempotent() {
        for x in [0, 1, 2, 3, 7, 100, 1023, 4097, u32::MAX] {
            let once = next_pow2(x);
            assert_eq!(next_pow2(once), once);
            assert!(once >= x.min(1 << 31));
        }
    }
}
