//! Wall-clock helper

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the unix epoch; clamps to zero on a pre-epoch clock
pub fn unix_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_after_2020() {
        assert!(unix_now() > 1_577_836_800);
    }
}
