use crate::TagId;

/// Advance the confirmation streak for one detector reading.
///
/// A reading equal to `previous` extends the streak, any other tag restarts it at 1.
/// `current == None` is a frame without detection: the streak is kept as-is and nothing
/// is confirmed that frame. Returns the new count and whether it reached `threshold`.
pub fn confirm(previous: Option<TagId>, current: Option<TagId>, count: u32, threshold: u32) -> (u32, bool) {
    let Some(cur) = current else {
        return (count, false);
    };
    let count = if previous == Some(cur) { count.saturating_add(1) } else { 1 };
    (count, count >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: TagId = TagId(7);
    const B: TagId = TagId(11);

    #[test]
    fn same_tag_reaches_threshold() {
        assert_eq!(confirm(Some(A), Some(A), 2, 3), (3, true));
    }

    #[test]
    fn different_tag_restarts_streak() {
        assert_eq!(confirm(Some(A), Some(B), 5, 3), (1, false));
    }

    #[test]
    fn first_reading_starts_at_one() {
        assert_eq!(confirm(None, Some(A), 0, 3), (1, false));
    }

    #[test]
    fn missing_reading_pauses_streak() {
        assert_eq!(confirm(Some(A), None, 2, 3), (2, false));
        // and the streak continues afterwards
        assert_eq!(confirm(Some(A), Some(A), 2, 3), (3, true));
    }

    #[test]
    fn threshold_one_confirms_immediately() {
        assert_eq!(confirm(None, Some(B), 0, 1), (1, true));
    }

    #[test]
    fn sequence_with_gaps() {
        let reads = [Some(A), None, Some(A), Some(B), Some(B), None, Some(B)];
        let mut last = None;
        let mut count = 0;
        let mut confirmed_at = None;
        for (i, r) in reads.iter().enumerate() {
            let (c, ok) = confirm(last, *r, count, 3);
            count = c;
            if r.is_some() { last = *r; }
            if ok && confirmed_at.is_none() { confirmed_at = Some(i); }
        }
        assert_eq!(confirmed_at, Some(6));
        assert_eq!(last, Some(B));
    }
}
