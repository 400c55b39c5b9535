use chrono::NaiveDate;

pub const ANNOTATION_LANES: usize = 6;
pub const MIN_DAY_GAP: i64 = 20;

/// Greedy lane assignment for event markers.
///
/// Lanes are scanned from 0 upward; the first lane whose last-placed date is
/// unset or at least `min_day_gap` days back wins. When every lane was used
/// inside the gap window the event falls back to lane 0 and the overlap is
/// accepted. The result is a pure function of the chronological input.
pub fn assign_levels(dates: &[NaiveDate], lanes: usize, min_day_gap: i64) -> Vec<usize> {
    if lanes == 0 {
        return vec![0; dates.len()];
    }
    let mut last_placed: Vec<Option<NaiveDate>> = vec![None; lanes];
    let mut levels = Vec::with_capacity(dates.len());
    for &date in dates {
        let lane = (0..lanes)
            .find(|&lane| match last_placed[lane] {
                None => true,
                Some(last) => (date - last).num_days() >= min_day_gap,
            })
            .unwrap_or(0);
        last_placed[lane] = Some(date);
        levels.push(lane);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn repeated_invocations_agree() {
        let dates = vec![
            date(2023, 3, 14),
            date(2023, 3, 14),
            date(2023, 3, 21),
            date(2023, 5, 10),
            date(2023, 5, 23),
        ];
        let first = assign_levels(&dates, ANNOTATION_LANES, MIN_DAY_GAP);
        let second = assign_levels(&dates, ANNOTATION_LANES, MIN_DAY_GAP);
        assert_eq!(first, second);
    }

    #[test]
    fn close_events_get_distinct_lanes() {
        let dates = vec![date(2024, 7, 18), date(2024, 7, 23), date(2024, 7, 24)];
        assert_eq!(assign_levels(&dates, ANNOTATION_LANES, MIN_DAY_GAP), [0, 1, 2]);
    }

    #[test]
    fn lane_zero_is_reused_after_the_gap() {
        let dates = vec![date(2024, 1, 1), date(2024, 1, 21), date(2024, 1, 25)];
        assert_eq!(assign_levels(&dates, ANNOTATION_LANES, MIN_DAY_GAP), [0, 0, 1]);
    }

    #[test]
    fn saturated_lanes_fall_back_to_zero() {
        let same_day: Vec<NaiveDate> = (0..7).map(|_| date(2024, 5, 13)).collect();
        assert_eq!(
            assign_levels(&same_day, ANNOTATION_LANES, MIN_DAY_GAP),
            [0, 1, 2, 3, 4, 5, 0]
        );
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(assign_levels(&[], ANNOTATION_LANES, MIN_DAY_GAP).is_empty());
    }
}
