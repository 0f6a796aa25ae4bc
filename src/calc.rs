use serde::Serialize;
use std::cmp::Ordering;

/// One existing score row joined with its component weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPart {
    pub score: f64,
    pub percentage: f64,
}

/// Weighted total over the components a student actually has score rows for.
/// Absent rows never reach this function, so a student with nothing marked
/// totals 0.0 instead of being averaged over work that was never graded.
pub fn weighted_total<I>(parts: I) -> f64
where
    I: IntoIterator<Item = ScoredPart>,
{
    parts
        .into_iter()
        .map(|p| p.score * p.percentage / 100.0)
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStats {
    pub mean: f64,
    pub std_dev: f64,
    pub scored_students: usize,
}

/// Mean and population standard deviation (divide by N, not N-1) of the
/// per-student weighted totals. `None` when no student has a score row.
pub fn class_stats(totals: &[f64]) -> Option<ClassStats> {
    if totals.is_empty() {
        return None;
    }
    let n = totals.len() as f64;
    let mean = totals.iter().sum::<f64>() / n;
    let variance = totals.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / n;
    Some(ClassStats {
        mean,
        std_dev: variance.sqrt(),
        scored_students: totals.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTotal {
    pub roll_number: String,
    pub total: f64,
}

/// Ranking order for percentile banding: total descending, equal totals by
/// roll number ascending so bucket assignment is reproducible across runs.
pub fn rank_totals(totals: &mut [StudentTotal]) {
    totals.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.roll_number.cmp(&b.roll_number))
    });
}

const PERCENTILE_TILES: usize = 100;

/// NTILE-style percentile bucket (1-based) for the student at `rank`
/// (0-based) in a descending ranking of `class_size` students. When the
/// class does not divide evenly, the first `class_size % 100` buckets hold
/// one extra student each. For classes of 100 or fewer the bucket is simply
/// `rank + 1`.
pub fn percentile_bucket(rank: usize, class_size: usize) -> usize {
    debug_assert!(rank < class_size);
    let base = class_size / PERCENTILE_TILES;
    let extra = class_size % PERCENTILE_TILES;
    let oversized = (base + 1) * extra;
    if rank < oversized {
        rank / (base + 1) + 1
    } else {
        extra + (rank - oversized) / base + 1
    }
}

/// Discrete grade points, best band first.
const GRADE_POINTS: [u8; 5] = [10, 8, 6, 4, 2];

/// Percentile bucket to grade: the top decile takes 10, then 8/6/4 down to
/// the 30th/60th/80th boundaries, 2 below that.
pub fn grade_for_bucket(bucket: usize) -> u8 {
    match bucket {
        0..=10 => 10,
        11..=30 => 8,
        31..=60 => 6,
        61..=80 => 4,
        _ => 2,
    }
}

pub fn band_linear(rank: usize, class_size: usize) -> u8 {
    grade_for_bucket(percentile_bucket(rank, class_size))
}

/// z-score banding. A class with zero spread has every total equal to the
/// mean, so z is pinned at 0 and the whole class bands at 8.
pub fn band_gaussian(total: f64, stats: &ClassStats) -> u8 {
    if stats.std_dev == 0.0 {
        return 8;
    }
    let z = (total - stats.mean) / stats.std_dev;
    if z >= 1.0 {
        10
    } else if z >= 0.0 {
        8
    } else if z >= -1.0 {
        6
    } else if z >= -2.0 {
        4
    } else {
        2
    }
}

/// Smallest discrete band that meets or beats `target`. Targets arrive from
/// a slider with 0.1 steps, not a band picker, so 8.3 reads as "at least the
/// 10 band". `None` when the target sits above the best band.
pub fn band_at_least(target: f64) -> Option<u8> {
    GRADE_POINTS
        .iter()
        .rev()
        .copied()
        .find(|&g| f64::from(g) >= target)
}

/// Weighted-total threshold that lands the gaussian band `grade` under the
/// current class statistics. Grade 2 is the floor: any total qualifies, so
/// there is no threshold to meet.
pub fn required_total_gaussian(grade: u8, stats: &ClassStats) -> Option<f64> {
    let z = match grade {
        10 => 1.0,
        8 => 0.0,
        6 => -1.0,
        4 => -2.0,
        _ => return None,
    };
    Some(stats.mean + z * stats.std_dev)
}

/// Weighted-total threshold that lands the linear band `grade` given the
/// current descending ranking: the total of the worst-ranked student still
/// inside the band's last percentile bucket. This is a static snapshot;
/// scoring the predicted marks will itself move the ranking.
pub fn required_total_linear(grade: u8, ranked: &[StudentTotal]) -> Option<f64> {
    let max_bucket = match grade {
        10 => 10,
        8 => 30,
        6 => 60,
        4 => 80,
        _ => return None,
    };
    let class_size = ranked.len();
    let mut threshold = None;
    for (rank, entry) in ranked.iter().enumerate() {
        if percentile_bucket(rank, class_size) <= max_bucket {
            threshold = Some(entry.total);
        } else {
            break;
        }
    }
    threshold
}

/// Outcome of a required-marks prediction. `required_score` is the uniform
/// mark needed on every remaining component, clamped to [0, 100];
/// `feasible` is false when the clamp was hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub current_total: f64,
    pub remaining_weight: f64,
    pub required_score: f64,
    pub feasible: bool,
}

/// Solve `current + s * remaining / 100 = threshold` for the uniform score
/// `s` across the remaining components. Callers guarantee `remaining > 0`.
pub fn solve_required_score(
    current_total: f64,
    remaining_weight: f64,
    threshold: f64,
) -> Prediction {
    let raw = (threshold - current_total) * 100.0 / remaining_weight;
    Prediction {
        current_total,
        remaining_weight,
        required_score: raw.clamp(0.0, 100.0),
        feasible: raw <= 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(values: &[f64]) -> Vec<StudentTotal> {
        values
            .iter()
            .enumerate()
            .map(|(i, &total)| StudentTotal {
                roll_number: format!("S{:03}", i + 1),
                total,
            })
            .collect()
    }

    #[test]
    fn weighted_total_sums_score_times_weight() {
        let total = weighted_total(vec![
            ScoredPart {
                score: 100.0,
                percentage: 20.0,
            },
            ScoredPart {
                score: 50.0,
                percentage: 30.0,
            },
        ]);
        assert!((total - 35.0).abs() < 1e-9, "got {total}");
    }

    #[test]
    fn weighted_total_of_nothing_is_zero() {
        assert_eq!(weighted_total(Vec::new()), 0.0);
    }

    #[test]
    fn weighted_total_ignores_component_order() {
        let parts = vec![
            ScoredPart {
                score: 80.0,
                percentage: 30.0,
            },
            ScoredPart {
                score: 60.0,
                percentage: 50.0,
            },
            ScoredPart {
                score: 90.0,
                percentage: 20.0,
            },
        ];
        let mut reversed = parts.clone();
        reversed.reverse();
        assert_eq!(weighted_total(parts), weighted_total(reversed));
    }

    #[test]
    fn unscored_components_do_not_dilute_the_total() {
        // One scored component out of three; the unscored two contribute
        // nothing rather than dragging the total toward an average.
        let total = weighted_total(vec![ScoredPart {
            score: 100.0,
            percentage: 20.0,
        }]);
        assert!((total - 20.0).abs() < 1e-9, "got {total}");
    }

    #[test]
    fn class_stats_uses_population_std_dev() {
        let stats = class_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0])
            .expect("non-empty class has stats");
        assert!((stats.mean - 5.0).abs() < 1e-9);
        // Population stddev of this set is exactly 2; the sample version
        // would give ~2.138.
        assert!((stats.std_dev - 2.0).abs() < 1e-9, "got {}", stats.std_dev);
        assert_eq!(stats.scored_students, 8);
    }

    #[test]
    fn class_stats_of_empty_class_is_none() {
        assert!(class_stats(&[]).is_none());
    }

    #[test]
    fn a_single_student_class_has_zero_spread() {
        let stats = class_stats(&[73.5]).expect("one student is enough");
        assert!((stats.mean - 73.5).abs() < 1e-9);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.scored_students, 1);
    }

    #[test]
    fn ranking_breaks_ties_by_roll_number() {
        let mut ranked = vec![
            StudentTotal {
                roll_number: "S2".into(),
                total: 70.0,
            },
            StudentTotal {
                roll_number: "S3".into(),
                total: 90.0,
            },
            StudentTotal {
                roll_number: "S1".into(),
                total: 70.0,
            },
        ];
        rank_totals(&mut ranked);
        let order: Vec<&str> = ranked.iter().map(|t| t.roll_number.as_str()).collect();
        assert_eq!(order, ["S3", "S1", "S2"]);
    }

    #[test]
    fn buckets_match_rank_for_small_classes() {
        for class_size in [1, 10, 57, 100] {
            for rank in 0..class_size {
                assert_eq!(
                    percentile_bucket(rank, class_size),
                    rank + 1,
                    "rank {rank} of {class_size}"
                );
            }
        }
    }

    #[test]
    fn uneven_classes_front_load_the_extra_students() {
        // 250 students over 100 buckets: buckets 1..=50 hold 3, the rest 2.
        assert_eq!(percentile_bucket(0, 250), 1);
        assert_eq!(percentile_bucket(2, 250), 1);
        assert_eq!(percentile_bucket(3, 250), 2);
        assert_eq!(percentile_bucket(149, 250), 50);
        assert_eq!(percentile_bucket(150, 250), 51);
        assert_eq!(percentile_bucket(249, 250), 100);
    }

    #[test]
    fn linear_bands_change_exactly_at_the_bucket_boundaries() {
        // With 100 students, rank k (0-based) sits in bucket k + 1.
        assert_eq!(band_linear(9, 100), 10);
        assert_eq!(band_linear(10, 100), 8);
        assert_eq!(band_linear(29, 100), 8);
        assert_eq!(band_linear(30, 100), 6);
        assert_eq!(band_linear(59, 100), 6);
        assert_eq!(band_linear(60, 100), 4);
        assert_eq!(band_linear(79, 100), 4);
        assert_eq!(band_linear(80, 100), 2);
        assert_eq!(band_linear(99, 100), 2);
    }

    #[test]
    fn a_tiny_class_lands_entirely_in_the_top_decile() {
        // Ten students spread over 100 buckets occupy buckets 1..=10, so
        // everyone bands at 10 under the linear scheme.
        for rank in 0..10 {
            assert_eq!(band_linear(rank, 10), 10);
        }
    }

    #[test]
    fn gaussian_bands_are_inclusive_at_the_z_boundaries() {
        let stats = ClassStats {
            mean: 50.0,
            std_dev: 10.0,
            scored_students: 40,
        };
        assert_eq!(band_gaussian(60.0, &stats), 10);
        assert_eq!(band_gaussian(59.9, &stats), 8);
        assert_eq!(band_gaussian(50.0, &stats), 8);
        assert_eq!(band_gaussian(49.9, &stats), 6);
        assert_eq!(band_gaussian(40.0, &stats), 6);
        assert_eq!(band_gaussian(39.9, &stats), 4);
        assert_eq!(band_gaussian(30.0, &stats), 4);
        assert_eq!(band_gaussian(29.9, &stats), 2);
    }

    #[test]
    fn zero_spread_bands_the_whole_class_at_eight() {
        let stats = ClassStats {
            mean: 62.5,
            std_dev: 0.0,
            scored_students: 12,
        };
        assert_eq!(band_gaussian(62.5, &stats), 8);
    }

    #[test]
    fn fractional_targets_round_up_to_the_next_band() {
        assert_eq!(band_at_least(8.0), Some(8));
        assert_eq!(band_at_least(8.3), Some(10));
        assert_eq!(band_at_least(10.0), Some(10));
        assert_eq!(band_at_least(4.1), Some(6));
        assert_eq!(band_at_least(1.0), Some(2));
        assert_eq!(band_at_least(10.1), None);
    }

    #[test]
    fn gaussian_threshold_follows_mean_plus_z_sigma() {
        let stats = ClassStats {
            mean: 50.0,
            std_dev: 8.0,
            scored_students: 30,
        };
        assert_eq!(required_total_gaussian(10, &stats), Some(58.0));
        assert_eq!(required_total_gaussian(8, &stats), Some(50.0));
        assert_eq!(required_total_gaussian(6, &stats), Some(42.0));
        assert_eq!(required_total_gaussian(4, &stats), Some(34.0));
        assert_eq!(required_total_gaussian(2, &stats), None);
    }

    #[test]
    fn linear_threshold_is_the_last_total_inside_the_band() {
        // 100 students with totals 100, 99, ..., 1; bucket = rank + 1.
        let values: Vec<f64> = (1..=100).rev().map(f64::from).collect();
        let ranked = totals(&values);
        assert_eq!(required_total_linear(10, &ranked), Some(91.0));
        assert_eq!(required_total_linear(8, &ranked), Some(71.0));
        assert_eq!(required_total_linear(6, &ranked), Some(41.0));
        assert_eq!(required_total_linear(4, &ranked), Some(21.0));
        assert_eq!(required_total_linear(2, &ranked), None);
    }

    #[test]
    fn required_score_solves_the_weighted_equation() {
        // 20 points banked, 80% of the course outstanding, threshold 50:
        // s = (50 - 20) * 100 / 80.
        let p = solve_required_score(20.0, 80.0, 50.0);
        assert!(
            (p.required_score - 37.5).abs() < 1e-9,
            "got {}",
            p.required_score
        );
        assert!(p.feasible);
    }

    #[test]
    fn already_past_the_threshold_requires_nothing() {
        let p = solve_required_score(60.0, 40.0, 50.0);
        assert_eq!(p.required_score, 0.0);
        assert!(p.feasible);
    }

    #[test]
    fn out_of_reach_thresholds_clamp_and_flag() {
        let p = solve_required_score(10.0, 20.0, 50.0);
        assert_eq!(p.required_score, 100.0);
        assert!(!p.feasible);
    }

    #[test]
    fn prediction_serializes_with_camel_case_keys() {
        let p = solve_required_score(20.0, 80.0, 50.0);
        let value = serde_json::to_value(p).expect("serialize prediction");
        assert_eq!(value.get("currentTotal").and_then(|v| v.as_f64()), Some(20.0));
        assert_eq!(value.get("remainingWeight").and_then(|v| v.as_f64()), Some(80.0));
        assert_eq!(value.get("requiredScore").and_then(|v| v.as_f64()), Some(37.5));
        assert_eq!(value.get("feasible").and_then(|v| v.as_bool()), Some(true));
    }
}
