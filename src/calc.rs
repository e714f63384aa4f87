use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Display rounding used everywhere a percentage or GPA leaves this module:
/// `Int(100*x + 0.5) / 100`. Half rounds up, and repeated application is a
/// fixed point, so recomputing on unchanged input cannot drift.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Out-of-domain components (negative, NaN, infinite) collapse to 0 so a bad
/// record degrades a view instead of crashing it.
fn sanitize(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x
    } else {
        0.0
    }
}

/// Percentage-to-letter step table. Inclusive lower bounds, monotone.
pub fn letter_grade(percentage: f64) -> &'static str {
    const STEPS: [(f64, &str); 11] = [
        (97.0, "A+"),
        (93.0, "A"),
        (90.0, "A-"),
        (87.0, "B+"),
        (83.0, "B"),
        (80.0, "B-"),
        (77.0, "C+"),
        (73.0, "C"),
        (70.0, "C-"),
        (67.0, "D+"),
        (65.0, "D"),
    ];
    for (cut, letter) in STEPS {
        if percentage >= cut {
            return letter;
        }
    }
    "F"
}

#[derive(Debug, Clone)]
pub struct CategoryMark {
    pub category: String,
    pub weight: f64,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub category: String,
    pub percentage: f64,
    pub graded_count: usize,
    pub total_weight: f64,
}

/// Per-category weighted standing over the graded assignments only.
/// Weights are category-local contribution points; they are not normalized
/// and need not sum to 100.
pub fn category_breakdown(marks: &[CategoryMark]) -> Vec<CategoryBreakdown> {
    // (total weight, earned points, graded count), keyed by category.
    let mut acc: BTreeMap<&str, (f64, f64, usize)> = BTreeMap::new();

    for m in marks {
        let Some(grade) = m.grade else {
            continue;
        };
        let weight = sanitize(m.weight);
        let grade = sanitize(grade);
        let entry = acc.entry(m.category.as_str()).or_insert((0.0, 0.0, 0));
        entry.0 += weight;
        entry.1 += grade * weight / 100.0;
        entry.2 += 1;
    }

    acc.into_iter()
        .map(|(category, (total, earned, count))| {
            let percentage = if total > 0.0 {
                round_off_2_decimals(earned / total * 100.0)
            } else {
                0.0
            };
            CategoryBreakdown {
                category: category.to_string(),
                percentage,
                graded_count: count,
                total_weight: total,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct CourseStanding {
    pub current_grade: f64,
    pub credits: i64,
}

/// Credit-weighted GPA on a 4.0 scale. The 0-100 percentage maps linearly
/// onto 0.0-4.0 (100% -> 4.0); no letter-grade-point table is applied.
pub fn compute_gpa(courses: &[CourseStanding]) -> f64 {
    let mut total_credits = 0.0_f64;
    let mut weighted_sum = 0.0_f64;

    for c in courses {
        let credits = sanitize(c.credits as f64);
        total_credits += credits;
        weighted_sum += sanitize(c.current_grade) * credits;
    }

    if total_credits > 0.0 {
        (weighted_sum / total_credits / 100.0) * 4.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct PredictMark {
    pub assignment_id: i64,
    pub weight: Option<f64>,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub current_aggregate: f64,
    pub predicted_aggregate: f64,
    pub impact: f64,
}

/// Overrides arrive from form inputs, so a value may be a number, a numeric
/// string, or junk. Junk means "no override", never 0.
pub fn parse_override(raw: &serde_json::Value) -> Option<f64> {
    let parsed = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// What-if projection across a course's full assignment list. An ungraded
/// assignment counts as 0 in the current aggregate; an override replaces the
/// current grade only when it parses. Zero total weight yields zeros, not an
/// error.
pub fn predict(marks: &[PredictMark], overrides: &HashMap<i64, serde_json::Value>) -> Prediction {
    let mut total_weight = 0.0_f64;
    let mut current_weighted = 0.0_f64;
    let mut predicted_weighted = 0.0_f64;

    for m in marks {
        let weight = sanitize(m.weight.unwrap_or(0.0));
        let current = sanitize(m.grade.unwrap_or(0.0));
        let hypothetical = overrides
            .get(&m.assignment_id)
            .and_then(parse_override)
            .map(sanitize)
            .unwrap_or(current);

        total_weight += weight;
        current_weighted += current * weight;
        predicted_weighted += hypothetical * weight;
    }

    let current_aggregate = if total_weight > 0.0 {
        current_weighted / total_weight
    } else {
        0.0
    };
    let predicted_aggregate = if total_weight > 0.0 {
        predicted_weighted / total_weight
    } else {
        0.0
    };
    let impact = predicted_aggregate - current_aggregate;

    Prediction {
        current_aggregate: round_off_2_decimals(current_aggregate),
        predicted_aggregate: round_off_2_decimals(predicted_aggregate),
        impact: round_off_2_decimals(impact),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WeightedMark {
    pub weight: f64,
    pub grade: Option<f64>,
}

/// Cached course grade: weight-weighted mean over graded assignments.
/// Ungraded work is excluded from the denominator entirely rather than
/// dragged in as 0.
pub fn current_course_grade(marks: &[WeightedMark]) -> f64 {
    let mut denom = 0.0_f64;
    let mut sum = 0.0_f64;

    for m in marks {
        let Some(grade) = m.grade else {
            continue;
        };
        let weight = sanitize(m.weight);
        denom += weight;
        sum += sanitize(grade) * weight;
    }

    if denom > 0.0 {
        round_off_2_decimals(sum / denom)
    } else {
        0.0
    }
}

pub fn completion_progress(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_off_2_decimals(completed as f64 / total as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn marks(rows: &[(i64, f64, Option<f64>)]) -> Vec<PredictMark> {
        rows.iter()
            .map(|&(assignment_id, weight, grade)| PredictMark {
                assignment_id,
                weight: Some(weight),
                grade,
            })
            .collect()
    }

    #[test]
    fn round_off_is_half_up_and_idempotent() {
        assert_eq!(round_off_2_decimals(0.0), 0.0);
        assert_eq!(round_off_2_decimals(83.333333), 83.33);
        assert_eq!(round_off_2_decimals(83.335), 83.34);
        assert_eq!(round_off_2_decimals(round_off_2_decimals(83.335)), 83.34);
    }

    #[test]
    fn letter_grade_matches_step_table() {
        assert_eq!(letter_grade(100.0), "A+");
        assert_eq!(letter_grade(97.0), "A+");
        assert_eq!(letter_grade(96.9), "A");
        assert_eq!(letter_grade(93.0), "A");
        assert_eq!(letter_grade(90.0), "A-");
        assert_eq!(letter_grade(87.0), "B+");
        assert_eq!(letter_grade(83.0), "B");
        assert_eq!(letter_grade(80.0), "B-");
        assert_eq!(letter_grade(77.0), "C+");
        assert_eq!(letter_grade(73.0), "C");
        assert_eq!(letter_grade(70.0), "C-");
        assert_eq!(letter_grade(67.0), "D+");
        assert_eq!(letter_grade(65.0), "D");
        assert_eq!(letter_grade(64.9), "F");
        assert_eq!(letter_grade(0.0), "F");
    }

    #[test]
    fn letter_grade_is_monotone_over_the_scale() {
        let rank = |letter: &str| {
            [
                "F", "D", "D+", "C-", "C", "C+", "B-", "B", "B+", "A-", "A", "A+",
            ]
            .iter()
            .position(|l| *l == letter)
            .expect("known letter")
        };
        let mut prev = rank(letter_grade(0.0));
        for tenth in 1..=1000 {
            let cur = rank(letter_grade(tenth as f64 / 10.0));
            assert!(cur >= prev, "letter rank dropped at {}", tenth as f64 / 10.0);
            prev = cur;
        }
    }

    #[test]
    fn gpa_is_linear_and_credit_weighted() {
        assert_eq!(compute_gpa(&[]), 0.0);
        assert_eq!(
            compute_gpa(&[CourseStanding {
                current_grade: 100.0,
                credits: 3
            }]),
            4.0
        );
        let gpa = compute_gpa(&[
            CourseStanding {
                current_grade: 80.0,
                credits: 3,
            },
            CourseStanding {
                current_grade: 90.0,
                credits: 1,
            },
        ]);
        assert!((gpa - 3.25).abs() < 1e-12);
    }

    #[test]
    fn predict_without_overrides_has_zero_impact() {
        let input = marks(&[(1, 50.0, Some(80.0)), (2, 50.0, Some(60.0))]);
        let p = predict(&input, &HashMap::new());
        assert_eq!(p.current_aggregate, 70.0);
        assert_eq!(p.predicted_aggregate, 70.0);
        assert_eq!(p.impact, 0.0);
    }

    #[test]
    fn predict_applies_parsed_overrides() {
        let input = marks(&[(1, 50.0, Some(80.0)), (2, 50.0, Some(60.0))]);
        let overrides = HashMap::from([(1, json!(100))]);
        let p = predict(&input, &overrides);
        assert_eq!(p.current_aggregate, 70.0);
        assert_eq!(p.predicted_aggregate, 85.0);
        assert_eq!(p.impact, 15.0);
    }

    #[test]
    fn predict_accepts_numeric_strings_and_ignores_junk() {
        let input = marks(&[(1, 50.0, Some(80.0)), (2, 50.0, Some(60.0))]);

        let overrides = HashMap::from([(1, json!("100")), (2, json!("not a number"))]);
        let p = predict(&input, &overrides);
        assert_eq!(p.predicted_aggregate, 85.0);

        // An override of 0 is a real override, not "keep the current grade".
        let overrides = HashMap::from([(1, json!("0"))]);
        let p = predict(&input, &overrides);
        assert_eq!(p.predicted_aggregate, 30.0);
        assert_eq!(p.impact, -40.0);
    }

    #[test]
    fn predict_treats_ungraded_as_zero_in_current() {
        let input = marks(&[(1, 50.0, Some(80.0)), (2, 50.0, None)]);
        let p = predict(&input, &HashMap::new());
        assert_eq!(p.current_aggregate, 40.0);

        let overrides = HashMap::from([(2, json!(90))]);
        let p = predict(&input, &overrides);
        assert_eq!(p.predicted_aggregate, 85.0);
        assert_eq!(p.impact, 45.0);
    }

    #[test]
    fn predict_with_zero_total_weight_yields_zeros() {
        let p = predict(&[], &HashMap::new());
        assert_eq!(p.current_aggregate, 0.0);
        assert_eq!(p.predicted_aggregate, 0.0);
        assert_eq!(p.impact, 0.0);

        let input = vec![PredictMark {
            assignment_id: 1,
            weight: None,
            grade: Some(90.0),
        }];
        let p = predict(&input, &HashMap::from([(1, json!(50))]));
        assert_eq!(p.current_aggregate, 0.0);
        assert_eq!(p.predicted_aggregate, 0.0);
        assert_eq!(p.impact, 0.0);
    }

    #[test]
    fn category_breakdown_weights_within_category() {
        let rows = vec![
            CategoryMark {
                category: "quiz".to_string(),
                weight: 20.0,
                grade: Some(100.0),
            },
            CategoryMark {
                category: "quiz".to_string(),
                weight: 10.0,
                grade: Some(50.0),
            },
            CategoryMark {
                category: "exam".to_string(),
                weight: 40.0,
                grade: None,
            },
        ];
        let breakdown = category_breakdown(&rows);

        // Ungraded exam contributes nothing, so only quiz appears.
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].category, "quiz");
        assert_eq!(breakdown[0].percentage, 83.33);
        assert_eq!(breakdown[0].graded_count, 2);
        assert_eq!(breakdown[0].total_weight, 30.0);
    }

    #[test]
    fn category_breakdown_zero_weight_is_zero_percent() {
        let rows = vec![CategoryMark {
            category: "homework".to_string(),
            weight: 0.0,
            grade: Some(95.0),
        }];
        let breakdown = category_breakdown(&rows);
        assert_eq!(breakdown[0].percentage, 0.0);
    }

    #[test]
    fn current_course_grade_excludes_ungraded_weight() {
        let rows = vec![
            WeightedMark {
                weight: 50.0,
                grade: Some(80.0),
            },
            WeightedMark {
                weight: 50.0,
                grade: None,
            },
        ];
        assert_eq!(current_course_grade(&rows), 80.0);
        assert_eq!(current_course_grade(&[]), 0.0);
    }

    #[test]
    fn out_of_domain_inputs_are_normalized_not_fatal() {
        let input = vec![
            PredictMark {
                assignment_id: 1,
                weight: Some(-25.0),
                grade: Some(f64::NAN),
            },
            PredictMark {
                assignment_id: 2,
                weight: Some(50.0),
                grade: Some(70.0),
            },
        ];
        let p = predict(&input, &HashMap::new());
        assert_eq!(p.current_aggregate, 70.0);

        let gpa = compute_gpa(&[CourseStanding {
            current_grade: f64::NAN,
            credits: 3,
        }]);
        assert_eq!(gpa, 0.0);
    }

    #[test]
    fn completion_progress_handles_empty_course() {
        assert_eq!(completion_progress(0, 0), 0.0);
        assert_eq!(completion_progress(1, 3), 33.33);
        assert_eq!(completion_progress(3, 3), 100.0);
    }
}
