use rstest::rstest;
use timbang_core::growth::{AgeBand, GrowthReference, GrowthStatus, age_in_months};

/// Reference used by the posyandu pilot: one band for 6-12 months.
fn pilot_reference() -> GrowthReference {
    GrowthReference::new(vec![AgeBand {
        age_min_months: 6,
        age_max_months: 12,
        weight_min_kg: 7.0,
        weight_max_kg: 10.0,
        height_min_cm: 65.0,
        height_max_cm: 75.0,
    }])
    .expect("well-ordered band")
}

#[rstest]
#[case(8, 8.5, 70.0, GrowthStatus::Normal)]
#[case(8, 4.0, 70.0, GrowthStatus::Underweight)]
#[case(8, 11.0, 70.0, GrowthStatus::Overweight)]
#[case(8, 8.5, 60.0, GrowthStatus::Underweight)]
#[case(8, 8.5, 80.0, GrowthStatus::Overweight)]
#[case(6, 7.0, 65.0, GrowthStatus::Normal)]
fn classifies_against_the_band(
    #[case] age_months: u32,
    #[case] weight_kg: f32,
    #[case] height_cm: f32,
    #[case] expected: GrowthStatus,
) {
    let got = pilot_reference().classify(Some(age_months), weight_kg, height_cm);
    assert_eq!(got, expected, "age={age_months} w={weight_kg} h={height_cm}");
}

#[test]
fn exact_bounds_are_inside_the_interval() {
    let reference = pilot_reference();
    assert_eq!(
        reference.classify(Some(12), 10.0, 75.0),
        GrowthStatus::Normal
    );
    assert_eq!(reference.classify(Some(6), 7.0, 65.0), GrowthStatus::Normal);
}

#[test]
fn underweight_wins_when_both_bounds_are_violated() {
    // Weight under its minimum, height over its maximum: the lower-bound
    // check runs first, like the register rule this replaces.
    assert_eq!(
        pilot_reference().classify(Some(8), 4.0, 90.0),
        GrowthStatus::Underweight
    );
}

#[rstest]
#[case(None, 8.5, 70.0)] // unknown age
#[case(Some(24), 8.5, 70.0)] // no band covers this age
#[case(Some(8), f32::NAN, 70.0)]
#[case(Some(8), 8.5, f32::INFINITY)]
#[case(Some(8), -1.0, 70.0)]
fn ambiguous_inputs_degrade_to_needs_attention(
    #[case] age_months: Option<u32>,
    #[case] weight_kg: f32,
    #[case] height_cm: f32,
) {
    assert_eq!(
        pilot_reference().classify(age_months, weight_kg, height_cm),
        GrowthStatus::NeedsAttention
    );
}

#[test]
fn classification_is_deterministic() {
    let reference = pilot_reference();
    let first = reference.classify(Some(8), 8.5, 70.0);
    for _ in 0..100 {
        assert_eq!(reference.classify(Some(8), 8.5, 70.0), first);
    }
}

#[test]
fn first_covering_band_wins_on_overlap() {
    let reference = GrowthReference::new(vec![
        AgeBand {
            age_min_months: 0,
            age_max_months: 12,
            weight_min_kg: 6.0,
            weight_max_kg: 9.0,
            height_min_cm: 55.0,
            height_max_cm: 75.0,
        },
        AgeBand {
            age_min_months: 6,
            age_max_months: 24,
            weight_min_kg: 8.0,
            weight_max_kg: 13.0,
            height_min_cm: 65.0,
            height_max_cm: 90.0,
        },
    ])
    .expect("bands");
    // Age 8 falls in both; the first band's interval decides.
    assert_eq!(reference.classify(Some(8), 9.5, 70.0), GrowthStatus::Overweight);
}

#[test]
fn month_arithmetic_feeds_the_band_lookup() {
    let birth = chrono::NaiveDate::from_ymd_opt(2025, 12, 5).expect("date");
    let measured = chrono::NaiveDate::from_ymd_opt(2026, 8, 5).expect("date");
    assert_eq!(age_in_months(birth, measured), Some(8));
    assert_eq!(
        pilot_reference().classify(age_in_months(birth, measured), 8.5, 70.0),
        GrowthStatus::Normal
    );
}
