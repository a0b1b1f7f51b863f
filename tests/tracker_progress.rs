// tests/tracker_progress.rs

use proptest::prelude::*;

use plotfarm::tracker::compute_progress;

#[test]
fn mid_phase_example() {
    let p = compute_progress("2", "3", "16", "32");
    assert!((p - 45.0).abs() < 1e-6, "got {p}");
}

#[test]
fn copy_and_final_are_fixed() {
    assert_eq!(compute_progress("copy", "7", "127", "128"), 95.0);
    assert_eq!(compute_progress("final", "", "", ""), 99.0);
}

#[test]
fn unparsable_values_fall_back() {
    // p=1, t=1, b=1, n=128
    let expected = 30.0 / 7.0 + 4.28571428571 / 128.0;
    let p = compute_progress("init", "", "x", "");
    assert!((p - expected).abs() < 1e-9, "got {p}");
}

#[test]
fn phase_start_is_a_multiple_of_thirty() {
    let p = compute_progress("3", "0", "0", "128");
    assert!((p - 60.0).abs() < 1e-9);
}

proptest! {
    #[test]
    fn monotone_in_table(phase in 1u32..=4, t in 0u32..7, b in 0u32..128) {
        let lo = compute_progress(&phase.to_string(), &t.to_string(), &b.to_string(), "128");
        let hi = compute_progress(&phase.to_string(), &(t + 1).to_string(), &b.to_string(), "128");
        prop_assert!(hi > lo);
    }

    #[test]
    fn monotone_in_bucket(phase in 1u32..=4, t in 0u32..=7, b in 0u32..127, n in 1u32..=256) {
        let lo = compute_progress(&phase.to_string(), &t.to_string(), &b.to_string(), &n.to_string());
        let hi = compute_progress(&phase.to_string(), &t.to_string(), &(b + 1).to_string(), &n.to_string());
        prop_assert!(hi > lo);
    }
}
