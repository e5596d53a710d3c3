use fizzq::rule::classify;

#[test]
fn multiples_of_fifteen_are_fizz_buzz() {
    for n in [0, 15, 30, 45, -15, 9_000_000_000_000_000_i64 / 15 * 15] {
        assert_eq!(classify(n), "fizz-buzz", "n = {n}");
    }
}

#[test]
fn classification_matches_divisibility_over_a_range() {
    for n in -1000_i64..=1000 {
        let expected = if n % 15 == 0 {
            "fizz-buzz".to_string()
        } else if n % 3 == 0 {
            "fizz".to_string()
        } else if n % 5 == 0 {
            "buzz".to_string()
        } else {
            n.to_string()
        };
        assert_eq!(classify(n), expected, "n = {n}");
    }
}

#[test]
fn scenario_values() {
    assert_eq!(classify(15), "fizz-buzz");
    assert_eq!(classify(7), "7");
    assert_eq!(classify(9), "fizz");
    assert_eq!(classify(10), "buzz");
    assert_eq!(classify(-7), "-7");
}

#[test]
fn extremes_do_not_overflow() {
    assert_eq!(classify(i64::MAX), i64::MAX.to_string());
    assert_eq!(classify(i64::MIN), i64::MIN.to_string());
}
