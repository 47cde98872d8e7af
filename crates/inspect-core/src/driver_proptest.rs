#[cfg(test)]
mod proptest_driver {
    use crate::classifier::classify;
    use crate::driver::{ActuatorDriver, WiringMode};
    use crate::error::DriverError;
    use crate::measurement::MeasurementRecord;
    use crate::register_sim::SimulatedRegisters;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn wiring() -> impl Strategy<Value = WiringMode> {
        prop_oneof![Just(WiringMode::EncoderAbsent), Just(WiringMode::EncoderPresent)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        // Property: every in-range fraction writes round(65535 * (1 - f)) to the PWM register
        #[test]
        fn duty_cycle_raw_value(fraction in 0.0f64..=1.0, mode in wiring()) {
            let bank = SimulatedRegisters::new();
            let mut driver = ActuatorDriver::new(bank.clone(), mode).unwrap();
            bank.clear_writes();

            let raw = driver.set_duty_cycle(fraction).unwrap();
            let expected = (65535.0 * (1.0 - fraction)).round() as u16;
            prop_assert_eq!(raw, expected);
            prop_assert_eq!(bank.writes_to(mode.duty_register()), vec![vec![0, expected]]);
        }

        // Property: out-of-range fractions are rejected with no register traffic
        #[test]
        fn out_of_range_duty_cycle_never_writes(
            fraction in prop_oneof![-1.0e6f64..-1.0e-9, 1.000_000_001f64..1.0e6],
            mode in wiring(),
        ) {
            let bank = SimulatedRegisters::new();
            let mut driver = ActuatorDriver::new(bank.clone(), mode).unwrap();
            bank.clear_writes();

            let result = driver.set_duty_cycle(fraction);
            let is_invalid = matches!(result, Err(DriverError::InvalidParameter { .. }));
            prop_assert!(is_invalid, "Expected InvalidParameter for {}, got {:?}", fraction, result);
            prop_assert_eq!(bank.write_count(), 0);
        }

        // Property: an even number of toggles leaves the direction line where it started
        #[test]
        fn direction_toggle_parity(toggles in 0usize..20, mode in wiring()) {
            let bank = SimulatedRegisters::new();
            let mut driver = ActuatorDriver::new(bank.clone(), mode).unwrap();
            let line = 6000 + mode.direction_line();
            for _ in 0..toggles {
                driver.toggle_direction().unwrap();
            }
            let expected = if toggles % 2 == 0 { 1 } else { 0 };
            prop_assert_eq!(bank.register(line), Some(expected));
        }

        // Property: the encoder is readable exactly when it is wired
        #[test]
        fn encoder_availability_follows_wiring(position in any::<u16>(), mode in wiring()) {
            let bank = SimulatedRegisters::new().with_register(7200, position);
            let mut driver = ActuatorDriver::new(bank, mode).unwrap();
            match driver.read_encoder() {
                Ok(value) => {
                    prop_assert!(mode.has_encoder());
                    prop_assert_eq!(value, position);
                }
                Err(DriverError::UnsupportedOperation(_)) => prop_assert!(!mode.has_encoder()),
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }

        // Property: classification is deterministic and passes iff score <= threshold
        #[test]
        fn classification_boundary(
            seq in any::<i64>(),
            before in -1_000_000i64..1_000_000,
            after in -1_000_000i64..1_000_000,
            threshold in -2_000_000i64..2_000_000,
        ) {
            let at = Utc.timestamp_opt(1_438_171_200, 0).unwrap();
            let record = MeasurementRecord { sequence_id: seq, frame_sum_before: before, frame_sum_after: after };
            let first = classify(&record, threshold, at);
            let second = classify(&record, threshold, at);

            prop_assert_eq!(first, second);
            prop_assert_eq!(first.score, before - after);
            prop_assert_eq!(first.passed, before - after <= threshold);
            prop_assert_eq!(first.sequence_id, seq);
        }
    }
}
