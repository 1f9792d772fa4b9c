/// Default calorific value of UK mains gas in MJ/m3.
pub const DEFAULT_CALORIFIC_VALUE: f64 = 39.5;

/// Tariff prices come back in pence; multiply by this to publish pounds.
pub const DEFAULT_TARIFF_SCALE: f64 = 0.01;

const VOLUME_CORRECTION: f64 = 1.02264;
const MJ_PER_KWH: f64 = 3.6;

/// Converts a gas meter reading to kWh.
pub fn gas_volume_to_energy(cubic_meters: f64, calorific_value: f64) -> f64 {
    ((cubic_meters / 1000.0) * calorific_value * VOLUME_CORRECTION) / MJ_PER_KWH
}

pub fn scale_tariff(raw_price: f64, scale: f64) -> f64 {
    raw_price * scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_volume_is_zero_energy() {
        assert_eq!(gas_volume_to_energy(0.0, DEFAULT_CALORIFIC_VALUE), 0.0);
        assert_eq!(gas_volume_to_energy(0.0, 42.0), 0.0);
    }

    #[test]
    fn test_known_value() {
        let expected = ((10.0 / 1000.0) * 39.5 * 1.02264) / 3.6;
        let result = gas_volume_to_energy(10.0, 39.5);
        assert!((result - expected).abs() < 1e-12);
        assert!((result - 0.112206).abs() < 1e-6);
    }

    #[test]
    fn test_monotonic_in_both_arguments() {
        let volumes = [0.0, 0.5, 1.0, 10.0, 250.0, 12_345.6];
        for pair in volumes.windows(2) {
            assert!(gas_volume_to_energy(pair[1], 39.5) > gas_volume_to_energy(pair[0], 39.5));
        }

        let calorific = [30.0, 37.5, 39.5, 41.0];
        for pair in calorific.windows(2) {
            assert!(gas_volume_to_energy(10.0, pair[1]) > gas_volume_to_energy(10.0, pair[0]));
        }
    }

    #[test]
    fn test_tariff_scaling() {
        assert!((scale_tariff(24.5, DEFAULT_TARIFF_SCALE) - 0.245).abs() < 1e-12);
        assert_eq!(scale_tariff(24.5, 1.0), 24.5);
    }
}
