/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two WGS84 points, in metres.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_m(28.0, -16.0, 29.0, -16.0);
        assert!((d - 111_195.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(haversine_m(28.4578, -16.2637, 28.4578, -16.2637), 0.0);
    }

    #[test]
    fn test_symmetric() {
        let a = haversine_m(28.4578, -16.2637, 28.5083, -16.1858);
        let b = haversine_m(28.5083, -16.1858, 28.4578, -16.2637);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_known_city_pair() {
        // Santa Cruz de Tenerife to Las Palmas de Gran Canaria, roughly 88 km
        let d = haversine_m(28.4636, -16.2518, 28.1235, -15.4363);
        assert!((d - 88_300.0).abs() < 1_000.0, "got {}", d);
    }
}
