//! Great-circle distance, initial bearing, and geodetic offset. Pure
//! functions, no shared state.

use crate::model::GeoPosition;

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const METERS_PER_DEGREE_LAT: f64 = 111_000.0;

/// 3-D distance between two positions: great-circle horizontal distance
/// combined with the altitude delta.
pub fn haversine(a: &GeoPosition, b: &GeoPosition) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let sin_dlat = (d_lat / 2.0).sin();
    let sin_dlon = (d_lon / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    let horizontal = EARTH_RADIUS_M * c;

    let vertical = b.altitude - a.altitude;
    (horizontal * horizontal + vertical * vertical).sqrt()
}

/// Standard forward azimuth from `from` to `to`, degrees in `[0, 360)`.
pub fn bearing(from: &GeoPosition, to: &GeoPosition) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    let mut deg = y.atan2(x).to_degrees();
    if deg < 0.0 {
        deg += 360.0;
    }
    deg
}

/// Unsigned angular difference between two bearings, normalized to
/// `[0, 180]`.
pub fn bearing_diff(a: f64, b: f64) -> f64 {
    let mut d = (a - b).abs();
    if d > 180.0 {
        d = 360.0 - d;
    }
    d
}

/// Destination position `distance_m` along `bearing_deg` from `origin`,
/// using the full spherical direct formula (valid at any range, not just
/// the short-range flat approximation used elsewhere for correlation).
pub fn offset_by(origin: &GeoPosition, bearing_deg: f64, distance_m: f64) -> GeoPosition {
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();
    let theta = bearing_deg.to_radians();
    let delta = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    GeoPosition::new(lat2.to_degrees(), lon2.to_degrees(), origin.altitude)
}

/// Converts a lat/lon rate of change (degrees/second) at a given latitude
/// into NED north/east velocity components in meters/second. Used when
/// recovering a velocity estimate from a filter whose state is kept in
/// degree space.
pub fn degrees_per_sec_to_ned(dlat_dt: f64, dlon_dt: f64, at_latitude_deg: f64) -> (f64, f64) {
    let meters_per_lon = METERS_PER_DEGREE_LAT * at_latitude_deg.to_radians().cos();
    (dlat_dt * METERS_PER_DEGREE_LAT, dlon_dt * meters_per_lon)
}

/// Cheap flat-earth approximation used by the Track Manager's correlation
/// gate, where sub-meter accuracy is not required and the cost of a full
/// spherical calculation per detection-to-track comparison adds up.
pub fn flat_distance(a: &GeoPosition, b: &GeoPosition) -> f64 {
    let meters_per_lon = METERS_PER_DEGREE_LAT * a.latitude.to_radians().cos();
    let dn = (b.latitude - a.latitude) * METERS_PER_DEGREE_LAT;
    let de = (b.longitude - a.longitude) * meters_per_lon;
    (dn * dn + de * de).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn haversine_zero_for_identical_points() {
        let p = GeoPosition::new(34.0522, -118.2437, 100.0);
        assert_relative_eq!(haversine(&p, &p), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn haversine_symmetric() {
        let a = GeoPosition::new(34.0522, -118.2437, 100.0);
        let b = GeoPosition::new(34.0601, -118.2500, 50.0);
        assert_relative_eq!(haversine(&a, &b), haversine(&b, &a), epsilon = 1e-6);
    }

    #[test]
    fn bearing_reciprocal_within_tolerance() {
        let a = GeoPosition::new(34.0522, -118.2437, 0.0);
        let b = GeoPosition::new(34.10, -118.20, 0.0);
        let fwd = bearing(&a, &b);
        let back = bearing(&b, &a);
        let sum = (fwd + back) % 360.0;
        // bearing(a,b) + bearing(b,a) ~= 180 (mod 360), loosely, since the
        // two azimuths are not exact antipodes on a non-great-circle pair
        // of nearby points; check it lands close to 180 for this modest
        // separation.
        assert!((sum - 180.0).abs() < 5.0, "sum={sum}");
    }

    #[test]
    fn offset_then_haversine_round_trips() {
        let origin = GeoPosition::new(34.0522, -118.2437, 0.0);
        for bearing_deg in [0.0, 45.0, 90.0, 180.0, 270.0] {
            let dest = offset_by(&origin, bearing_deg, 5_000.0);
            let back = haversine(&origin, &dest);
            assert_relative_eq!(back, 5_000.0, epsilon = 1.0);
        }
    }

    #[test]
    fn bearing_diff_normalizes() {
        assert_relative_eq!(bearing_diff(350.0, 10.0), 20.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_diff(10.0, 350.0), 20.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_diff(0.0, 180.0), 180.0, epsilon = 1e-9);
    }
}
