/// Kilometres covered by one degree of latitude (and of longitude at the equator)
pub const KM_PER_DEGREE: f64 = 111.32;

/// Wrap longitude into [-180, 180)
#[inline(always)]
pub fn wrap_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Clamp latitude into [-90, 90]
#[inline(always)]
pub fn clamp_lat(lat: f64) -> f64 {
    lat.clamp(-90.0, 90.0)
}

/// Cosine of a latitude, floored so longitude scaling stays finite near the poles
#[inline(always)]
pub fn lon_scale(lat: f64) -> f64 {
    lat.to_radians().cos().max(0.01)
}

/// Move `distance_km` from (lat, lon) along `heading` (radians, 0 = north, clockwise)
/// on a locally flat earth. Good enough for walking-scale steps.
pub fn offset(lat: f64, lon: f64, distance_km: f64, heading: f64) -> (f64, f64) {
    let dlat = distance_km * heading.cos() / KM_PER_DEGREE;
    let dlon = distance_km * heading.sin() / (KM_PER_DEGREE * lon_scale(lat));
    (clamp_lat(lat + dlat), wrap_lon(lon + dlon))
}
