/*!
 # Sun elevation

 Low-precision solar position (the Astronomical Almanac's approximation),
 good to a few hundredths of a degree for dates near the present. That is
 far more than a dusk/dawn threshold needs.
*/

#![allow(clippy::unreadable_literal)]

use chrono::{DateTime, TimeZone, Utc};

/// Julian day of 1970-01-01T00:00:00Z
const UNIX_EPOCH_JULIAN_DAY: f64 = 2440587.5;

/// Julian day of J2000.0 (2000-01-01T12:00:00)
const J2000_JULIAN_DAY: f64 = 2451545.0;

const SECONDS_PER_DAY: f64 = 86400.0;

/// Geographic observer position in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    latitude: f64,
    longitude: f64,
}

impl GeoLocation {
    /// Returns `None` unless latitude is within ±90° and longitude within ±180°
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
            Some(Self {
                latitude,
                longitude,
            })
        } else {
            None
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Sun position in equatorial coordinates, degrees
#[derive(Debug, Clone, Copy, PartialEq)]
struct Equatorial {
    right_ascension: f64,
    declination: f64,
}

/// Sun elevation above the horizon at `instant`, in degrees.
///
/// Negative below the horizon. No atmospheric refraction is applied.
pub fn elevation<Tz: TimeZone>(location: &GeoLocation, instant: &DateTime<Tz>) -> f64 {
    let n = days_since_j2000(&instant.with_timezone(&Utc));
    let sun = sun_equatorial(n);

    // Greenwich mean sidereal time, then local hour angle
    let gmst = normalize_degrees(280.46061837 + 360.98564736629 * n);
    let hour_angle = (gmst + location.longitude - sun.right_ascension).to_radians();

    let latitude = location.latitude.to_radians();
    let declination = sun.declination.to_radians();
    let sin_elevation = latitude.sin() * declination.sin()
        + latitude.cos() * declination.cos() * hour_angle.cos();

    sin_elevation.clamp(-1.0, 1.0).asin().to_degrees()
}

/// True when the sun is below `threshold_degrees`.
///
/// A positive threshold means the sun must be that far above the horizon to
/// count as light.
pub fn is_dark<Tz: TimeZone>(
    location: &GeoLocation,
    instant: &DateTime<Tz>,
    threshold_degrees: f64,
) -> bool {
    elevation(location, instant) < threshold_degrees
}

/// Fractional days since J2000.0
fn days_since_j2000(instant: &DateTime<Utc>) -> f64 {
    let seconds =
        instant.timestamp() as f64 + f64::from(instant.timestamp_subsec_nanos()) * 1e-9;
    seconds / SECONDS_PER_DAY + UNIX_EPOCH_JULIAN_DAY - J2000_JULIAN_DAY
}

fn sun_equatorial(n: f64) -> Equatorial {
    let mean_longitude = normalize_degrees(280.460 + 0.9856474 * n);
    let mean_anomaly = normalize_degrees(357.528 + 0.9856003 * n).to_radians();

    // Equation of center
    let ecliptic_longitude = (mean_longitude
        + 1.915 * mean_anomaly.sin()
        + 0.020 * (2.0 * mean_anomaly).sin())
    .to_radians();
    let obliquity = (23.439 - 0.0000004 * n).to_radians();

    let right_ascension = (obliquity.cos() * ecliptic_longitude.sin())
        .atan2(ecliptic_longitude.cos())
        .to_degrees();
    let declination = (obliquity.sin() * ecliptic_longitude.sin()).asin().to_degrees();

    Equatorial {
        right_ascension: normalize_degrees(right_ascension),
        declination,
    }
}

fn normalize_degrees(degrees: f64) -> f64 {
    degrees.rem_euclid(360.0)
}
