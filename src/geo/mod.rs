//! Geospatial primitives: geohash encoding, neighbor-cell expansion and
//! haversine distance. Pure functions, no I/O.
//!
//! The geohash index is only ever a candidate filter; every distance the
//! engine reports or sorts on is recomputed from raw coordinates.

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Cell precision used across the engine (~0.6 km x 1.2 km per cell).
pub const GEOHASH_PRECISION: usize = 6;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Last-character substitutions per cardinal direction. This is an
/// approximation of true geohash adjacency that over-covers near cell
/// boundaries; callers must treat the result as a candidate superset.
const NEIGHBOR_TABLE: [[char; 4]; 4] = [
    ['p', 'r', 'x', 'z'], // north
    ['b', 'c', 'f', 'g'], // south
    ['u', 'v', 'y', 'z'], // east
    ['8', '9', 'd', 'e'], // west
];

/// Standard interleaved-bit base-32 geohash, longitude bisection first.
pub fn encode_geohash(lat: f64, lon: f64, precision: usize) -> String {
    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lon_range = (-180.0f64, 180.0f64);

    let mut hash = String::with_capacity(precision);
    let mut bits = 0u8;
    let mut ch = 0usize;
    let mut even = true;

    while hash.len() < precision {
        if even {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if lon > mid {
                ch |= 1 << (4 - bits);
                lon_range.0 = mid;
            } else {
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat > mid {
                ch |= 1 << (4 - bits);
                lat_range.0 = mid;
            } else {
                lat_range.1 = mid;
            }
        }

        even = !even;
        bits += 1;

        if bits == 5 {
            hash.push(BASE32[ch] as char);
            bits = 0;
            ch = 0;
        }
    }

    hash
}

/// The 16 candidate cells obtained by substituting the last character of
/// `hash` with each direction's table entries. Always 16 cells, each the
/// same length as the input.
pub fn neighbor_cells(hash: &str) -> Vec<String> {
    let stem = &hash[..hash.len().saturating_sub(1)];

    NEIGHBOR_TABLE
        .iter()
        .flatten()
        .map(|c| {
            let mut cell = String::with_capacity(hash.len());
            cell.push_str(stem);
            cell.push(*c);
            cell
        })
        .collect()
}

/// Great-circle distance between two points in kilometers.
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Display rounding used for `distance_km` on recommendation items.
pub fn round_distance_km(distance: f64) -> f64 {
    (distance * 10.0).round() / 10.0
}
