/*!
 * Encoded polyline helpers at precision 6 (1e-6 degree units)
 */

use geo_types::{Coord, LineString};

/// Decimal digits carried by every polyline this crate writes
pub const PRECISION: u32 = 6;

/// Decode a precision-6 polyline into `(lat, lon)` points
pub fn decode(encoded: &str) -> Result<Vec<(f64, f64)>, String> {
    let line: LineString<f64> =
        ::polyline::decode_polyline(encoded, PRECISION).map_err(|e| e.to_string())?;
    Ok(line.into_iter().map(|c| (c.y, c.x)).collect())
}

/// Encode `(lat, lon)` points as a precision-6 polyline
pub fn encode(points: &[(f64, f64)]) -> Result<String, String> {
    let coords = points.iter().map(|&(lat, lon)| Coord { x: lon, y: lat });
    ::polyline::encode_coordinates(coords, PRECISION).map_err(|e| e.to_string())
}

/// Decode and re-encode so the stored string is canonical precision-6
pub fn normalize(encoded: &str) -> Result<String, String> {
    let points = decode(encoded)?;
    encode(&points)
}
