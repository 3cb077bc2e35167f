//! Point set differencing: which observed points are genuinely new.
//!
//! The API supplies stable point ids, so that path deduplicates by id. The
//! scrape feed has no stable ids and deduplicates by coordinate rounded to
//! six decimal places (about 11 cm, well below the distance between two
//! distinct pilgrimage spots).

use std::collections::HashSet;

use crate::models::Point;

/// Rounded to micro-degrees so coordinates can be hashed exactly.
type CoordKey = (i64, i64);

fn coord_key(point: &Point) -> CoordKey {
    let (lat, lng) = point.geo_or_origin();
    ((lat * 1e6).round() as i64, (lng * 1e6).round() as i64)
}

const ORIGIN: CoordKey = (0, 0);

/// Points in `observed` whose id does not appear in `existing`.
///
/// Points without an id are never reported as new; without an identifier a
/// later pass could not avoid re-adding them. Observed order is preserved
/// and duplicates within `observed` itself are not collapsed.
#[must_use]
pub fn diff_by_id(existing: &[Point], observed: &[Point]) -> Vec<Point> {
    let known: HashSet<&str> = existing
        .iter()
        .filter(|p| !p.id.is_empty())
        .map(|p| p.id.as_str())
        .collect();

    observed
        .iter()
        .filter(|p| !p.id.is_empty() && !known.contains(p.id.as_str()))
        .cloned()
        .collect()
}

/// Points in `observed` whose rounded coordinate does not appear in
/// `existing`.
///
/// `(0, 0)` is the "coordinates not found" sentinel, not a place. Two
/// unresolved points are not the same point, so a `(0, 0)` coordinate never
/// suppresses an observed point here.
#[must_use]
pub fn diff_by_coordinate(existing: &[Point], observed: &[Point]) -> Vec<Point> {
    let known: HashSet<CoordKey> = existing
        .iter()
        .map(coord_key)
        .filter(|key| *key != ORIGIN)
        .collect();

    observed
        .iter()
        .filter(|p| {
            let key = coord_key(p);
            key == ORIGIN || !known.contains(&key)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_id(id: &str) -> Point {
        Point {
            id: id.to_string(),
            ..Point::default()
        }
    }

    fn with_geo(lat: f64, lng: f64) -> Point {
        Point {
            geo: Some([lat, lng]),
            ..Point::default()
        }
    }

    #[test]
    fn by_id_reports_only_unknown_ids() {
        let existing = vec![with_id("x1"), with_id("x2")];
        let observed = vec![with_id("x2"), with_id("x3")];

        let new = diff_by_id(&existing, &observed);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].id, "x3");
    }

    #[test]
    fn by_id_skips_points_without_id() {
        let observed = vec![with_id(""), with_id("a")];
        let new = diff_by_id(&[], &observed);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].id, "a");
    }

    #[test]
    fn by_coordinate_matches_on_rounded_value() {
        let existing = vec![with_geo(35.0, 139.0)];
        let observed = vec![with_geo(35.000_000, 139.000_000), with_geo(35.1, 139.1)];

        let new = diff_by_coordinate(&existing, &observed);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].geo, Some([35.1, 139.1]));
    }

    #[test]
    fn by_coordinate_rounds_to_six_decimals() {
        let existing = vec![with_geo(35.123_456_4, 139.0)];
        // Differs only in the seventh decimal, rounds to the same key.
        let observed = vec![with_geo(35.123_456_2, 139.0)];

        assert!(diff_by_coordinate(&existing, &observed).is_empty());
    }

    #[test]
    fn unresolved_points_are_never_suppressed() {
        let existing = vec![with_geo(0.0, 0.0)];
        let observed = vec![with_geo(0.0, 0.0), Point::default()];

        // Both an explicit (0,0) and a missing geo are unresolved; neither
        // may be swallowed by the sentinel already on disk.
        assert_eq!(diff_by_coordinate(&existing, &observed).len(), 2);
    }

    #[test]
    fn duplicates_within_the_observed_batch_are_kept() {
        let observed = vec![with_geo(1.0, 2.0), with_geo(1.0, 2.0)];
        assert_eq!(diff_by_coordinate(&[], &observed).len(), 2);
    }

    #[test]
    fn observed_order_is_preserved() {
        let observed = vec![with_id("c"), with_id("a"), with_id("b")];
        let new = diff_by_id(&[], &observed);
        let ids: Vec<&str> = new.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }
}
