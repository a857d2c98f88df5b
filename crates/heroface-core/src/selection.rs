//! Choosing one face out of several detections.
//!
//! Both selectors are stable: on equal scores the earliest candidate wins.

use crate::types::{FaceCandidate, Point2};

/// Weight of the distance-to-center penalty against raw box area.
const CENTER_DISTANCE_WEIGHT: f64 = 10.0;

/// Pick the page's principal face: `area - 10 * distance(bbox center, image center)`.
///
/// A single candidate is returned unchanged; an empty slice yields `None`.
pub fn select_main_face(
    candidates: &[FaceCandidate],
    width: u32,
    height: u32,
) -> Option<&FaceCandidate> {
    if candidates.len() == 1 {
        return candidates.first();
    }
    let center = Point2::new(width as f32 / 2.0, height as f32 / 2.0);
    first_max_by_key(candidates, |face| main_face_score(face, center))
}

/// Score used by [`select_main_face`].
pub fn main_face_score(face: &FaceCandidate, image_center: Point2) -> f64 {
    let area = f64::from(face.bbox.area());
    let dist = f64::from(face.bbox.center().distance(&image_center));
    area - dist * CENTER_DISTANCE_WEIGHT
}

/// Pick the face with the largest bounding box.
pub fn select_largest_face(candidates: &[FaceCandidate]) -> Option<&FaceCandidate> {
    first_max_by_key(candidates, |face| f64::from(face.bbox.area()))
}

/// Like `Iterator::max_by`, but keeps the first of equal maxima.
fn first_max_by_key<T>(items: &[T], key: impl Fn(&T) -> f64) -> Option<&T> {
    let mut best: Option<(&T, f64)> = None;
    for item in items {
        let score = key(item);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((item, score)),
        }
    }
    best.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Landmarks};

    fn face(x1: f32, y1: f32, x2: f32, y2: f32) -> FaceCandidate {
        let bbox = BoundingBox::new(x1, y1, x2, y2).unwrap();
        let c = bbox.center();
        FaceCandidate {
            landmarks: Landmarks::from([
                (c.x - 10.0, c.y - 5.0),
                (c.x + 10.0, c.y - 5.0),
                (c.x, c.y + 3.0),
                (c.x - 8.0, c.y + 12.0),
                (c.x + 8.0, c.y + 12.0),
            ]),
            bbox,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_empty_is_none() {
        assert!(select_main_face(&[], 100, 100).is_none());
        assert!(select_largest_face(&[]).is_none());
    }

    #[test]
    fn test_single_candidate_returned_unchanged() {
        let only = face(0.0, 0.0, 5.0, 5.0);
        let picked = select_main_face(std::slice::from_ref(&only), 1000, 1000).unwrap();
        assert_eq!(picked, &only);
    }

    #[test]
    fn test_large_edge_face_beats_small_centered_face() {
        // 1000x800 page, center (500, 400).
        // Edge face: 200x200, center (100, 400): 40000 - 10*400 = 36000.
        // Centered face: 100x100, center (500, 400): 10000 - 0 = 10000.
        let edge = face(0.0, 300.0, 200.0, 500.0);
        let centered = face(450.0, 350.0, 550.0, 450.0);
        let center = Point2::new(500.0, 400.0);
        assert!((main_face_score(&edge, center) - 36000.0).abs() < 1e-6);
        assert!((main_face_score(&centered, center) - 10000.0).abs() < 1e-6);

        let faces = vec![centered.clone(), edge.clone()];
        assert_eq!(select_main_face(&faces, 1000, 800), Some(&edge));
    }

    #[test]
    fn test_double_area_off_center_wins() {
        // Corner face 200x100 at center (100, 50): distance sqrt(400^2 + 350^2) ~= 531.5
        // -> 20000 - 5315 = 14685 > 10000.
        let corner = face(0.0, 0.0, 200.0, 100.0);
        let centered = face(450.0, 350.0, 550.0, 450.0);
        let faces = vec![centered, corner.clone()];
        assert_eq!(select_main_face(&faces, 1000, 800), Some(&corner));
    }

    #[test]
    fn test_distance_breaks_equal_areas() {
        let far = face(0.0, 0.0, 100.0, 100.0);
        let near = face(400.0, 300.0, 500.0, 400.0);
        let faces = vec![far, near.clone()];
        assert_eq!(select_main_face(&faces, 1000, 800), Some(&near));
    }

    #[test]
    fn test_ties_keep_first_seen() {
        // Mirror images about the page center score identically.
        let left = face(100.0, 350.0, 200.0, 450.0);
        let right = face(800.0, 350.0, 900.0, 450.0);
        let faces = vec![left.clone(), right.clone()];
        assert_eq!(select_main_face(&faces, 1000, 800), Some(&left));

        let swapped = vec![right.clone(), left];
        assert_eq!(select_main_face(&swapped, 1000, 800), Some(&right));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let faces = vec![
            face(10.0, 10.0, 90.0, 90.0),
            face(300.0, 200.0, 420.0, 330.0),
            face(600.0, 500.0, 640.0, 540.0),
        ];
        let first = select_main_face(&faces, 800, 600).cloned();
        for _ in 0..10 {
            assert_eq!(select_main_face(&faces, 800, 600).cloned(), first);
        }
    }

    #[test]
    fn test_largest_face() {
        let small = face(0.0, 0.0, 10.0, 10.0);
        let big = face(500.0, 500.0, 600.0, 600.0);
        let also_big = face(0.0, 0.0, 100.0, 100.0);
        let faces = vec![small, big.clone(), also_big];
        assert_eq!(select_largest_face(&faces), Some(&big));
    }
}
