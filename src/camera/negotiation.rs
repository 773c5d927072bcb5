//! Stream size negotiation.

use crate::camera::backend::Size;

/// Weight of the aspect-ratio mismatch relative to the pixel-count mismatch.
const ASPECT_RATIO_WEIGHT: f64 = 1000.0;

/// Score of `candidate` against `target`; lower is better.
///
/// ```text
/// |pixels - target_pixels| + 1000 * |aspect - target_aspect|
/// ```
pub fn size_score(candidate: Size, target: Size) -> f64 {
    let pixel_diff = (candidate.pixel_count() as f64 - target.pixel_count() as f64).abs();
    let aspect_diff = (candidate.aspect_ratio() - target.aspect_ratio()).abs();
    pixel_diff + ASPECT_RATIO_WEIGHT * aspect_diff
}

/// Pick the supported size closest to `target`.
///
/// With `max_pixels`, candidates above the ceiling are skipped unless none
/// remain, in which case the full list is scored. Ties keep the earliest
/// candidate. Returns `None` for an empty list.
pub fn choose_optimal_size(choices: &[Size], target: Size, max_pixels: Option<u64>) -> Option<Size> {
    let capped: Vec<Size> = match max_pixels {
        Some(limit) => choices
            .iter()
            .copied()
            .filter(|s| s.pixel_count() <= limit)
            .collect(),
        None => choices.to_vec(),
    };
    let candidates = if capped.is_empty() { choices } else { &capped };

    let mut best: Option<(Size, f64)> = None;
    for &candidate in candidates {
        let score = size_score(candidate, target);
        match best {
            Some((_, best_score)) if score >= best_score => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(size, _)| size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: Size = Size::new(1280, 720);

    #[test]
    fn test_exact_match_wins() {
        let choices = [Size::new(640, 480), Size::new(1280, 720), Size::new(1920, 1080)];
        assert_eq!(choose_optimal_size(&choices, TARGET, None), Some(TARGET));
    }

    #[test]
    fn test_aspect_ratio_breaks_equal_pixel_counts() {
        // Both hold exactly 1280 * 720 pixels; the wider one is closer to 16:9.
        let choices = [Size::new(960, 960), Size::new(1440, 640)];
        assert_eq!(choose_optimal_size(&choices, TARGET, None), Some(Size::new(1440, 640)));
    }

    #[test]
    fn test_pixel_cap_filters_large_sizes() {
        let choices = [Size::new(4000, 3000), Size::new(8000, 6000), Size::new(3840, 2160)];
        let chosen = choose_optimal_size(&choices, Size::new(3840, 2160), Some(4096 * 3072));
        assert_eq!(chosen, Some(Size::new(3840, 2160)));

        let chosen = choose_optimal_size(&choices, Size::new(8000, 6000), Some(4096 * 3072));
        assert_eq!(chosen, Some(Size::new(4000, 3000)));
    }

    #[test]
    fn test_cap_falls_back_to_full_list() {
        let choices = [Size::new(8000, 6000), Size::new(6000, 4000)];
        let chosen = choose_optimal_size(&choices, Size::new(3840, 2160), Some(1000));
        assert_eq!(chosen, Some(Size::new(6000, 4000)));
    }

    #[test]
    fn test_empty_choices() {
        assert_eq!(choose_optimal_size(&[], TARGET, None), None);
    }
}
