//! Pure calculation functions for variant planning.
//!
//! All functions here are pure and testable without any I/O or images.

/// Lossy sources only get variants at or below this width ratio.
pub const LOSSY_MAX_RATIO: f64 = 0.7;

/// A downsized variant to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedVariant {
    pub width: u32,
    pub height: u32,
}

/// Decide which configured widths are worth producing for an image.
///
/// Walks `widths` in the order given and keeps a width only when:
/// - it is strictly below the native width (never upscale, and the native
///   width is already covered by the original),
/// - the width ratio is at most `scale_threshold`,
/// - the source is lossless, or the ratio is at most [`LOSSY_MAX_RATIO`].
///
/// Heights preserve the aspect ratio and are truncated. Duplicate widths and
/// variants that would end up zero pixels tall are dropped.
///
/// # Examples
/// ```
/// # use enfasten::imaging::calculations::{plan_variants, PlannedVariant};
/// // 800×600 JPEG: 800 is not a downscale, 1200 would upscale.
/// assert_eq!(
///     plan_variants((800, 600), &[400, 800, 1200], 0.9, true),
///     vec![PlannedVariant { width: 400, height: 300 }],
/// );
/// ```
pub fn plan_variants(
    native: (u32, u32),
    widths: &[u32],
    scale_threshold: f64,
    lossy: bool,
) -> Vec<PlannedVariant> {
    let (native_w, native_h) = native;
    let mut planned: Vec<PlannedVariant> = Vec::new();

    for &w in widths {
        if w >= native_w {
            continue;
        }

        let ratio = w as f64 / native_w as f64;
        let height = (native_h as f64 * ratio) as u32;

        if ratio > scale_threshold {
            continue;
        }
        if lossy && ratio > LOSSY_MAX_RATIO {
            continue;
        }
        if height == 0 || planned.iter().any(|p| p.width == w) {
            continue;
        }

        planned.push(PlannedVariant { width: w, height });
    }

    planned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widths(planned: &[PlannedVariant]) -> Vec<u32> {
        planned.iter().map(|p| p.width).collect()
    }

    #[test]
    fn never_upscales() {
        let planned = plan_variants((500, 400), &[800, 1400, 2080], 0.9, false);
        assert!(planned.is_empty());
    }

    #[test]
    fn native_width_is_skipped() {
        let planned = plan_variants((800, 600), &[800], 1.0, false);
        assert!(planned.is_empty());
    }

    #[test]
    fn jpeg_scenario_keeps_only_half_size() {
        let planned = plan_variants((800, 600), &[400, 800, 1200], 0.9, true);
        assert_eq!(
            planned,
            vec![PlannedVariant {
                width: 400,
                height: 300
            }]
        );
    }

    #[test]
    fn threshold_skips_negligible_shrink() {
        // 950/1000 = 0.95 > 0.9
        let planned = plan_variants((1000, 500), &[950, 900, 500], 0.9, false);
        assert_eq!(widths(&planned), vec![900, 500]);
    }

    #[test]
    fn lossy_sources_need_a_bigger_shrink() {
        // 0.8 passes the threshold but not the lossy cutoff.
        let lossless = plan_variants((1000, 500), &[800, 700, 500], 0.9, false);
        let lossy = plan_variants((1000, 500), &[800, 700, 500], 0.9, true);
        assert_eq!(widths(&lossless), vec![800, 700, 500]);
        assert_eq!(widths(&lossy), vec![700, 500]);
    }

    #[test]
    fn height_is_truncated() {
        // 333/1000 * 999 = 332.667 → 332
        let planned = plan_variants((1000, 999), &[333], 0.9, false);
        assert_eq!(planned[0].height, 332);
    }

    #[test]
    fn preserves_configured_order() {
        let planned = plan_variants((2000, 1000), &[400, 1200, 800], 0.9, false);
        assert_eq!(widths(&planned), vec![400, 1200, 800]);
    }

    #[test]
    fn duplicate_widths_planned_once() {
        let planned = plan_variants((2000, 1000), &[400, 400], 0.9, false);
        assert_eq!(widths(&planned), vec![400]);
    }

    #[test]
    fn zero_height_variant_dropped() {
        // 2000×1 banner: 100px wide would be 0.05px tall.
        let planned = plan_variants((2000, 1), &[100], 0.9, false);
        assert!(planned.is_empty());
    }

    #[test]
    fn empty_widths_plans_nothing() {
        assert!(plan_variants((1000, 800), &[], 0.9, false).is_empty());
    }
}
