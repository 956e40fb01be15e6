use tracing::debug;

use super::models::{RenditionDescriptor, RenditionLadder, SourceDimensions, Tier};
use super::{LadderError, LadderResult};

/// Derives the three-tier rendition ladder for a source resolution.
///
/// The result depends only on `source`; the same input always yields the
/// same ladder.
pub fn plan_ladder(source: SourceDimensions) -> LadderResult<RenditionLadder> {
    let invalid = LadderError::InvalidDimensions {
        width: source.width,
        height: source.height,
    };
    if source.width == 0 || source.height == 0 {
        return Err(invalid);
    }
    let aspect_ratio = source.aspect_ratio();
    if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
        return Err(invalid);
    }

    let is_hd = source.is_hd();
    let mut renditions = Vec::with_capacity(Tier::ALL.len());
    for tier in Tier::ALL {
        let (width, height) = scale_resolution(source, aspect_ratio, tier.scale(is_hd));
        if width == 0 || height == 0 {
            return Err(LadderError::DegenerateRendition {
                tier: tier.as_str(),
                width,
                height,
                source_width: source.width,
                source_height: source.height,
            });
        }
        let bitrate_kbps = tier.policy().bitrate_for(width, height);
        renditions.push(RenditionDescriptor {
            name: tier,
            width,
            height,
            bitrate_kbps,
        });
    }

    debug!(
        source = %source,
        is_hd,
        portrait = source.is_portrait(),
        ?renditions,
        "planned rendition ladder"
    );
    let renditions: [RenditionDescriptor; 3] = renditions.try_into().map_err(|_| invalid)?;
    Ok(RenditionLadder::new(renditions))
}

fn scale_resolution(source: SourceDimensions, aspect_ratio: f64, scale: f64) -> (u32, u32) {
    let width = (source.width as f64 * scale).round();
    let height = (width / aspect_ratio).round();
    (floor_even(width as u32), floor_even(height as u32))
}

fn floor_even(value: u32) -> u32 {
    value - value % 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(width: u32, height: u32) -> RenditionLadder {
        plan_ladder(SourceDimensions::new(width, height)).unwrap()
    }

    fn dims(ladder: &RenditionLadder, tier: Tier) -> (u32, u32, u32) {
        let rendition = ladder.get(tier);
        (rendition.width, rendition.height, rendition.bitrate_kbps)
    }

    #[test]
    fn full_hd_landscape_uses_hd_scales() {
        let ladder = plan(1920, 1080);
        assert_eq!(dims(&ladder, Tier::Low), (1920, 1080, 1296));
        assert_eq!(dims(&ladder, Tier::Lower), (1536, 864, 737));
        assert_eq!(dims(&ladder, Tier::SuperLow), (1344, 756, 423));
    }

    #[test]
    fn sd_portrait_uses_non_hd_scales() {
        let ladder = plan(480, 854);
        assert_eq!(dims(&ladder, Tier::Low), (480, 854, 1000));
        assert_eq!(dims(&ladder, Tier::Lower), (480, 854, 228));
        assert_eq!(dims(&ladder, Tier::SuperLow), (384, 682, 109));

        // Rounding then flooring to even can land up to 2px from the exact
        // height; super_low here is 682 against 683.2.
        let source_aspect = 480.0 / 854.0;
        for rendition in &ladder {
            let expected_height = rendition.width as f64 / source_aspect;
            assert!((rendition.height as f64 - expected_height).abs() < 2.0);
        }
        let super_low = ladder.get(Tier::SuperLow);
        let drift = super_low.width as f64 / source_aspect - super_low.height as f64;
        assert!((drift - 1.2).abs() < 0.01);
    }

    #[test]
    fn hd_portrait_is_judged_by_width() {
        // 720 wide portrait counts as HD, 719 wide does not.
        let hd = plan(720, 1280);
        assert_eq!(dims(&hd, Tier::SuperLow).0, 504);
        assert_eq!(dims(&hd, Tier::Lower).0, 576);

        let sd = plan(718, 1280);
        assert_eq!(dims(&sd, Tier::SuperLow).0, 574);
        assert_eq!(dims(&sd, Tier::Lower).0, 718);
    }

    #[test]
    fn very_wide_landscape_below_720_height_is_not_hd() {
        let ladder = plan(3840, 700);
        assert_eq!(dims(&ladder, Tier::Lower).0, 3840);
        assert_eq!(dims(&ladder, Tier::Low), (3840, 700, 1680));
    }

    #[test]
    fn large_sources_clamp_to_tier_maximum() {
        let ladder = plan(3840, 2160);
        assert_eq!(ladder.get(Tier::Low).bitrate_kbps, 3000);
        assert_eq!(ladder.get(Tier::Lower).bitrate_kbps, 1500);
        assert_eq!(ladder.get(Tier::SuperLow).bitrate_kbps, 800);
    }

    #[test]
    fn ladder_invariants_hold_across_resolutions() {
        let widths = [2, 3, 16, 99, 320, 480, 640, 719, 720, 721, 1080, 1279, 1920, 2560, 4096];
        let heights = [2, 5, 90, 240, 360, 480, 719, 720, 1080, 1366, 1920, 2160];
        for &width in &widths {
            for &height in &heights {
                let ladder = match plan_ladder(SourceDimensions::new(width, height)) {
                    Ok(ladder) => ladder,
                    Err(LadderError::DegenerateRendition { .. }) => continue,
                    Err(err) => panic!("{width}x{height}: {err}"),
                };
                let tiers: Vec<Tier> = ladder.iter().map(|r| r.name).collect();
                assert_eq!(tiers, Tier::ALL.to_vec());
                for rendition in &ladder {
                    assert!(rendition.width > 0 && rendition.width % 2 == 0);
                    assert!(rendition.height > 0 && rendition.height % 2 == 0);
                    let policy = rendition.name.policy();
                    assert!(rendition.bitrate_kbps >= policy.min_kbps);
                    assert!(rendition.bitrate_kbps <= policy.max_kbps);
                }
                let low = ladder.get(Tier::Low);
                let lower = ladder.get(Tier::Lower);
                let super_low = ladder.get(Tier::SuperLow);
                assert!(low.pixels() >= lower.pixels(), "{width}x{height}");
                assert!(lower.pixels() >= super_low.pixels(), "{width}x{height}");
            }
        }
    }

    #[test]
    fn planning_is_deterministic() {
        assert_eq!(plan(1280, 720), plan(1280, 720));
        assert_eq!(plan(1080, 1920), plan(1080, 1920));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert_eq!(
            plan_ladder(SourceDimensions::new(0, 1080)),
            Err(LadderError::InvalidDimensions {
                width: 0,
                height: 1080
            })
        );
        assert!(plan_ladder(SourceDimensions::new(1920, 0)).is_err());
    }

    #[test]
    fn single_pixel_source_collapses() {
        let err = plan_ladder(SourceDimensions::new(1, 1)).unwrap_err();
        assert!(matches!(err, LadderError::DegenerateRendition { .. }));
    }

    #[test]
    fn ladder_serializes_smallest_first() {
        let json = serde_json::to_value(plan(1920, 1080)).unwrap();
        let renditions = json["renditions"].as_array().unwrap();
        assert_eq!(renditions.len(), 3);
        assert_eq!(renditions[0]["name"], "super_low");
        assert_eq!(renditions[2]["name"], "low");
        assert_eq!(renditions[2]["bitrate_kbps"], 1296);
    }
}
