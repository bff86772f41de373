//! Battery level indicator selection and refresh

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::component::ChildSet;
use crate::device::{DeviceLayer, Side};
use crate::resource::{BatteryIndicator, ModelResource};
use crate::scene::SceneBackend;

/// Frames between battery refreshes while the model is shown
pub const DEFAULT_BATTERY_REFRESH_FRAMES: u32 = 200;

/// System battery indicator policy, as published by the OEM configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatteryPolicy {
    /// 2 means the indicator should be shown
    pub show: u8,
}

impl BatteryPolicy {
    pub const SHOW: u8 = 2;

    pub fn shows_indicator(&self) -> bool {
        self.show == Self::SHOW
    }
}

/// Where the battery mesh lives in the current build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatterySlot {
    /// Section index of the battery mesh
    pub index: Option<usize>,
    /// Battery material and textures are bound
    pub ready: bool,
}

/// First interval containing a 0.0..=1.0 battery level.
///
/// Negative levels mean the runtime does not know the level.
pub fn select_indicator(indicators: &[BatteryIndicator], level: f32) -> Option<&BatteryIndicator> {
    if level < 0.0 {
        return None;
    }
    indicators.iter().find(|bi| bi.contains(level))
}

/// Maps battery samples onto the battery mesh
#[derive(Debug, Clone)]
pub struct BatteryIndicatorUpdater {
    enabled: bool,
    refresh_frames: u32,
    countdown: i64,
}

impl BatteryIndicatorUpdater {
    pub fn new(refresh_frames: u32) -> Self {
        Self {
            enabled: false,
            refresh_frames,
            countdown: refresh_frames as i64,
        }
    }

    /// Whether policy allows showing the indicator
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Apply the system policy. Direct preview always shows the indicator.
    pub fn apply_policy(&mut self, policy: Option<BatteryPolicy>, direct_preview: bool) {
        let mut show = direct_preview;
        match policy {
            Some(p) if p.shows_indicator() => show = true,
            Some(_) => {}
            None => debug!("There is no system battery policy"),
        }
        self.enabled = show;
    }

    /// Count down one shown frame; true when a periodic refresh is due
    pub fn frame_due(&mut self) -> bool {
        let due = self.countdown < 0;
        self.countdown -= 1;
        if due {
            self.countdown = self.refresh_frames as i64;
        }
        due
    }

    /// Select and bind the indicator texture for the current battery level
    #[allow(clippy::too_many_arguments)]
    pub fn refresh(
        &self,
        side: Side,
        scene: &mut dyn SceneBackend,
        devices: &dyn DeviceLayer,
        children: &mut ChildSet,
        slot: BatterySlot,
        resource: Option<&ModelResource>,
        shown: bool,
    ) {
        let Some(index) = slot.index else {
            return;
        };
        let Some(handle) = children.get_mut(index) else {
            return;
        };

        if !(self.enabled && slot.ready && shown) {
            handle.set_content_visible(scene, false);
            return;
        }

        let Some(indicators) = resource.and_then(|r| r.data()).and_then(|d| d.battery_list()) else {
            return;
        };

        let level = devices.battery_level(side.device_type());
        if level < 0.0 {
            debug!(%side, "Battery level is negative, hiding indicator");
            handle.set_content_visible(scene, false);
            return;
        }

        match select_indicator(indicators, level).and_then(|bi| bi.texture.texture().map(|t| (bi, t))) {
            Some((indicator, texture)) => {
                scene.set_main_texture(handle.node(), texture);
                handle.set_content_visible(scene, true);
                debug!(%side, level = indicator.level, percent = level, "Battery level updated");
            }
            None => handle.set_content_visible(scene, false),
        }
    }
}

impl Default for BatteryIndicatorUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_BATTERY_REFRESH_FRAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::TextureInfo;

    fn intervals() -> Vec<BatteryIndicator> {
        [(0.0, 20.0, 0), (20.0, 60.0, 1), (60.0, 100.0, 2)]
            .into_iter()
            .map(|(min, max, level)| BatteryIndicator {
                min,
                max,
                level,
                texture: TextureInfo::new(1, 1, vec![0; 4]),
            })
            .collect()
    }

    #[test]
    fn test_select_mid() {
        let list = intervals();
        assert_eq!(select_indicator(&list, 0.45).map(|b| b.level), Some(1));
    }

    #[test]
    fn test_select_negative_hidden() {
        let list = intervals();
        assert!(select_indicator(&list, -1.0).is_none());
    }

    #[test]
    fn test_select_full_is_high() {
        let list = intervals();
        assert_eq!(select_indicator(&list, 1.0).map(|b| b.level), Some(2));
    }

    #[test]
    fn test_select_shared_boundary_takes_first() {
        let list = intervals();
        assert_eq!(select_indicator(&list, 0.2).map(|b| b.level), Some(0));
    }

    #[test]
    fn test_select_no_match() {
        let list = vec![BatteryIndicator {
            min: 50.0,
            max: 100.0,
            level: 1,
            texture: TextureInfo::new(1, 1, vec![0; 4]),
        }];
        assert!(select_indicator(&list, 0.3).is_none());
    }

    #[test]
    fn test_policy() {
        let mut updater = BatteryIndicatorUpdater::default();
        updater.apply_policy(None, false);
        assert!(!updater.is_enabled());
        updater.apply_policy(Some(BatteryPolicy { show: 1 }), false);
        assert!(!updater.is_enabled());
        updater.apply_policy(Some(BatteryPolicy { show: 2 }), false);
        assert!(updater.is_enabled());
        updater.apply_policy(None, true);
        assert!(updater.is_enabled());
    }

    #[test]
    fn test_frame_countdown() {
        let mut updater = BatteryIndicatorUpdater::new(2);
        let due: Vec<bool> = (0..8).map(|_| updater.frame_due()).collect();
        assert_eq!(due, vec![false, false, false, true, false, false, false, true]);
    }
}
