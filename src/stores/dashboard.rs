use serde::{Deserialize, Serialize};

use crate::apply_patch;
use crate::storage::{self, Persisted, StorageError, Store};
use crate::types::{
    ChatBubbleSize, DashboardPatch, FeatureItem, FeatureWidth, NewsSettings, NewsSettingsPatch,
    VideoSettings, VideoSettingsPatch,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub features: Vec<FeatureItem>,
    #[serde(default)]
    pub chat_bubble_size: ChatBubbleSize,
    #[serde(default)]
    pub news_settings: NewsSettings,
    #[serde(default)]
    pub video_settings: VideoSettings,
}

pub fn default_features() -> Vec<FeatureItem> {
    [
        ("prayer", "Prayer Times"),
        ("news", "News Feed"),
        ("calendar", "Calendar"),
        ("staff", "Staff Presence"),
        ("assets", "Assets Overview"),
        ("announcements", "Announcements"),
        ("activity", "Recent Activity"),
        ("countdown", "Countdown"),
        ("video", "Video Feed"),
    ]
    .into_iter()
    .enumerate()
    .map(|(order, (id, content))| FeatureItem {
        id: id.to_string(),
        content: content.to_string(),
        enabled: true,
        order: order as u32,
        width: FeatureWidth::Half,
    })
    .collect()
}

impl Persisted for DashboardState {
    const KEY: &'static str = "dashboard-storage";

    fn seed() -> Self {
        DashboardState {
            features: default_features(),
            chat_bubble_size: ChatBubbleSize::Medium,
            news_settings: NewsSettings::default(),
            video_settings: VideoSettings {
                enabled: true,
                embed_url: String::new(),
                autoplay: false,
            },
        }
    }
}

impl Store<DashboardState> {
    pub fn layout(&self) -> &DashboardState {
        self.state()
    }

    /// Replace the feature list, renumbering `order` by position so a
    /// reordered list always renders as sent.
    pub fn set_features(&mut self, features: Vec<FeatureItem>) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = features.iter().find(|f| !seen.insert(f.id.as_str())) {
            return Err(format!("Duplicate feature id: {}", dup.id));
        }
        self.state_mut().features = features
            .into_iter()
            .enumerate()
            .map(|(i, mut f)| {
                f.order = i as u32;
                f
            })
            .collect();
        Ok(())
    }

    pub fn toggle_feature(&mut self, id: &str) -> Result<FeatureItem, StorageError> {
        storage::modify(&mut self.state_mut().features, id, "Feature", |f| {
            f.enabled = !f.enabled;
        })
    }

    pub fn set_feature_width(&mut self, id: &str, width: FeatureWidth) -> Result<FeatureItem, StorageError> {
        storage::modify(&mut self.state_mut().features, id, "Feature", |f| {
            f.width = width;
        })
    }

    pub fn reset_features(&mut self) {
        self.state_mut().features = default_features();
    }

    pub fn set_chat_bubble_size(&mut self, size: ChatBubbleSize) {
        self.state_mut().chat_bubble_size = size;
    }

    pub fn update_news_settings(&mut self, patch: NewsSettingsPatch) -> Result<(), String> {
        if patch.display_count == Some(0) || patch.refresh_interval == Some(0) {
            return Err("News displayCount and refreshInterval must be positive".to_string());
        }
        let settings = &mut self.state_mut().news_settings;
        apply_patch!(settings, patch; enabled, auto_scroll, refresh_interval, display_count);
        Ok(())
    }

    pub fn update_video_settings(&mut self, patch: VideoSettingsPatch) {
        let settings = &mut self.state_mut().video_settings;
        apply_patch!(settings, patch; enabled, embed_url, autoplay);
    }

    /// Features that should render, in display order.
    pub fn enabled_features(&self) -> Vec<FeatureItem> {
        let mut features: Vec<FeatureItem> = self
            .state()
            .features
            .iter()
            .filter(|f| f.enabled)
            .cloned()
            .collect();
        features.sort_by_key(|f| f.order);
        features
    }

    /// Apply a combined settings patch. Nothing is changed if any part is
    /// rejected.
    pub fn apply_dashboard_patch(&mut self, patch: DashboardPatch) -> Result<(), String> {
        let before = self.state().clone();
        let result = (|| -> Result<(), String> {
            if let Some(features) = patch.features {
                self.set_features(features)?;
            }
            if let Some(widths) = patch.feature_widths {
                for (id, width) in widths {
                    self.set_feature_width(&id, width).map_err(|e| e.to_string())?;
                }
            }
            if let Some(size) = patch.chat_bubble_size {
                self.set_chat_bubble_size(size);
            }
            if let Some(news) = patch.news_settings {
                self.update_news_settings(news)?;
            }
            if let Some(video) = patch.video_settings {
                self.update_video_settings(video);
            }
            Ok(())
        })();
        if result.is_err() {
            *self.state_mut() = before;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::temp_data_dir;

    fn store() -> Store<DashboardState> {
        Store::open(&temp_data_dir()).unwrap()
    }

    #[test]
    fn defaults_render_all_nine_widgets() {
        let store = store();
        let ids: Vec<_> = store.enabled_features().into_iter().map(|f| f.id).collect();
        assert_eq!(ids.len(), 9);
        assert_eq!(ids[0], "prayer");
        assert_eq!(ids[8], "video");
    }

    #[test]
    fn toggle_width_and_reset() {
        let mut store = store();
        assert!(!store.toggle_feature("news").unwrap().enabled);
        assert_eq!(store.enabled_features().len(), 8);
        store.set_feature_width("calendar", FeatureWidth::Full).unwrap();
        assert!(store.toggle_feature("weather").is_err());

        store.reset_features();
        assert_eq!(store.layout().features, default_features());
    }

    #[test]
    fn reorder_renumbers() {
        let mut store = store();
        let mut features = store.layout().features.clone();
        features.reverse();
        store.set_features(features).unwrap();
        let first = store.enabled_features().into_iter().next().unwrap();
        assert_eq!(first.id, "video");
        assert_eq!(first.order, 0);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut store = store();
        let mut features = default_features();
        features.push(features[0].clone());
        assert!(store.set_features(features).is_err());
    }

    #[test]
    fn settings_patch_is_all_or_nothing() {
        let mut store = store();
        let bad: DashboardPatch = serde_json::from_value(serde_json::json!({
            "chatBubbleSize": "large",
            "newsSettings": { "displayCount": 0 }
        }))
        .unwrap();
        assert!(store.apply_dashboard_patch(bad).is_err());
        assert_eq!(store.layout().chat_bubble_size, ChatBubbleSize::Medium);

        let good: DashboardPatch = serde_json::from_value(serde_json::json!({
            "chatBubbleSize": "small",
            "newsSettings": { "displayCount": 3 },
            "videoSettings": { "embedUrl": "https://www.youtube.com/embed/x" },
            "featureWidths": { "video": "full" }
        }))
        .unwrap();
        store.apply_dashboard_patch(good).unwrap();
        let layout = store.layout();
        assert_eq!(layout.chat_bubble_size, ChatBubbleSize::Small);
        assert_eq!(layout.news_settings.display_count, 3);
        assert!(layout.news_settings.auto_scroll);
        assert_eq!(layout.video_settings.embed_url, "https://www.youtube.com/embed/x");
        assert_eq!(
            layout.features.iter().find(|f| f.id == "video").unwrap().width,
            FeatureWidth::Full
        );
    }
}
