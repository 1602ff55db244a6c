use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::Media;

/// Transient session state for the multi-step generation flow.
///
/// Persisted alongside the settings so a reloaded session picks up where it
/// left off. The deleted-id overlay serializes as an ordered sequence and
/// rehydrates into a set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationUiState {
    /// Append-only, insertion order = generation order. The rendering layer
    /// displays newest first.
    pub all_generated_media: Vec<Media>,
    /// Soft-delete overlay: a media item is visible iff its id is absent.
    pub deleted_media_ids: BTreeSet<String>,
    pub lightbox_open: bool,
    pub lightbox_index: usize,
    pub show_magic_text: bool,
    /// The server-optimized rewrite currently displayed, if any.
    pub optimized_prompt_cache: String,
    /// Non-empty only while an optimization is pending or its result is
    /// displayed unreverted.
    pub original_prompt_before_optimization: String,
    /// True exactly while a submitted job has produced no visible output and
    /// no unrecoverable error has been shown.
    pub show_progress_card: bool,
}

impl GenerationUiState {
    /// Media items not hidden by the deleted overlay.
    pub fn visible_media(&self) -> Vec<&Media> {
        self.all_generated_media
            .iter()
            .filter(|m| !self.deleted_media_ids.contains(&m.id))
            .collect()
    }

    /// Append newly generated media, stamping a creation time where the
    /// backend omitted one.
    pub fn append_media(&mut self, media: Vec<Media>) {
        for mut item in media {
            if item.created_at.is_none() {
                item.created_at = Some(chrono::Utc::now().to_rfc3339());
            }
            self.all_generated_media.push(item);
        }
        self.clamp_lightbox();
    }

    /// Soft-delete a media item. Idempotent.
    pub fn delete_media(&mut self, media_id: &str) {
        self.deleted_media_ids.insert(media_id.to_string());
        self.all_generated_media.retain(|m| m.id != media_id);
        self.clamp_lightbox();
    }

    /// Open the lightbox at the given visible index (clamped).
    pub fn open_lightbox(&mut self, index: usize) {
        if self.visible_media().is_empty() {
            return;
        }
        self.lightbox_open = true;
        self.lightbox_index = index;
        self.clamp_lightbox();
    }

    pub fn close_lightbox(&mut self) {
        self.lightbox_open = false;
    }

    /// Advance the lightbox. Clamps at the last visible item, no wraparound.
    pub fn lightbox_next(&mut self) {
        if !self.lightbox_open {
            return;
        }
        self.lightbox_index = self.lightbox_index.saturating_add(1);
        self.clamp_lightbox();
    }

    /// Step the lightbox back. Clamps at index zero, no wraparound.
    pub fn lightbox_previous(&mut self) {
        if !self.lightbox_open {
            return;
        }
        self.lightbox_index = self.lightbox_index.saturating_sub(1);
        self.clamp_lightbox();
    }

    /// Record that an optimization of `original` is pending or displayed.
    pub fn note_optimization(&mut self, original: &str, optimized: &str) {
        self.original_prompt_before_optimization = original.to_string();
        self.optimized_prompt_cache = optimized.to_string();
    }

    /// Forget any optimization state. Called when the user edits the prompt
    /// manually or reverts the rewrite.
    pub fn clear_optimization_cache(&mut self) {
        self.optimized_prompt_cache.clear();
        self.original_prompt_before_optimization.clear();
    }

    fn clamp_lightbox(&mut self) {
        let visible = self.visible_media().len();
        if visible == 0 {
            self.lightbox_open = false;
            self.lightbox_index = 0;
        } else if self.lightbox_index >= visible {
            self.lightbox_index = visible - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(id: &str) -> Media {
        Media {
            id: id.to_string(),
            url: format!("https://cdn.example/{id}.png"),
            mime_type: None,
            width: None,
            height: None,
            created_at: None,
        }
    }

    fn state_with(ids: &[&str]) -> GenerationUiState {
        let mut state = GenerationUiState::default();
        state.append_media(ids.iter().map(|id| media(id)).collect());
        state
    }

    #[test]
    fn test_append_preserves_order_and_stamps_time() {
        let state = state_with(&["a", "b", "c"]);
        let ids: Vec<&str> = state
            .all_generated_media
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(state.all_generated_media[0].created_at.is_some());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut state = state_with(&["a", "b", "c"]);
        state.delete_media("b");
        let once: Vec<String> = state.visible_media().iter().map(|m| m.id.clone()).collect();
        state.delete_media("b");
        let twice: Vec<String> = state.visible_media().iter().map(|m| m.id.clone()).collect();
        assert_eq!(once, twice);
        assert_eq!(once, vec!["a", "c"]);
    }

    #[test]
    fn test_deleted_overlay_hides_rehydrated_media() {
        let mut state = state_with(&["a", "b"]);
        state.deleted_media_ids.insert("c".to_string());
        state.append_media(vec![media("c")]);
        let visible: Vec<&str> = state.visible_media().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(visible, vec!["a", "b"]);
    }

    #[test]
    fn test_lightbox_clamps_no_wraparound() {
        let mut state = state_with(&["a", "b", "c"]);
        state.open_lightbox(2);
        state.lightbox_next();
        assert_eq!(state.lightbox_index, 2);
        state.lightbox_next();
        assert_eq!(state.lightbox_index, 2);
        state.lightbox_previous();
        state.lightbox_previous();
        assert_eq!(state.lightbox_index, 0);
        state.lightbox_previous();
        assert_eq!(state.lightbox_index, 0);
    }

    #[test]
    fn test_lightbox_open_clamps_out_of_range_index() {
        let mut state = state_with(&["a", "b"]);
        state.open_lightbox(10);
        assert!(state.lightbox_open);
        assert_eq!(state.lightbox_index, 1);
    }

    #[test]
    fn test_lightbox_closes_when_all_deleted() {
        let mut state = state_with(&["a"]);
        state.open_lightbox(0);
        state.delete_media("a");
        assert!(!state.lightbox_open);
        assert_eq!(state.lightbox_index, 0);
    }

    #[test]
    fn test_delete_before_lightbox_index_shifts_clamp() {
        let mut state = state_with(&["a", "b", "c"]);
        state.open_lightbox(2);
        state.delete_media("a");
        // Two visible items remain; the index must stay in range.
        assert_eq!(state.lightbox_index, 1);
    }

    #[test]
    fn test_deleted_ids_serialize_as_sequence() {
        let mut state = GenerationUiState::default();
        state.deleted_media_ids.insert("b".to_string());
        state.deleted_media_ids.insert("a".to_string());
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"deletedMediaIds\":[\"a\",\"b\"]"));
        let back: GenerationUiState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.deleted_media_ids.len(), 2);
    }

    #[test]
    fn test_optimization_cache_lifecycle() {
        let mut state = GenerationUiState::default();
        state.note_optimization("a cat", "a majestic cat, detailed fur");
        assert_eq!(state.original_prompt_before_optimization, "a cat");
        state.clear_optimization_cache();
        assert!(state.optimized_prompt_cache.is_empty());
        assert!(state.original_prompt_before_optimization.is_empty());
    }
}
