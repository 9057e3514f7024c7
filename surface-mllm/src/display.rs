//! Display-mode state and its controller
//!
//! `DisplayState` is pure view configuration: it selects which subset and
//! which rendering of the stored data is shown and never changes the data.
//! The controller publishes every change through a `watch` channel so views
//! can re-render.

use crate::model::{ModelId, ModelRun, ResponseSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::watch;

/// Which rendering of the variation-aware description is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepresentationType {
    /// Natural-language confidence per claim
    Natural,
    /// Numeric support per claim
    Percentage,
    /// Variation markers only
    None,
    /// Per-claim model attribution
    #[default]
    Model,
}

impl RepresentationType {
    pub const ALL: [RepresentationType; 4] = [
        RepresentationType::None,
        RepresentationType::Model,
        RepresentationType::Percentage,
        RepresentationType::Natural,
    ];

    /// Button label
    pub fn label(&self) -> &'static str {
        match self {
            RepresentationType::None => "Variation Only",
            RepresentationType::Model => "Model Source",
            RepresentationType::Percentage => "Percentage",
            RepresentationType::Natural => "Language",
        }
    }
}

/// Granularity for a single run's description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    #[default]
    Response,
    Sentence,
    Atomic,
}

/// Top-level layout of the comparison page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Every run side by side
    All,
    /// A single run, chosen by `current_id`
    One,
    /// Summary tables over all runs
    #[default]
    Aggregated,
    /// Sentence and atomic-fact breakdown
    Augmented,
}

/// The control group presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlGroup {
    /// Per-model description controls
    RawDescriptions,
    /// Variation summary and representation controls
    Variation,
}

/// Independently togglable view configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayState {
    pub representation_type: RepresentationType,
    pub show_variations: bool,
    /// Models shown; empty means no filter
    pub selected_models: BTreeSet<ModelId>,
    /// Prompts shown; empty means no filter
    pub selected_prompts: BTreeSet<String>,
    pub show_variation_summary: bool,
    pub show_variation_aware_description: bool,
    pub show_description_list: bool,
    pub show_color_uncertainty_indicator: bool,
    pub detail_level: DetailLevel,
    pub view_mode: ViewMode,
    /// Key of the run shown in single-run views
    pub current_id: String,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            representation_type: RepresentationType::default(),
            show_variations: true,
            selected_models: ModelId::defaults().into_iter().collect(),
            selected_prompts: BTreeSet::new(),
            show_variation_summary: true,
            show_variation_aware_description: true,
            show_description_list: true,
            show_color_uncertainty_indicator: true,
            detail_level: DetailLevel::default(),
            view_mode: ViewMode::default(),
            current_id: "1".to_string(),
        }
    }
}

impl DisplayState {
    /// Which control group is presented; the other group's flags persist
    pub fn controls(&self) -> ControlGroup {
        if self.show_variations {
            ControlGroup::Variation
        } else {
            ControlGroup::RawDescriptions
        }
    }

    /// Whether a run passes both the model and the prompt filter
    pub fn is_visible(&self, run: &ModelRun) -> bool {
        let model_match =
            self.selected_models.is_empty() || self.selected_models.contains(&run.model);
        let prompt_match =
            self.selected_prompts.is_empty() || self.selected_prompts.contains(&run.prompt);
        model_match && prompt_match
    }

    /// Runs of `set` that pass the filters, in key order
    pub fn visible<'a>(&self, set: &'a ResponseSet) -> Vec<(&'a str, &'a ModelRun)> {
        set.iter().filter(|(_, run)| self.is_visible(run)).collect()
    }
}

/// Owns the display state and notifies observers of every change
pub struct DisplayController {
    tx: watch::Sender<DisplayState>,
}

impl Default for DisplayController {
    fn default() -> Self {
        Self::new(DisplayState::default())
    }
}

impl DisplayController {
    pub fn new(state: DisplayState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx }
    }

    /// Receiver that observes every subsequent change
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.tx.subscribe()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> DisplayState {
        self.tx.borrow().clone()
    }

    pub fn set_representation_type(&self, representation: RepresentationType) {
        self.update(|s| replace(&mut s.representation_type, representation));
    }

    pub fn set_show_variations(&self, show: bool) {
        self.update(|s| replace(&mut s.show_variations, show));
    }

    pub fn set_selected_models(&self, models: BTreeSet<ModelId>) {
        self.update(|s| replace(&mut s.selected_models, models));
    }

    /// Checkbox semantics: add the model if absent, remove it if present
    pub fn toggle_model(&self, model: ModelId) {
        self.update(|s| {
            if !s.selected_models.remove(&model) {
                s.selected_models.insert(model);
            }
            true
        });
    }

    pub fn set_selected_prompts(&self, prompts: BTreeSet<String>) {
        self.update(|s| replace(&mut s.selected_prompts, prompts));
    }

    pub fn toggle_prompt(&self, prompt: &str) {
        self.update(|s| {
            if !s.selected_prompts.remove(prompt) {
                s.selected_prompts.insert(prompt.to_string());
            }
            true
        });
    }

    pub fn set_show_variation_summary(&self, show: bool) {
        self.update(|s| replace(&mut s.show_variation_summary, show));
    }

    pub fn set_show_variation_aware_description(&self, show: bool) {
        self.update(|s| replace(&mut s.show_variation_aware_description, show));
    }

    pub fn set_show_description_list(&self, show: bool) {
        self.update(|s| replace(&mut s.show_description_list, show));
    }

    pub fn set_show_color_uncertainty_indicator(&self, show: bool) {
        self.update(|s| replace(&mut s.show_color_uncertainty_indicator, show));
    }

    pub fn set_detail_level(&self, level: DetailLevel) {
        self.update(|s| replace(&mut s.detail_level, level));
    }

    pub fn set_view_mode(&self, mode: ViewMode) {
        self.update(|s| replace(&mut s.view_mode, mode));
    }

    pub fn set_current_id(&self, id: impl Into<String>) {
        let id = id.into();
        self.update(|s| replace(&mut s.current_id, id));
    }

    /// Restore every field to its default
    pub fn reset(&self) {
        self.update(|s| replace(s, DisplayState::default()));
    }

    fn update(&self, modify: impl FnOnce(&mut DisplayState) -> bool) {
        self.tx.send_if_modified(modify);
    }
}

/// Assign `value` to `slot`, reporting whether it changed
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> ResponseSet {
        let mut set = ResponseSet::new();
        set.insert("1", ModelRun::new(1, ModelId::Gpt, "Describe.", "gpt one"));
        set.insert("2", ModelRun::new(1, ModelId::Claude, "Describe.", "claude one"));
        set.insert("3", ModelRun::new(1, ModelId::Gemini, "Describe.", "gemini one"));
        set.insert("4", ModelRun::new(2, ModelId::Claude, "Tell me more.", "claude two"));
        set
    }

    #[test]
    fn test_empty_filter_shows_everything() {
        let set = sample_set();
        let state = DisplayState {
            selected_models: BTreeSet::new(),
            ..Default::default()
        };
        assert_eq!(state.visible(&set).len(), set.len());
    }

    #[test]
    fn test_model_filter() {
        let set = sample_set();
        let state = DisplayState {
            selected_models: [ModelId::Claude].into_iter().collect(),
            ..Default::default()
        };
        let visible = state.visible(&set);
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|(_, run)| run.model == ModelId::Claude));
    }

    #[test]
    fn test_model_and_prompt_filters_combine() {
        let set = sample_set();
        let state = DisplayState {
            selected_models: [ModelId::Claude].into_iter().collect(),
            selected_prompts: ["Describe.".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let visible = state.visible(&set);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].0, "2");
    }

    #[test]
    fn test_representation_is_exclusive() {
        let controller = DisplayController::default();
        controller.set_representation_type(RepresentationType::Percentage);
        controller.set_representation_type(RepresentationType::Natural);
        assert_eq!(controller.state().representation_type, RepresentationType::Natural);
    }

    #[test]
    fn test_controls_follow_show_variations() {
        let controller = DisplayController::default();
        controller.set_show_variation_summary(false);
        assert_eq!(controller.state().controls(), ControlGroup::Variation);

        controller.set_show_variations(false);
        let state = controller.state();
        assert_eq!(state.controls(), ControlGroup::RawDescriptions);
        // Hidden controls keep their values
        assert!(!state.show_variation_summary);
    }

    #[test]
    fn test_observers_notified_only_on_change() {
        let controller = DisplayController::default();
        let mut rx = controller.subscribe();

        controller.set_show_description_list(true);
        assert!(!rx.has_changed().unwrap());

        controller.set_show_description_list(false);
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().show_description_list);
    }

    #[test]
    fn test_toggle_model_and_prompt() {
        let controller = DisplayController::default();
        controller.toggle_model(ModelId::Gpt);
        assert!(!controller.state().selected_models.contains(&ModelId::Gpt));
        controller.toggle_model(ModelId::Gpt);
        assert!(controller.state().selected_models.contains(&ModelId::Gpt));

        controller.toggle_prompt("Describe.");
        assert!(controller.state().selected_prompts.contains("Describe."));
        controller.toggle_prompt("Describe.");
        assert!(controller.state().selected_prompts.is_empty());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let controller = DisplayController::default();
        controller.set_detail_level(DetailLevel::Atomic);
        controller.set_view_mode(ViewMode::One);
        controller.set_current_id("7");
        controller.reset();
        assert_eq!(controller.state(), DisplayState::default());
    }
}
