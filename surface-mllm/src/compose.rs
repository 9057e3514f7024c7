//! View composition
//!
//! Builds the comparison tables from a session snapshot and the display
//! state. Composition only selects and renders; it never changes the stores.

use crate::display::{ControlGroup, DetailLevel, DisplayState, RepresentationType, ViewMode};
use crate::grid::TrialGrid;
use crate::highlight::{highlight, highlight_with};
use crate::model::{ModelId, ModelRun};
use crate::store::SessionState;
use crate::variation::{model_counts, support_word};
use colored::Colorize;

/// Placeholder for a missing grid cell
pub const NOT_AVAILABLE: &str = "N/A";

/// Everything a frontend needs to draw the comparison page
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub controls: ControlGroup,
    pub summary: Option<Vec<SummaryRow>>,
    pub variation_aware: Option<VariationAware>,
    pub descriptions: Option<Vec<DescriptionRow>>,
    pub grid: GridView,
    pub detail: Option<DetailView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub label: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariationAware {
    pub representation: RepresentationType,
    /// `None` when the summary carries no such rendering
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptionRow {
    pub key: String,
    pub model: ModelId,
    pub prompt: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridView {
    pub models: Vec<ModelId>,
    /// One row per trial; missing cells hold [`NOT_AVAILABLE`]
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailView {
    pub key: String,
    pub model: ModelId,
    pub body: DetailBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailBody {
    Response(String),
    Sentences(Vec<String>),
    Atomic(Vec<FactGroup>),
}

/// A sentence and the atomic facts extracted from it
#[derive(Debug, Clone, PartialEq)]
pub struct FactGroup {
    pub sentence: String,
    pub facts: Vec<FactLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactLine {
    pub text: String,
    /// Confidence word from the share of runs stating the fact
    pub support: &'static str,
    /// Per-model tally, e.g. `( GPT: 2/3 Claude: 1/3 )`
    pub sources: String,
}

/// Compose the view, highlighting annotation groups as HTML spans when the
/// colour indicator is on
pub fn compose(state: &SessionState, display: &DisplayState) -> View {
    compose_with(state, display, &highlight)
}

/// Compose the view with a custom annotation marker
pub fn compose_with(
    state: &SessionState,
    display: &DisplayState,
    marker: &dyn Fn(&str) -> String,
) -> View {
    let mark = |text: &str| {
        if display.show_color_uncertainty_indicator {
            marker(text)
        } else {
            text.to_string()
        }
    };

    let controls = display.controls();
    let variations = controls == ControlGroup::Variation;
    let visible = display.visible(&state.responses);
    // Single-run view narrows the list and grid; fact support still counts
    // every visible run
    let shown: Vec<(&str, &ModelRun)> = match display.view_mode {
        ViewMode::One => visible
            .iter()
            .filter(|(key, _)| *key == display.current_id)
            .copied()
            .collect(),
        _ => visible.clone(),
    };

    let summary = (variations && display.show_variation_summary).then(|| {
        let s = &state.summary;
        [
            ("Agreements", &s.similarity),
            ("Disagreements", &s.disagreement),
            ("Unique Points", &s.uniqueness),
        ]
        .into_iter()
        .map(|(label, text)| SummaryRow {
            label,
            text: text.as_deref().map(mark).unwrap_or_default(),
        })
        .collect()
    });

    let variation_aware = (variations && display.show_variation_aware_description).then(|| {
        VariationAware {
            representation: display.representation_type,
            text: state.summary.rendering(display.representation_type).map(mark),
        }
    });

    let descriptions = (display.show_description_list || !variations).then(|| {
        shown
            .iter()
            .map(|(key, run)| DescriptionRow {
                key: key.to_string(),
                model: run.model,
                prompt: run.prompt.clone(),
                description: mark(&run.description),
            })
            .collect()
    });

    let aligned = TrialGrid::align(shown.iter().map(|(_, run)| *run));
    let grid = GridView {
        rows: aligned
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Some(run) => mark(&run.description),
                        None => NOT_AVAILABLE.to_string(),
                    })
                    .collect()
            })
            .collect(),
        models: aligned.models,
    };

    let detail = visible
        .iter()
        .find(|(key, _)| *key == display.current_id)
        .map(|(key, run)| DetailView {
            key: key.to_string(),
            model: run.model,
            body: detail_body(run, &visible, display.detail_level, &mark),
        });

    View {
        controls,
        summary,
        variation_aware,
        descriptions,
        grid,
        detail,
    }
}

fn detail_body(
    run: &ModelRun,
    visible: &[(&str, &ModelRun)],
    level: DetailLevel,
    mark: &dyn Fn(&str) -> String,
) -> DetailBody {
    match level {
        DetailLevel::Response => DetailBody::Response(mark(&run.description)),
        DetailLevel::Sentence => {
            DetailBody::Sentences(run.sentences().iter().map(|s| mark(s.as_str())).collect())
        }
        DetailLevel::Atomic => DetailBody::Atomic(
            run.sentences()
                .into_iter()
                .enumerate()
                .map(|(index, sentence)| FactGroup {
                    facts: run
                        .facts_for(index)
                        .iter()
                        .map(|fact| fact_line(fact, visible))
                        .collect(),
                    sentence: mark(&sentence),
                })
                .collect(),
        ),
    }
}

/// Score a fact by how many visible runs state it too
fn fact_line(fact: &str, visible: &[(&str, &ModelRun)]) -> FactLine {
    let normalised = normalise_fact(fact);
    let sources: Vec<ModelId> = visible
        .iter()
        .filter(|(_, run)| {
            run.atomic_facts.as_ref().is_some_and(|facts| {
                facts
                    .values()
                    .flatten()
                    .any(|other| normalise_fact(other) == normalised)
            })
        })
        .map(|(_, run)| run.model)
        .collect();

    let fraction = if visible.is_empty() {
        0.0
    } else {
        sources.len() as f64 / visible.len() as f64
    };
    let trials = TrialGrid::align(visible.iter().map(|(_, run)| *run)).row_count();

    FactLine {
        text: fact.to_string(),
        support: support_word(fraction),
        sources: model_counts(sources, trials as u32),
    }
}

fn normalise_fact(fact: &str) -> String {
    fact.trim()
        .trim_end_matches('.')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Terminal marker: colours each annotation group, cycling through six colours
pub fn terminal_marker(text: &str) -> String {
    highlight_with(text, |index, group| {
        let coloured = match index % 6 {
            0 => group.yellow(),
            1 => group.green(),
            2 => group.cyan(),
            3 => group.magenta(),
            4 => group.blue(),
            _ => group.red(),
        };
        coloured.to_string()
    })
}

/// Plain-text rendering of a view for the terminal client
pub fn render_text(view: &View) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(rows) = &view.summary {
        lines.push("VARIATION SUMMARY".bold().to_string());
        for row in rows {
            lines.push(row.label.bold().to_string());
            lines.push(or_na(&row.text).to_string());
            lines.push(String::new());
        }
    }

    if let Some(aware) = &view.variation_aware {
        lines.push(format!(
            "{} [{}]",
            "VARIATION-AWARE DESCRIPTION".bold(),
            aware.representation.label()
        ));
        lines.push(or_na(aware.text.as_deref().unwrap_or_default()).to_string());
        lines.push(String::new());
    }

    if let Some(rows) = &view.descriptions {
        lines.push("DESCRIPTIONS".bold().to_string());
        for row in rows {
            lines.push(format!(
                "{} {} {}",
                format!("[{}]", row.key).dimmed(),
                row.model.display_name().cyan(),
                row.prompt.dimmed()
            ));
            lines.push(row.description.clone());
            lines.push(String::new());
        }
    }

    if !view.grid.rows.is_empty() {
        lines.push("TRIALS".bold().to_string());
        for (k, row) in view.grid.rows.iter().enumerate() {
            lines.push(format!("Trial {}", k + 1).bold().to_string());
            for (model, cell) in view.grid.models.iter().zip(row) {
                let cell = if cell == NOT_AVAILABLE {
                    cell.dimmed().to_string()
                } else {
                    cell.clone()
                };
                lines.push(format!("  {}: {}", model.display_name().cyan(), cell));
            }
        }
        lines.push(String::new());
    }

    if let Some(detail) = &view.detail {
        lines.push(format!(
            "{} {} ({})",
            "DETAIL".bold(),
            detail.key,
            detail.model.display_name().cyan()
        ));
        match &detail.body {
            DetailBody::Response(text) => lines.push(text.clone()),
            DetailBody::Sentences(sentences) => {
                for (i, sentence) in sentences.iter().enumerate() {
                    lines.push(format!("{:>3}. {}", i + 1, sentence));
                }
            }
            DetailBody::Atomic(groups) => {
                for group in groups {
                    lines.push(format!("- {}", group.sentence));
                    for fact in &group.facts {
                        lines.push(format!(
                            "    * {} {} {}",
                            fact.text,
                            fact.support.yellow(),
                            fact.sources.dimmed()
                        ));
                    }
                }
            }
        }
    }

    lines.into_iter().map(|line| line + "\n").collect()
}

fn or_na(text: &str) -> &str {
    if text.trim().is_empty() {
        NOT_AVAILABLE
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResponseSet, VariationSummary};
    use std::collections::{BTreeMap, BTreeSet};

    fn state() -> SessionState {
        let mut responses = ResponseSet::new();
        let mut gpt = ModelRun::new(1, ModelId::Gpt, "Describe.", "A shirt (blue). A hat.");
        gpt.atomic_facts = Some(BTreeMap::from([(
            0,
            vec!["There is a shirt.".to_string(), "The shirt is blue.".to_string()],
        )]));
        let mut claude = ModelRun::new(2, ModelId::Claude, "Describe.", "A shirt.");
        claude.atomic_facts = Some(BTreeMap::from([(0, vec!["there is a shirt".to_string()])]));
        responses.insert("1", gpt);
        responses.insert("2", claude);
        responses.insert("3", ModelRun::new(3, ModelId::Gpt, "Describe.", "A coat."));

        SessionState {
            responses,
            summary: VariationSummary {
                similarity: Some("- Shirt".into()),
                model_diff: Some("Shirt (2 of 2 GPT)".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_sections_follow_flags() {
        let state = state();
        let display = DisplayState {
            show_variation_summary: false,
            show_color_uncertainty_indicator: false,
            ..Default::default()
        };
        let view = compose(&state, &display);
        assert!(view.summary.is_none());
        let aware = view.variation_aware.unwrap();
        assert_eq!(aware.representation, RepresentationType::Model);
        assert_eq!(aware.text.as_deref(), Some("Shirt (2 of 2 GPT)"));
        assert_eq!(view.descriptions.unwrap().len(), 3);
    }

    #[test]
    fn test_raw_mode_hides_variation_sections() {
        let display = DisplayState {
            show_variations: false,
            show_description_list: false,
            ..Default::default()
        };
        let view = compose(&state(), &display);
        assert_eq!(view.controls, ControlGroup::RawDescriptions);
        assert!(view.summary.is_none());
        assert!(view.variation_aware.is_none());
        assert!(view.descriptions.is_some());
    }

    #[test]
    fn test_missing_rendering_is_none() {
        let display = DisplayState {
            representation_type: RepresentationType::Natural,
            ..Default::default()
        };
        let view = compose(&state(), &display);
        assert_eq!(view.variation_aware.unwrap().text, None);
    }

    #[test]
    fn test_highlighting_toggle() {
        let on = compose(&state(), &DisplayState::default());
        let rows = on.descriptions.unwrap();
        assert!(rows[0].description.contains("<span"));

        let off = compose(
            &state(),
            &DisplayState {
                show_color_uncertainty_indicator: false,
                ..Default::default()
            },
        );
        assert_eq!(off.descriptions.unwrap()[0].description, "A shirt (blue). A hat.");
    }

    #[test]
    fn test_grid_respects_filter_and_fills_na() {
        let display = DisplayState {
            show_color_uncertainty_indicator: false,
            ..Default::default()
        };
        let view = compose(&state(), &display);
        assert_eq!(view.grid.models, vec![ModelId::Gpt, ModelId::Claude]);
        assert_eq!(view.grid.rows.len(), 2);
        assert_eq!(view.grid.rows[1], vec!["A coat.".to_string(), NOT_AVAILABLE.to_string()]);

        let only_claude = DisplayState {
            selected_models: BTreeSet::from([ModelId::Claude]),
            ..display
        };
        let view = compose(&state(), &only_claude);
        assert_eq!(view.grid.models, vec![ModelId::Claude]);
        assert_eq!(view.grid.rows.len(), 1);
    }

    #[test]
    fn test_detail_levels() {
        let mut display = DisplayState {
            show_color_uncertainty_indicator: false,
            detail_level: DetailLevel::Sentence,
            ..Default::default()
        };
        let view = compose(&state(), &display);
        let detail = view.detail.unwrap();
        assert_eq!(detail.key, "1");
        assert_eq!(
            detail.body,
            DetailBody::Sentences(vec!["A shirt (blue).".into(), "A hat.".into()])
        );

        display.detail_level = DetailLevel::Atomic;
        let view = compose(&state(), &display);
        let DetailBody::Atomic(groups) = view.detail.unwrap().body else {
            panic!("expected atomic detail");
        };
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].facts.len(), 2);
        let shared = &groups[0].facts[0];
        // Stated by 2 of the 3 visible runs
        assert_eq!(shared.support, "maybe");
        assert_eq!(shared.sources, "( GPT: 1/2 Claude: 1/2 )");
        assert_eq!(groups[0].facts[1].support, "has a chance");
        assert!(groups[1].facts.is_empty());
    }

    #[test]
    fn test_detail_hidden_when_filtered_out() {
        let display = DisplayState {
            selected_models: BTreeSet::from([ModelId::Claude]),
            ..Default::default()
        };
        assert!(compose(&state(), &display).detail.is_none());
    }

    #[test]
    fn test_single_run_view_narrows_list_and_grid() {
        let display = DisplayState {
            view_mode: ViewMode::One,
            current_id: "2".to_string(),
            show_color_uncertainty_indicator: false,
            detail_level: DetailLevel::Atomic,
            ..Default::default()
        };
        let view = compose(&state(), &display);

        let rows = view.descriptions.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "2");
        assert_eq!(view.grid.models, vec![ModelId::Claude]);
        assert_eq!(view.grid.rows, vec![vec!["A shirt.".to_string()]]);

        // Support is still measured over every visible run
        let DetailBody::Atomic(groups) = view.detail.unwrap().body else {
            panic!("expected atomic detail");
        };
        assert_eq!(groups[0].facts[0].sources, "( GPT: 1/2 Claude: 1/2 )");

        let all = compose(&state(), &DisplayState { view_mode: ViewMode::All, ..display });
        assert_eq!(all.descriptions.unwrap().len(), 3);
    }

    #[test]
    fn test_render_text_mentions_sections() {
        colored::control::set_override(false);
        let view = compose_with(&state(), &DisplayState::default(), &terminal_marker);
        let text = render_text(&view);
        assert!(text.contains("VARIATION SUMMARY"));
        assert!(text.contains("Disagreements\nN/A"));
        assert!(text.contains("Trial 2"));
        assert!(text.contains("Claude: N/A"));
        assert!(text.contains("DETAIL 1 (GPT)"));
        assert!(text.ends_with('\n'));
    }
}
