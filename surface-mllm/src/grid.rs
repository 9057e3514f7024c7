//! Positional alignment of trials across models
//!
//! Each model's runs are sorted by `id` and the k-th run lands in trial row k.
//! This is a positional join: row k of GPT and row k of Claude share a row
//! only because of their ordinal, not because they share an id.

use crate::model::{ModelId, ModelRun};
use std::collections::BTreeMap;

/// Trial rows by model columns
#[derive(Debug, Clone, PartialEq)]
pub struct TrialGrid<'a> {
    /// Column order, restricted to models that have runs
    pub models: Vec<ModelId>,
    /// `rows[k][c]` is trial k+1 of `models[c]`, if that model has one
    pub rows: Vec<Vec<Option<&'a ModelRun>>>,
}

impl<'a> TrialGrid<'a> {
    /// Align runs into trial rows
    pub fn align<I>(runs: I) -> Self
    where
        I: IntoIterator<Item = &'a ModelRun>,
    {
        let mut groups: BTreeMap<ModelId, Vec<&'a ModelRun>> = BTreeMap::new();
        for run in runs {
            groups.entry(run.model).or_default().push(run);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|run| run.id);
        }

        let row_count = groups.values().map(Vec::len).max().unwrap_or(0);
        let rows = (0..row_count)
            .map(|k| groups.values().map(|group| group.get(k).copied()).collect())
            .collect();

        Self {
            models: groups.into_keys().collect(),
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell for a 1-indexed trial row and a model
    pub fn cell(&self, trial: usize, model: ModelId) -> Option<&'a ModelRun> {
        let column = self.models.iter().position(|m| *m == model)?;
        self.rows
            .get(trial.checked_sub(1)?)
            .and_then(|row| row[column])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResponseSet;

    #[test]
    fn test_uneven_groups() {
        let mut set = ResponseSet::new();
        set.insert("a", ModelRun::new(1, ModelId::Gpt, "p", "g1"));
        set.insert("b", ModelRun::new(2, ModelId::Gpt, "p", "g2"));
        set.insert("c", ModelRun::new(3, ModelId::Gpt, "p", "g3"));
        set.insert("d", ModelRun::new(1, ModelId::Claude, "p", "c1"));
        set.insert("e", ModelRun::new(2, ModelId::Claude, "p", "c2"));

        let grid = TrialGrid::align(set.iter().map(|(_, r)| r));
        assert_eq!(grid.row_count(), 3);
        assert_eq!(grid.models, vec![ModelId::Gpt, ModelId::Claude]);
        assert_eq!(grid.cell(3, ModelId::Gpt).unwrap().description, "g3");
        assert!(grid.cell(3, ModelId::Claude).is_none());
        assert!(grid.cell(0, ModelId::Gpt).is_none());
    }

    #[test]
    fn test_alignment_is_positional() {
        // Ids interleave across models, as in pipeline output numbered 1..N
        let runs = vec![
            ModelRun::new(5, ModelId::Claude, "p", "c-second"),
            ModelRun::new(1, ModelId::Gpt, "p", "g-first"),
            ModelRun::new(2, ModelId::Claude, "p", "c-first"),
            ModelRun::new(4, ModelId::Gpt, "p", "g-second"),
        ];

        let grid = TrialGrid::align(&runs);
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.cell(1, ModelId::Claude).unwrap().description, "c-first");
        assert_eq!(grid.cell(2, ModelId::Gpt).unwrap().description, "g-second");
    }

    #[test]
    fn test_empty() {
        let grid = TrialGrid::align(std::iter::empty());
        assert_eq!(grid.row_count(), 0);
        assert!(grid.models.is_empty());
    }
}
