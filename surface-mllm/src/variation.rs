//! Derived renderings of a variation-aware description
//!
//! The pipeline annotates every claim of the aggregated description with the
//! runs that support it, e.g. `blue shirt (3 of 3 GPT, 1 of 3 Claude)`. The
//! other three renderings are rewrites of those annotation groups.

use crate::model::ModelId;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static GROUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((.*?)\)").unwrap());
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Remove every annotation group, leaving only the described content
pub fn strip_attributions(model_diff: &str) -> String {
    GROUP.replace_all(model_diff, "").into_owned()
}

/// Replace each annotation group with the share of all runs that support it
///
/// Sums `n` over every `n of <num_trials>` mention in the group and divides by
/// `num_models * num_trials`. Groups are dropped when that product is zero.
pub fn to_percentages(model_diff: &str, num_trials: u32, num_models: usize) -> String {
    let total_possible = num_models as u64 * num_trials as u64;
    let Ok(mention) = Regex::new(&format!(r"(\d+) of {}\b", num_trials)) else {
        return model_diff.to_string();
    };

    GROUP
        .replace_all(model_diff, |caps: &regex::Captures| {
            if total_possible == 0 {
                return String::new();
            }
            let mentions: u64 = mention
                .captures_iter(&caps[1])
                .filter_map(|m| m[1].parse::<u64>().ok())
                .sum();
            let percentage = (mentions as f64 / total_possible as f64 * 100.0).round();
            format!("({}%)", percentage as u64)
        })
        .into_owned()
}

/// Replace each numeric annotation group with a support phrase
///
/// Groups without a number are left as they are.
pub fn to_natural_language(percentages: &str) -> String {
    GROUP
        .replace_all(percentages, |caps: &regex::Captures| {
            match NUMBER
                .find(&caps[0])
                .and_then(|m| m.as_str().parse::<u64>().ok())
            {
                Some(n) => format!("({})", support_phrase(n)),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Support phrase for a percentage
pub fn support_phrase(percentage: u64) -> &'static str {
    if percentage >= 75 {
        "well-supported"
    } else if percentage >= 50 {
        "moderately supported"
    } else if percentage >= 25 {
        "weakly supported"
    } else {
        "very little support"
    }
}

/// Confidence word for an atomic fact supported by `fraction` of all runs
pub fn support_word(fraction: f64) -> &'static str {
    if fraction > 0.99 {
        "certainly"
    } else if fraction > 0.7 {
        "likely"
    } else if fraction > 0.5 {
        "maybe"
    } else if fraction > 0.3 {
        "has a chance"
    } else {
        "unlikely"
    }
}

/// Per-model tally for an atomic fact, e.g. `( GPT: 2/3 Claude: 1/3 )`
///
/// `sources` lists the model of every run that stated the fact.
pub fn model_counts<I>(sources: I, num_trials: u32) -> String
where
    I: IntoIterator<Item = ModelId>,
{
    let mut counts: BTreeMap<ModelId, u32> = BTreeMap::new();
    for model in sources {
        *counts.entry(model).or_default() += 1;
    }
    let parts: Vec<String> = counts
        .iter()
        .map(|(model, n)| format!("{}: {}/{}", model.display_name(), n, num_trials))
        .collect();
    format!("( {} )", parts.join(" "))
}
