//! Block-set / caution-set label policy.
//!
//! The label strings are configuration data. The policy only answers
//! "does the label set intersect the block-set" and, failing that,
//! "does it intersect the caution-set".

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::lifecycle::{LifecycleState, SafetyVerdict};

/// Labels that hard-block a video unless configured otherwise.
const DEFAULT_BLOCK_LABELS: &[&str] = &[
    "Explicit Nudity",
    "Nudity",
    "Graphic Male Nudity",
    "Graphic Female Nudity",
    "Sexual Activity",
    "Illustrated Explicit Nudity",
    "Adult Toys",
    "Violence",
    "Graphic Violence",
    "Physical Violence",
    "Weapon Violence",
    "Weapons",
    "Self Injury",
    "Emaciated Bodies",
    "Corpses",
    "Hanging",
    "Air Crash",
    "Explosions And Blasts",
    "Visually Disturbing",
    "Gambling",
    "Hate Symbols",
    "Rude Gestures",
    "Middle Finger",
];

/// Labels that attach a non-blocking advisory unless configured otherwise.
const DEFAULT_CAUTION_LABELS: &[&str] = &[
    "Suggestive",
    "Female Swimwear Or Underwear",
    "Male Swimwear Or Underwear",
    "Revealing Clothes",
    "Partial Nudity",
];

/// Configured label partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LabelPolicy {
    #[serde(default)]
    block: BTreeSet<String>,
    #[serde(default)]
    caution: BTreeSet<String>,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_BLOCK_LABELS.iter().copied(),
            DEFAULT_CAUTION_LABELS.iter().copied(),
        )
    }
}

impl LabelPolicy {
    pub fn new<B, C>(block: B, caution: C) -> Self
    where
        B: IntoIterator,
        B::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            block: block.into_iter().map(Into::into).collect(),
            caution: caution.into_iter().map(Into::into).collect(),
        }
    }

    pub fn block_labels(&self) -> &BTreeSet<String> {
        &self.block
    }

    pub fn caution_labels(&self) -> &BTreeSet<String> {
        &self.caution
    }

    /// Assess a classifier label set. Block-set membership always wins.
    pub fn assess<I, S>(&self, labels: I) -> Assessment
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut blocked = BTreeSet::new();
        let mut cautioned = BTreeSet::new();

        for label in labels {
            let label = label.as_ref();
            if self.block.contains(label) {
                blocked.insert(label.to_string());
            } else if self.caution.contains(label) {
                cautioned.insert(label.to_string());
            }
        }

        if !blocked.is_empty() {
            Assessment::Flagged {
                labels: blocked.into_iter().collect(),
            }
        } else if !cautioned.is_empty() {
            Assessment::Advisory {
                labels: cautioned.into_iter().collect(),
            }
        } else {
            Assessment::Safe
        }
    }
}

/// Result of applying the label policy to one classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assessment {
    /// No restricted labels
    Safe,
    /// Only caution-set labels: streamable, surfaced to the owner
    Advisory { labels: Vec<String> },
    /// At least one block-set label
    Flagged { labels: Vec<String> },
}

impl Assessment {
    pub fn verdict(&self) -> SafetyVerdict {
        match self {
            Assessment::Safe | Assessment::Advisory { .. } => SafetyVerdict::Safe,
            Assessment::Flagged { .. } => SafetyVerdict::Flagged,
        }
    }

    pub fn target_state(&self) -> LifecycleState {
        match self {
            Assessment::Safe | Assessment::Advisory { .. } => LifecycleState::Ready,
            Assessment::Flagged { .. } => LifecycleState::Blocked,
        }
    }

    pub fn is_advisory(&self) -> bool {
        matches!(self, Assessment::Advisory { .. })
    }

    /// Restricted labels that drove the assessment (empty when safe).
    pub fn matched_labels(&self) -> &[String] {
        match self {
            Assessment::Safe => &[],
            Assessment::Advisory { labels } | Assessment::Flagged { labels } => labels,
        }
    }
}
