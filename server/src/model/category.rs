use std::str::FromStr;

use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Closed set of approved newsletter genres.
///
/// Declaration order is the digest order: sections of the weekly digest are
/// emitted in this order, and grouping containers keyed by `Category` (it
/// derives `Ord`) iterate in it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter, Serialize,
)]
pub enum Category {
    Technology,
    Business,
    Philosophy,
    Culture,
    Science,
    Health,
    Productivity,
    #[strum(serialize = "Writing & Creativity")]
    #[serde(rename = "Writing & Creativity")]
    WritingAndCreativity,
    #[strum(serialize = "Personal Growth")]
    #[serde(rename = "Personal Growth")]
    PersonalGrowth,
    Finance,
    Politics,
    Education,
    Lifestyle,
    #[strum(serialize = "Humor & Entertainment")]
    #[serde(rename = "Humor & Entertainment")]
    HumorAndEntertainment,
    Spirituality,
}

impl Category {
    /// Parse a label coming back from the gateway. Anything outside the
    /// approved set is rejected here, at the response boundary.
    pub fn parse(label: &str) -> Option<Category> {
        Category::from_str(label.trim()).ok()
    }

    /// The approved labels, in digest order, for prompt construction.
    pub fn approved_labels() -> Vec<String> {
        Category::iter().map(|c| c.to_string()).collect()
    }
}
