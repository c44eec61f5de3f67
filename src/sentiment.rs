//! Keyword sentiment classifier and the mood -> ambient track table.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Joyful,
    Melancholy,
    Tense,
    Mysterious,
    Calm,
    Epic,
    Neutral,
}

impl Category {
    /// Scored categories in tie-break order. Neutral is the fallback.
    pub const SCORED: [Category; 6] = [
        Category::Joyful,
        Category::Melancholy,
        Category::Tense,
        Category::Mysterious,
        Category::Calm,
        Category::Epic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Joyful => "joyful",
            Category::Melancholy => "melancholy",
            Category::Tense => "tense",
            Category::Mysterious => "mysterious",
            Category::Calm => "calm",
            Category::Epic => "epic",
            Category::Neutral => "neutral",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Category::Joyful => &[
                "happy", "joy", "joyful", "laugh", "laughed", "laughter", "smile", "smiled",
                "delight", "cheer", "celebrate", "party", "sunny", "bright", "play", "played",
            ],
            Category::Melancholy => &[
                "sad", "sorrow", "tears", "tear", "cry", "cried", "lonely", "alone", "grief",
                "loss", "lost", "gloom", "mourn", "farewell", "goodbye", "rain",
            ],
            Category::Tense => &[
                "fear", "afraid", "danger", "dangerous", "run", "ran", "chase", "chased",
                "scream", "threat", "attack", "trap", "panic", "hurry", "storm", "dark",
            ],
            Category::Mysterious => &[
                "mystery", "mysterious", "secret", "strange", "shadow", "shadows", "whisper",
                "whispered", "hidden", "unknown", "fog", "mist", "ancient", "riddle", "magic",
            ],
            Category::Calm => &[
                "calm", "quiet", "peace", "peaceful", "gentle", "soft", "still", "rest",
                "sleep", "slept", "breeze", "meadow", "warm", "dream", "lullaby",
            ],
            Category::Epic => &[
                "battle", "hero", "heroes", "kingdom", "army", "sword", "dragon", "victory",
                "quest", "legend", "glory", "mighty", "conquer", "triumph", "war",
            ],
            Category::Neutral => &[],
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[a-z']+").expect("word pattern is valid");
    static ref KEYWORDS: HashMap<&'static str, Category> = Category::SCORED
        .iter()
        .flat_map(|&category| category.keywords().iter().map(move |&word| (word, category)))
        .collect();
}

/// Classifies `text` by counting category keywords. Ties go to the category
/// listed first in [Category::SCORED], no hits at all yields Neutral.
pub fn classify(text: &str) -> Category {
    let lowercase = text.to_lowercase();
    let mut scores: BTreeMap<Category, usize> = BTreeMap::new();

    for word in WORD.find_iter(&lowercase) {
        let word = word.as_str().trim_matches('\'');
        if let Some(&category) = KEYWORDS.get(word) {
            *scores.entry(category).or_default() += 1;
        }
    }

    Category::SCORED
        .iter()
        .copied()
        .map(|category| (category, scores.get(&category).copied().unwrap_or(0)))
        .fold((Category::Neutral, 0), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
        .0
}

/// Mood -> ambient track locator lookup with a guaranteed default.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TrackTable {
    /// Played for any category without its own entry
    #[serde(default = "default_track")]
    pub default: String,

    /// Per-category locators, keyed by lowercase category name
    #[serde(default)]
    pub moods: BTreeMap<String, String>,
}

fn default_track() -> String {
    "assets/ambient/neutral.mp3".to_string()
}

impl Default for TrackTable {
    fn default() -> Self {
        let moods = Category::SCORED
            .iter()
            .map(|category| {
                (
                    category.as_str().to_string(),
                    format!("assets/ambient/{category}.mp3"),
                )
            })
            .collect();

        Self {
            default: default_track(),
            moods,
        }
    }
}

impl TrackTable {
    pub fn track_for(&self, category: Category) -> &str {
        self.moods
            .get(category.as_str())
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    /// Classifies `text` and returns the matching track.
    pub fn track_for_text(&self, text: &str) -> (Category, &str) {
        let category = classify(text);
        (category, self.track_for(category))
    }
}
