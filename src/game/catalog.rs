//! Game catalog
//!
//! Metadata for every planned game, and the builders that turn an
//! implemented game into a [`GameConfig`] and its rules.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GameConfig, GameRules, HostJudged, KeywordAnswer, QuizQuestion, QuizRules};
use crate::config::RoundConfig;
use crate::{Error, Result};

/// Broad category of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameCategory {
    Social,
    Recognition,
    Decision,
    Action,
    Counting,
    Creative,
    Corporate,
    SelfImprovement,
    Entertainment,
    Education,
    Family,
    Other,
}

impl std::fmt::Display for GameCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Social => "social",
            Self::Recognition => "recognition",
            Self::Decision => "decision",
            Self::Action => "action",
            Self::Counting => "counting",
            Self::Creative => "creative",
            Self::Corporate => "corporate",
            Self::SelfImprovement => "self-improvement",
            Self::Entertainment => "entertainment",
            Self::Education => "education",
            Self::Family => "family",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for GameCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
            .map_err(|_| Error::Config(format!("unknown game category: {s}")))
    }
}

/// Listing information for one game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: GameCategory,
    /// 1 (easy) to 5 (hard)
    pub difficulty: u8,
    pub requires_voice: bool,
    pub requires_audio: bool,
    pub estimated_duration_secs: u32,
}

type Builder = fn(&RoundConfig) -> (GameConfig, Box<dyn GameRules>);

struct Entry {
    metadata: GameMetadata,
    build: Option<Builder>,
}

/// Registry of planned and implemented games
pub struct Catalog {
    entries: Vec<Entry>,
}

impl Catalog {
    /// Catalog of the games shipped with the hub
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self {
            entries: Vec::new(),
        };

        catalog.register(
            meta(
                "advise-the-child",
                "Advise The Child",
                "Give helpful advice to a child facing a difficult situation",
                GameCategory::Social,
                3,
                12,
            ),
            advise_the_child,
        );
        catalog.register(
            meta(
                "puh-lease-officer",
                "Puh Lease Officer",
                "Convince the police officer to leave after a noise complaint, or face the handcuffs",
                GameCategory::Social,
                4,
                30,
            ),
            puh_lease_officer,
        );
        catalog.register(
            meta(
                "save-their-soul",
                "Save Their Soul",
                "Convert a forlorn stranger at a 3 a.m. bus stop to your highly questionable religion",
                GameCategory::Social,
                3,
                30,
            ),
            save_their_soul,
        );
        catalog.register(
            meta(
                "name-that-capital",
                "Name That Capital",
                "Test your geography knowledge in a world where borders are meaningless",
                GameCategory::Education,
                3,
                30,
            ),
            name_that_capital,
        );
        catalog.register(
            meta(
                "game-show-trivia",
                "Game Show Trivia",
                "Five multiple-choice questions from an overly excited game show host",
                GameCategory::Entertainment,
                2,
                60,
            ),
            game_show_trivia,
        );
        catalog.plan(meta(
            "identify-the-criminal",
            "Identify the Criminal",
            "Use your detective skills to identify the suspect from witness descriptions",
            GameCategory::Recognition,
            4,
            30,
        ));

        catalog
    }

    /// Add an implemented game
    pub fn register(&mut self, metadata: GameMetadata, build: Builder) {
        self.entries.push(Entry {
            metadata,
            build: Some(build),
        });
    }

    /// Add a game that is listed but not yet playable
    pub fn plan(&mut self, metadata: GameMetadata) {
        self.entries.push(Entry {
            metadata,
            build: None,
        });
    }

    /// Every listed game
    pub fn all(&self) -> impl Iterator<Item = &GameMetadata> {
        self.entries.iter().map(|e| &e.metadata)
    }

    /// Playable games
    pub fn implemented(&self) -> impl Iterator<Item = &GameMetadata> {
        self.entries
            .iter()
            .filter(|e| e.build.is_some())
            .map(|e| &e.metadata)
    }

    /// Look up a game by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&GameMetadata> {
        self.entry(id).map(|e| &e.metadata)
    }

    /// Games in a category
    pub fn by_category(&self, category: GameCategory) -> impl Iterator<Item = &GameMetadata> {
        self.all().filter(move |m| m.category == category)
    }

    /// Whether `id` can be played
    #[must_use]
    pub fn is_implemented(&self, id: &str) -> bool {
        self.entry(id).is_some_and(|e| e.build.is_some())
    }

    /// Build the config and rules for a playable game
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownGame` if `id` is not listed or not implemented
    pub fn build(&self, id: &str, defaults: &RoundConfig) -> Result<(GameConfig, Box<dyn GameRules>)> {
        let build = self
            .entry(id)
            .and_then(|e| e.build)
            .ok_or_else(|| Error::UnknownGame(id.to_string()))?;

        let (mut config, rules) = build(defaults);
        config.scenario_delay = defaults.scenario_delay;
        config.end_timing = defaults.end_timing;
        Ok((config, rules))
    }

    fn entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.metadata.id == id)
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("games", &self.entries.len())
            .finish_non_exhaustive()
    }
}

fn meta(
    id: &str,
    name: &str,
    description: &str,
    category: GameCategory,
    difficulty: u8,
    estimated_duration_secs: u32,
) -> GameMetadata {
    GameMetadata {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category,
        difficulty,
        requires_voice: true,
        requires_audio: true,
        estimated_duration_secs,
    }
}

fn advise_the_child(defaults: &RoundConfig) -> (GameConfig, Box<dyn GameRules>) {
    let config = GameConfig::new(
        "advise-the-child",
        "Advise The Child",
        "An AI game host will present a child's problem - give your best advice!",
    )
    .with_duration(defaults.duration_secs.max(20))
    .with_host_delay(defaults.host_speaking_delay);

    (
        config,
        Box::new(HostJudged::new(
            "Listen to the child's problem and respond with your advice!",
        )),
    )
}

fn puh_lease_officer(defaults: &RoundConfig) -> (GameConfig, Box<dyn GameRules>) {
    let config = GameConfig::new(
        "puh-lease-officer",
        "Puh-leeeeeeeease Officer",
        "A police officer will arrive at your door - convince them to leave or face the handcuffs!",
    )
    .with_duration(30)
    .with_host_delay(defaults.host_speaking_delay);

    (
        config,
        Box::new(HostJudged::new("The officer is at the door. Talk your way out of it!")),
    )
}

fn save_their_soul(defaults: &RoundConfig) -> (GameConfig, Box<dyn GameRules>) {
    let config = GameConfig::new(
        "save-their-soul",
        "Save Their Soul",
        "A lost soul waits at the bus stop - pitch them your religion!",
    )
    .with_duration(30)
    .with_host_delay(defaults.host_speaking_delay.max(Duration::from_secs(12)));

    (
        config,
        Box::new(HostJudged::new("The stranger looks up from their phone. Make your pitch!")),
    )
}

fn name_that_capital(defaults: &RoundConfig) -> (GameConfig, Box<dyn GameRules>) {
    let config = GameConfig::new(
        "name-that-capital",
        "Name That Capital",
        "The host will name a country - say its capital!",
    )
    .with_duration(defaults.duration_secs)
    .with_host_delay(defaults.host_speaking_delay)
    .with_hint(Duration::from_secs(5), "It is usually where the government sits");

    (config, Box::new(KeywordAnswer::from_scenario_field("capital")))
}

fn game_show_trivia(defaults: &RoundConfig) -> (GameConfig, Box<dyn GameRules>) {
    let config = GameConfig::new(
        "game-show-trivia",
        "Game Show Trivia",
        "Answer five questions with A, B, C or D!",
    )
    .with_duration(60)
    .with_host_delay(defaults.host_speaking_delay);

    let questions = vec![
        QuizQuestion::new(
            "What's the capital of France?",
            ["A) London", "B) Berlin", "C) Paris", "D) Madrid"],
            'C',
            100,
        ),
        QuizQuestion::new(
            "Which planet is known as the Red Planet?",
            ["A) Venus", "B) Mars", "C) Jupiter", "D) Saturn"],
            'B',
            200,
        ),
        QuizQuestion::new("What's 15 x 7?", ["A) 95", "B) 105", "C) 115", "D) 125"], 'B', 150),
        QuizQuestion::new(
            "Who painted the Mona Lisa?",
            ["A) Van Gogh", "B) Picasso", "C) Da Vinci", "D) Monet"],
            'C',
            250,
        ),
        QuizQuestion::new(
            "What's the largest ocean on Earth?",
            ["A) Atlantic", "B) Indian", "C) Arctic", "D) Pacific"],
            'D',
            300,
        ),
    ];

    (config, Box::new(QuizRules::new(questions)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lists_planned_and_implemented_games() {
        let catalog = Catalog::builtin();

        assert!(catalog.get("identify-the-criminal").is_some());
        assert!(!catalog.is_implemented("identify-the-criminal"));
        assert!(catalog.is_implemented("advise-the-child"));
        assert!(catalog.implemented().count() < catalog.all().count());
        assert!(catalog.all().all(|m| (1..=5).contains(&m.difficulty)));
    }

    #[test]
    fn filters_by_category() {
        let catalog = Catalog::builtin();
        let social: Vec<_> = catalog.by_category(GameCategory::Social).collect();

        assert_eq!(social.len(), 3);
        assert!(social.iter().all(|m| m.category == GameCategory::Social));
    }

    #[test]
    fn build_applies_round_defaults() {
        let catalog = Catalog::builtin();
        let defaults = RoundConfig {
            scenario_delay: Duration::from_millis(250),
            ..RoundConfig::default()
        };

        let (config, _rules) = catalog.build("name-that-capital", &defaults).unwrap();
        assert_eq!(config.scenario_delay, Duration::from_millis(250));
        assert!(config.hint.is_some());

        let (config, _rules) = catalog.build("save-their-soul", &defaults).unwrap();
        assert_eq!(config.host_speaking_delay, Duration::from_secs(12));
    }

    #[test]
    fn build_rejects_unplayable_games() {
        let catalog = Catalog::builtin();
        let defaults = RoundConfig::default();

        assert!(matches!(
            catalog.build("identify-the-criminal", &defaults),
            Err(Error::UnknownGame(_))
        ));
        assert!(matches!(
            catalog.build("nope", &defaults),
            Err(Error::UnknownGame(_))
        ));
    }

    #[test]
    fn category_parses_kebab_case() {
        assert_eq!(
            "self-improvement".parse::<GameCategory>().unwrap(),
            GameCategory::SelfImprovement
        );
        assert_eq!(GameCategory::SelfImprovement.to_string(), "self-improvement");
        assert!("sports".parse::<GameCategory>().is_err());
    }
}
