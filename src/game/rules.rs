//! Built-in finish predicates

use super::{GameRules, JudgeContext, Judgement, Verdict};
use crate::capability::Scenario;

/// Leaves judging to the host
///
/// The round ends when the host's finish notification arrives, or when the
/// timer runs out.
#[derive(Debug, Clone)]
pub struct HostJudged {
    listening_message: String,
}

impl HostJudged {
    /// Show `listening_message` once the host starts presenting the scenario
    #[must_use]
    pub fn new(listening_message: impl Into<String>) -> Self {
        Self {
            listening_message: listening_message.into(),
        }
    }
}

impl Default for HostJudged {
    fn default() -> Self {
        Self::new("The host is presenting your scenario. Listen carefully!")
    }
}

impl GameRules for HostJudged {
    fn on_scenario(&mut self, _scenario: &Scenario) -> Option<String> {
        Some(self.listening_message.clone())
    }

    fn judge(&mut self, _ctx: &JudgeContext<'_>) -> Judgement {
        Judgement::Undecided
    }
}

/// Wins when the utterance contains an accepted answer
#[derive(Debug, Clone)]
pub struct KeywordAnswer {
    answers: Vec<String>,
    scenario_field: Option<String>,
    full_score: u32,
    hinted_score: u32,
}

impl KeywordAnswer {
    /// Accept any of a fixed set of answers
    #[must_use]
    pub fn fixed<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            scenario_field: None,
            full_score: 100,
            hinted_score: 75,
        }
    }

    /// Take the accepted answers from a field of the host's scenario
    ///
    /// The field may hold a string or an array of strings.
    #[must_use]
    pub fn from_scenario_field(field: impl Into<String>) -> Self {
        Self {
            scenario_field: Some(field.into()),
            ..Self::fixed(Vec::<String>::new())
        }
    }

    /// Override the scores awarded without and with a hint
    #[must_use]
    pub const fn with_scores(mut self, full: u32, hinted: u32) -> Self {
        self.full_score = full;
        self.hinted_score = hinted;
        self
    }

    /// Currently accepted answers
    #[must_use]
    pub fn answers(&self) -> &[String] {
        &self.answers
    }
}

impl GameRules for KeywordAnswer {
    fn on_scenario(&mut self, scenario: &Scenario) -> Option<String> {
        if let Some(field) = &self.scenario_field {
            match scenario.extra.get(field) {
                Some(serde_json::Value::String(answer)) => self.answers = vec![answer.clone()],
                Some(serde_json::Value::Array(values)) => {
                    self.answers = values
                        .iter()
                        .filter_map(serde_json::Value::as_str)
                        .map(ToString::to_string)
                        .collect();
                }
                _ => tracing::warn!(field = %field, "scenario has no answer field"),
            }
        }

        (!scenario.prompt.is_empty()).then(|| scenario.prompt.clone())
    }

    fn judge(&mut self, ctx: &JudgeContext<'_>) -> Judgement {
        let Some(first) = self.answers.first() else {
            return Judgement::Undecided;
        };

        let Some(said) = ctx.utterance.map(str::trim).filter(|s| !s.is_empty()) else {
            return Judgement::Finish(Verdict::lose(0, format!("No answer heard. It was {first}")));
        };

        let said = said.to_lowercase();
        let matched = self
            .answers
            .iter()
            .find(|answer| said.contains(&answer.to_lowercase()));

        match matched {
            Some(answer) => {
                let score = if ctx.hint_shown {
                    self.hinted_score
                } else {
                    self.full_score
                };
                Judgement::Finish(Verdict::win(score, format!("{answer} is correct!")))
            }
            None => Judgement::Finish(Verdict::lose(0, format!("The answer was {first}"))),
        }
    }
}

/// One multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizQuestion {
    /// Question text
    pub question: String,
    /// Options, each prefixed with its letter: `"C) Paris"`
    pub options: Vec<String>,
    /// Letter of the right option
    pub correct: char,
    /// Points awarded for a right answer
    pub points: u32,
}

impl QuizQuestion {
    /// Create a question
    #[must_use]
    pub fn new<I, S>(question: impl Into<String>, options: I, correct: char, points: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            question: question.into(),
            options: options.into_iter().map(Into::into).collect(),
            correct: correct.to_ascii_uppercase(),
            points,
        }
    }

    fn prompt(&self, number: usize, total: usize) -> String {
        format!(
            "Question {number} of {total}: {} {}",
            self.question,
            self.options.join(" ")
        )
    }

    /// Option letter picked by an utterance
    ///
    /// Option text is matched first; otherwise the last standalone option
    /// letter in the utterance wins.
    fn choice(&self, said: &str) -> Option<char> {
        let lower = said.to_lowercase();
        let options = self.options.iter().filter_map(|opt| {
            let (letter, text) = opt.split_once(')')?;
            Some((letter.trim().chars().next()?.to_ascii_uppercase(), text.trim()))
        });

        let mut letters = Vec::new();
        for (letter, text) in options {
            if !text.is_empty() && lower.contains(&text.to_lowercase()) {
                return Some(letter);
            }
            letters.push(letter);
        }

        said.split(|c: char| !c.is_alphanumeric())
            .filter_map(|word| {
                let mut chars = word.chars();
                let c = chars.next()?.to_ascii_uppercase();
                chars.next().is_none().then_some(c)
            })
            .filter(|c| letters.contains(c))
            .next_back()
    }
}

/// Multi-question quiz
///
/// Score and question counter belong to this instance, so two quizzes never
/// share progress.
#[derive(Debug, Clone)]
pub struct QuizRules {
    questions: Vec<QuizQuestion>,
    asked: usize,
    correct_answers: usize,
    score: u32,
}

impl QuizRules {
    /// Create a quiz over `questions`, asked in order
    #[must_use]
    pub const fn new(questions: Vec<QuizQuestion>) -> Self {
        Self {
            questions,
            asked: 0,
            correct_answers: 0,
            score: 0,
        }
    }

    /// Points earned so far
    #[must_use]
    pub const fn score(&self) -> u32 {
        self.score
    }

    /// Questions asked so far
    #[must_use]
    pub const fn questions_asked(&self) -> usize {
        self.asked
    }

    fn current(&self) -> Option<&QuizQuestion> {
        self.asked.checked_sub(1).and_then(|i| self.questions.get(i))
    }

    fn ask_next(&mut self) -> Option<String> {
        let question = self.questions.get(self.asked)?;
        self.asked += 1;
        Some(question.prompt(self.asked, self.questions.len()))
    }
}

impl GameRules for QuizRules {
    fn on_scenario(&mut self, _scenario: &Scenario) -> Option<String> {
        self.asked = 0;
        self.correct_answers = 0;
        self.score = 0;
        self.ask_next()
    }

    fn judge(&mut self, ctx: &JudgeContext<'_>) -> Judgement {
        let Some(question) = self.current().cloned() else {
            return Judgement::Undecided;
        };

        let picked = ctx.utterance.and_then(|said| question.choice(said));
        let feedback = if picked == Some(question.correct) {
            self.score += question.points;
            self.correct_answers += 1;
            format!("Correct! +{} points.", question.points)
        } else {
            format!("The correct answer was {}.", question.correct)
        };

        if let Some(next) = self.ask_next() {
            return Judgement::Progress {
                score: self.score,
                message: format!("{feedback} {next}"),
            };
        }

        let success = self.correct_answers * 2 >= self.questions.len();
        Judgement::Finish(Verdict {
            success,
            score: Some(self.score),
            message: Some(format!(
                "{feedback} Final score: {} ({} of {} right)",
                self.score,
                self.correct_answers,
                self.questions.len()
            )),
        })
    }
}
