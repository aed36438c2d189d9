//! Content safety gate: spam and gibberish heuristics over raw entry text

use crate::anonymize::{EMAIL_PATTERN, URL_PATTERN};

/// Minimum length of a single-character run that counts as spam
const MIN_CHAR_RUN: usize = 7;

/// Consecutive repetitions of a short pattern that count as spam
const MIN_PATTERN_REPEATS: usize = 5;

/// Vowel/letter ratio outside this range looks like gibberish
const MIN_VOWEL_RATIO: f64 = 0.15;
const MAX_VOWEL_RATIO: f64 = 0.65;

/// Letters needed before the vowel ratio is meaningful
const MIN_LETTERS_FOR_VOWEL_CHECK: usize = 20;

const MAX_SPECIAL_CHAR_RATIO: f64 = 0.30;
const MAX_URLS: usize = 2;
const MAX_EMAILS: usize = 1;
const MAX_SCORE: u8 = 100;

const KEYBOARD_ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];

const SPAM_PHRASES: [&str; 10] = [
    "buy now",
    "click here",
    "free money",
    "limited time offer",
    "act now",
    "work from home",
    "make money fast",
    "100% free",
    "crypto giveaway",
    "dm me for",
];

/// Independent heuristics evaluated by [`analyze_content`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetySignal {
    RepeatedCharacter,
    RepeatedPattern,
    VowelRatio,
    SpecialCharacters,
    KeyboardMash,
    SpamPhrase,
    ExcessiveUrls,
    ExcessiveEmails,
}

impl SafetySignal {
    /// Contribution to the severity score
    pub fn weight(&self) -> u8 {
        match self {
            SafetySignal::RepeatedCharacter => 20,
            SafetySignal::RepeatedPattern => 20,
            SafetySignal::VowelRatio => 15,
            SafetySignal::SpecialCharacters => 15,
            SafetySignal::KeyboardMash => 25,
            SafetySignal::ExcessiveUrls => 20,
            // Flag-only signals
            SafetySignal::SpamPhrase | SafetySignal::ExcessiveEmails => 0,
        }
    }
}

/// Result of content analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyReport {
    /// True when any single signal fired
    pub is_spam: bool,
    /// Sum of signal weights, capped at 100
    pub score: u8,
    pub signals: Vec<SafetySignal>,
}

impl SafetyReport {
    /// Reject when flagged or when the score is above the caller's ceiling
    pub fn should_reject(&self, score_ceiling: u8) -> bool {
        self.is_spam || self.score > score_ceiling
    }

    pub fn describe(&self) -> String {
        let names: Vec<String> = self.signals.iter().map(|s| format!("{:?}", s)).collect();
        format!(
            "Content looks like spam (score {}, signals: {})",
            self.score,
            names.join(", ")
        )
    }
}

/// Classify and score `text`
///
/// Pure function: no state, no I/O. Every signal is evaluated on the raw text.
pub fn analyze_content(text: &str) -> SafetyReport {
    let chars: Vec<char> = text.chars().collect();
    let lowered = text.to_lowercase();

    let checks = [
        (SafetySignal::RepeatedCharacter, has_char_run(&chars)),
        (SafetySignal::RepeatedPattern, has_repeated_pattern(&chars)),
        (SafetySignal::VowelRatio, vowel_ratio_out_of_range(&chars)),
        (SafetySignal::SpecialCharacters, special_ratio_too_high(&chars)),
        (SafetySignal::KeyboardMash, has_keyboard_mash(&lowered)),
        (
            SafetySignal::SpamPhrase,
            SPAM_PHRASES.iter().any(|phrase| lowered.contains(phrase)),
        ),
        (
            SafetySignal::ExcessiveUrls,
            URL_PATTERN.find_iter(text).count() > MAX_URLS,
        ),
        (
            SafetySignal::ExcessiveEmails,
            EMAIL_PATTERN.find_iter(text).count() > MAX_EMAILS,
        ),
    ];

    let signals: Vec<SafetySignal> = checks
        .into_iter()
        .filter_map(|(signal, fired)| fired.then_some(signal))
        .collect();

    let score = signals
        .iter()
        .map(|s| u32::from(s.weight()))
        .sum::<u32>()
        .min(u32::from(MAX_SCORE)) as u8;

    SafetyReport {
        is_spam: !signals.is_empty(),
        score,
        signals,
    }
}

/// A run of one repeated non-whitespace character
fn has_char_run(chars: &[char]) -> bool {
    let mut run = 0;
    let mut previous = None;
    for &c in chars {
        if Some(c) == previous && !c.is_whitespace() {
            run += 1;
        } else {
            run = 1;
        }
        previous = Some(c);
        if run >= MIN_CHAR_RUN && !c.is_whitespace() {
            return true;
        }
    }
    false
}

/// A 2-5 character unit repeated back to back at least 5 times
fn has_repeated_pattern(chars: &[char]) -> bool {
    for unit in 2..=5 {
        let needed = unit * MIN_PATTERN_REPEATS;
        if chars.len() < needed {
            continue;
        }
        for start in 0..=(chars.len() - needed) {
            let pattern = &chars[start..start + unit];
            if pattern.iter().all(|c| c.is_whitespace()) {
                continue;
            }
            let repeats = (1..MIN_PATTERN_REPEATS)
                .take_while(|k| &chars[start + k * unit..start + (k + 1) * unit] == pattern)
                .count()
                + 1;
            if repeats >= MIN_PATTERN_REPEATS {
                return true;
            }
        }
    }
    false
}

fn vowel_ratio_out_of_range(chars: &[char]) -> bool {
    let letters: Vec<char> = chars
        .iter()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if letters.len() <= MIN_LETTERS_FOR_VOWEL_CHECK {
        return false;
    }

    let vowels = letters.iter().filter(|c| "aeiou".contains(**c)).count();
    let ratio = vowels as f64 / letters.len() as f64;
    !(MIN_VOWEL_RATIO..=MAX_VOWEL_RATIO).contains(&ratio)
}

/// Punctuation and symbols (not whitespace) as a share of all characters
fn special_ratio_too_high(chars: &[char]) -> bool {
    if chars.is_empty() {
        return false;
    }
    let special = chars
        .iter()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    special as f64 / chars.len() as f64 > MAX_SPECIAL_CHAR_RATIO
}

/// Any 5-character window of a word that runs along a keyboard row, either way
fn has_keyboard_mash(lowered: &str) -> bool {
    let reversed_rows: Vec<String> = KEYBOARD_ROWS
        .iter()
        .map(|row| row.chars().rev().collect())
        .collect();

    lowered.split_whitespace().any(|word| {
        let chars: Vec<char> = word.chars().collect();
        chars.windows(5).any(|window| {
            let window: String = window.iter().collect();
            KEYBOARD_ROWS.iter().any(|row| row.contains(&window))
                || reversed_rows.iter().any(|row| row.contains(&window))
        })
    })
}
