//! In-process composition policy evaluation.
//!
//! Character classes follow the usual LUDS split: lowercase, uppercase,
//! digit, and symbol, where a symbol is anything that is none of the other
//! three. A word is a maximal run of letters.

use crate::config::types::{FilterError, Result};
use crate::oracle::DecisionOracle;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Extra structural requirement beyond class minimums
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpecialRule {
    /// No two identical adjacent characters
    NoRepeat,
    /// No adjacent characters with consecutive code points
    NoConsecutive,
    /// Not a six-digit ddmmyy, mmddyy or yymmdd date
    NoDate,
    /// Letters-only lowercase form must not appear in the word list
    Dictionary(PathBuf),
}

impl std::str::FromStr for SpecialRule {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "norep" => Ok(SpecialRule::NoRepeat),
            "noconsec" => Ok(SpecialRule::NoConsecutive),
            "nodate" => Ok(SpecialRule::NoDate),
            other => match other.strip_prefix("dict:") {
                Some(path) if !path.is_empty() => Ok(SpecialRule::Dictionary(PathBuf::from(path))),
                _ => Err(FilterError::Config(format!(
                    "unknown special requirement '{}' (expected norep, noconsec, nodate or dict:<file>)",
                    other
                ))),
            },
        }
    }
}

/// Minimum counts a password must reach; zero disables a check
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompositionPolicy {
    pub length: usize,
    pub lowers: usize,
    pub uppers: usize,
    pub digits: usize,
    pub symbols: usize,
    pub letters: usize,
    pub classes: usize,
    pub words: usize,
    pub special: Vec<SpecialRule>,
}

fn is_symbol(c: char) -> bool {
    !c.is_lowercase() && !c.is_uppercase() && !c.is_numeric()
}

pub fn count_lowers(val: &str) -> usize {
    val.chars().filter(|c| c.is_lowercase()).count()
}

pub fn count_uppers(val: &str) -> usize {
    val.chars().filter(|c| c.is_uppercase()).count()
}

pub fn count_letters(val: &str) -> usize {
    val.chars().filter(|c| c.is_alphabetic()).count()
}

pub fn count_digits(val: &str) -> usize {
    val.chars().filter(|c| c.is_numeric()).count()
}

pub fn count_symbols(val: &str) -> usize {
    val.chars().filter(|c| is_symbol(*c)).count()
}

pub fn count_words(val: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;
    for c in val.chars() {
        let letter = c.is_alphabetic();
        if letter && !in_word {
            count += 1;
        }
        in_word = letter;
    }
    count
}

pub fn count_classes(val: &str) -> usize {
    [
        count_lowers(val),
        count_uppers(val),
        count_digits(val),
        count_symbols(val),
    ]
    .iter()
    .filter(|n| **n > 0)
    .count()
}

pub fn contains_repeat(val: &str) -> bool {
    let chars: Vec<char> = val.chars().collect();
    chars.windows(2).any(|w| w[0] == w[1])
}

pub fn contains_consecutive(val: &str) -> bool {
    let chars: Vec<char> = val.chars().collect();
    chars
        .windows(2)
        .any(|w| (w[0] as i64 - w[1] as i64).abs() == 1)
}

fn two_digit(val: &str, at: usize) -> u32 {
    val[at..at + 2].parse().unwrap_or(0)
}

/// Six ASCII digits reading as ddmmyy, mmddyy or yymmdd.
pub fn is_date(val: &str) -> bool {
    if val.len() != 6 || !val.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let day = |at| (1..=31).contains(&two_digit(val, at));
    let month = |at| (1..=12).contains(&two_digit(val, at));
    (day(0) && month(2)) || (month(0) && day(2)) || (month(2) && day(4))
}

/// Lowercase, then keep lowercase letters only.
pub fn dictionary_form(val: &str) -> String {
    val.to_lowercase().chars().filter(|c| c.is_lowercase()).collect()
}

fn load_word_list(path: &Path) -> Result<HashSet<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        FilterError::Config(format!("Failed to read dictionary '{}': {}", path.display(), e))
    })?;
    Ok(text.lines().map(|l| l.trim().to_string()).collect())
}

/// [`DecisionOracle`] backed by a [`CompositionPolicy`].
#[derive(Debug)]
pub struct LocalComplianceOracle {
    policy: CompositionPolicy,
    dictionaries: Vec<HashSet<String>>,
}

impl LocalComplianceOracle {
    /// Build the oracle, loading every dictionary the policy names.
    pub fn new(policy: CompositionPolicy) -> Result<Self> {
        let dictionaries = policy
            .special
            .iter()
            .filter_map(|rule| match rule {
                SpecialRule::Dictionary(path) => Some(load_word_list(path)),
                _ => None,
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            policy,
            dictionaries,
        })
    }

    pub fn policy(&self) -> &CompositionPolicy {
        &self.policy
    }

    /// Whether `val` meets every minimum and special rule.
    pub fn complies(&self, val: &str) -> bool {
        let p = &self.policy;
        let minimums = val.chars().count() >= p.length
            && count_lowers(val) >= p.lowers
            && count_uppers(val) >= p.uppers
            && count_digits(val) >= p.digits
            && count_symbols(val) >= p.symbols
            && count_classes(val) >= p.classes
            && count_letters(val) >= p.letters
            && count_words(val) >= p.words;
        if !minimums {
            return false;
        }

        let mut dictionaries = self.dictionaries.iter();
        p.special.iter().all(|rule| match rule {
            SpecialRule::NoRepeat => !contains_repeat(val),
            SpecialRule::NoConsecutive => !contains_consecutive(val),
            SpecialRule::NoDate => !is_date(val),
            SpecialRule::Dictionary(_) => dictionaries
                .next()
                .map_or(true, |words| !words.contains(&dictionary_form(val))),
        })
    }
}

impl DecisionOracle for LocalComplianceOracle {
    fn decide(&mut self, password: &str) -> Result<bool> {
        Ok(self.complies(password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn oracle(policy: CompositionPolicy) -> LocalComplianceOracle {
        LocalComplianceOracle::new(policy).expect("build oracle")
    }

    #[test]
    fn class_counts() {
        assert_eq!(count_lowers("aB3$c"), 2);
        assert_eq!(count_uppers("aB3$c"), 1);
        assert_eq!(count_digits("aB3$c"), 1);
        assert_eq!(count_symbols("aB3$c"), 1);
        assert_eq!(count_letters("aB3$c"), 3);
        assert_eq!(count_classes("aB3$c"), 4);
        assert_eq!(count_classes("abc"), 1);
        assert_eq!(count_words("correct-horse battery9staple"), 4);
        assert_eq!(count_words("1234"), 0);
    }

    #[test]
    fn length_policy_matches_reference_example() {
        let mut o = oracle(CompositionPolicy {
            length: 5,
            ..Default::default()
        });
        assert!(o.decide("aaaaaa").unwrap());
        assert!(!o.decide("Xy9!").unwrap());
        assert!(!o.decide("bbbb").unwrap());
    }

    #[test]
    fn class_minimums_all_apply() {
        let o = oracle(CompositionPolicy {
            length: 8,
            classes: 3,
            digits: 1,
            ..Default::default()
        });
        assert!(o.complies("Passw0rd"));
        assert!(!o.complies("password"));
        assert!(!o.complies("Pass0rd"));
    }

    #[test]
    fn repeat_and_consecutive_rules() {
        assert!(contains_repeat("hello"));
        assert!(!contains_repeat("helo"));
        assert!(contains_consecutive("xab"));
        assert!(contains_consecutive("ba"));
        assert!(!contains_consecutive("ace"));

        let o = oracle(CompositionPolicy {
            special: vec![SpecialRule::NoRepeat, SpecialRule::NoConsecutive],
            ..Default::default()
        });
        assert!(o.complies("ace"));
        assert!(!o.complies("aab"));
        assert!(!o.complies("abz"));
    }

    #[test]
    fn date_detection() {
        assert!(is_date("311299"));
        assert!(is_date("123199"));
        assert!(is_date("991231"));
        // yyddmm is not one of the layouts
        assert!(!is_date("993112"));
        assert!(!is_date("992513"));
        assert!(!is_date("999999"));
        assert!(!is_date("12a456"));
        assert!(!is_date("1231999"));
    }

    #[test]
    fn dictionary_rule_uses_letter_form() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "password").unwrap();
        writeln!(file, "dragon").unwrap();
        file.flush().unwrap();

        let o = oracle(CompositionPolicy {
            special: vec![SpecialRule::Dictionary(file.path().to_path_buf())],
            ..Default::default()
        });
        assert!(!o.complies("Password1!"));
        assert!(!o.complies("Dragon!!"));
        assert!(o.complies("W1zard"));
    }

    #[test]
    fn missing_dictionary_is_config_error() {
        let policy = CompositionPolicy {
            special: vec![SpecialRule::Dictionary("/nonexistent/words.txt".into())],
            ..Default::default()
        };
        assert!(matches!(
            LocalComplianceOracle::new(policy),
            Err(FilterError::Config(_))
        ));
    }

    #[test]
    fn special_rules_parse() {
        assert_eq!("norep".parse::<SpecialRule>().unwrap(), SpecialRule::NoRepeat);
        assert_eq!("noconsec".parse::<SpecialRule>().unwrap(), SpecialRule::NoConsecutive);
        assert_eq!("nodate".parse::<SpecialRule>().unwrap(), SpecialRule::NoDate);
        assert_eq!(
            "dict:words.txt".parse::<SpecialRule>().unwrap(),
            SpecialRule::Dictionary(PathBuf::from("words.txt"))
        );
        assert!("dict:".parse::<SpecialRule>().is_err());
        assert!("nofun".parse::<SpecialRule>().is_err());
    }
}
