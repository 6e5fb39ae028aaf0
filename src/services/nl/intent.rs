//! NL intent parser (spec §4.N): deterministic, regex-based extraction of a
//! verb, targets, artifacts, and constraints from a natural-language
//! command. Ported line-for-line from `original_source/.../nl/intents.py`'s
//! pattern tables — no LLM call anywhere in this module, by spec §1
//! Non-goals.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Verbs in priority order: earlier entries win when a command matches more
/// than one pattern (`intents.py`'s `VERB_PATTERNS` is an ordered dict for
/// exactly this reason — "reply" before "message", "forward" before
/// "email").
static VERB_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("reply", Regex::new(r"(?i)\b(reply|respond)\b").unwrap()),
        ("forward", Regex::new(r"(?i)\b(forward|share)\b").unwrap()),
        ("schedule", Regex::new(r"(?i)\b(schedule|book|set up)\b").unwrap()),
        ("delete", Regex::new(r"(?i)\b(delete|remove)\b").unwrap()),
        ("update", Regex::new(r"(?i)\b(update|edit)\b").unwrap()),
        ("create", Regex::new(r"(?i)\b(create|make|new)\b").unwrap()),
        ("email", Regex::new(r"(?i)\b(email|e-mail)\b").unwrap()),
        ("message", Regex::new(r"(?i)\b(message|ping|send)\b").unwrap()),
        ("find", Regex::new(r"(?i)\b(find|search|look for)\b").unwrap()),
        ("list", Regex::new(r"(?i)\b(list|show)\b").unwrap()),
    ]
});

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").unwrap());
static CAPITALIZED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:to|from|message|email|ping)\s+([A-Z][a-z]+(?:\s[A-Z][a-z]+)?)\b").unwrap());
static TEAM_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z][a-zA-Z]+)\s+team\b").unwrap());
static CHANNEL_HASH_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([a-zA-Z0-9_-]+)").unwrap());
static CHANNEL_WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z][a-zA-Z]+)\s+channel\b").unwrap());
static FROM_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bfrom\s+([A-Z][a-z]+)\b").unwrap());
static POSSESSIVE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+)'s\b").unwrap());

static QUOTED_STRING: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)""#).unwrap());
static THE_PHRASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bthe\s+([a-z][a-z\s]{1,48}?)(?:\s+(?:to|for|from|in|with)\b|[.!?]|$)").unwrap());
static ABOUT_PHRASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\babout\s+([a-z][a-z\s]{1,48}?)(?:\s+(?:to|for|from|in|with)\b|[.!?]|$)").unwrap());

static SOURCE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("teams", Regex::new(r"(?i)\bteams\b").unwrap()),
        ("slack", Regex::new(r"(?i)\bslack\b").unwrap()),
        ("outlook", Regex::new(r"(?i)\boutlook\b").unwrap()),
        ("gmail", Regex::new(r"(?i)\bgmail\b").unwrap()),
    ]
});

static TIME_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("today", Regex::new(r"(?i)\btoday\b").unwrap()),
        ("yesterday", Regex::new(r"(?i)\byesterday\b").unwrap()),
        ("this_week", Regex::new(r"(?i)\bthis week\b").unwrap()),
        ("last_week", Regex::new(r"(?i)\blast week\b").unwrap()),
        ("this_month", Regex::new(r"(?i)\bthis month\b").unwrap()),
        ("last_month", Regex::new(r"(?i)\blast month\b").unwrap()),
    ]
});

static LABEL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)\b(?:label|tag)\s+"?([a-zA-Z]+)"?"#).unwrap());
static FOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bin\s+(?:the\s+)?([A-Z][a-zA-Z]*(?:\s[A-Z][a-zA-Z]*)?)\s+folder\b").unwrap());

/// Parsed structure of a natural-language command. `verb` is `"unknown"`
/// when no pattern matches, mirroring `intents.py`'s `Intent.verb` default
/// rather than an `Option`, since downstream code (`validate_intent`)
/// branches on the literal string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intent {
    pub verb: String,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub constraints: HashMap<String, String>,
    pub original_command: String,
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.iter().any(|existing| existing.eq_ignore_ascii_case(&value)) {
        list.push(value);
    }
}

fn extract_verb(command: &str) -> String {
    for (verb, pattern) in VERB_PATTERNS.iter() {
        if pattern.is_match(command) {
            return (*verb).to_string();
        }
    }
    "unknown".to_string()
}

/// Team/channel phrases are extracted here (not in `extract_artifacts`) so
/// the two extractors can be run independently without one re-deriving the
/// other's exclusion list.
fn extract_targets(command: &str) -> Vec<String> {
    let mut targets = Vec::new();

    for capture in EMAIL_PATTERN.find_iter(command) {
        push_unique(&mut targets, capture.as_str().to_string());
    }
    for capture in TEAM_PATTERN.captures_iter(command) {
        push_unique(&mut targets, format!("{} team", &capture[1]));
    }
    for capture in CHANNEL_HASH_PATTERN.captures_iter(command) {
        push_unique(&mut targets, capture[1].to_string());
    }
    for capture in CHANNEL_WORD_PATTERN.captures_iter(command) {
        push_unique(&mut targets, capture[1].to_string());
    }
    for capture in CAPITALIZED_NAME.captures_iter(command) {
        push_unique(&mut targets, capture[1].to_string());
    }
    for capture in FROM_PATTERN.captures_iter(command) {
        push_unique(&mut targets, capture[1].to_string());
    }
    for capture in POSSESSIVE_PATTERN.captures_iter(command) {
        push_unique(&mut targets, capture[1].to_string());
    }

    targets
}

/// Phrases that ended up naming a team/channel target are excluded here so
/// "Engineering" doesn't also surface as an artifact when "Engineering
/// team" was already captured as a target.
fn extract_artifacts(command: &str, targets: &[String]) -> Vec<String> {
    let mut artifacts = Vec::new();

    for capture in QUOTED_STRING.captures_iter(command) {
        let artifact = capture[1].trim().to_string();
        if artifact.len() <= 50 {
            push_unique(&mut artifacts, artifact);
        }
    }
    for capture in THE_PHRASE.captures_iter(command) {
        let artifact = capture[1].trim().to_string();
        if artifact.len() <= 50 && !targets.iter().any(|t| t.eq_ignore_ascii_case(&artifact)) {
            push_unique(&mut artifacts, artifact);
        }
    }
    for capture in ABOUT_PHRASE.captures_iter(command) {
        let artifact = capture[1].trim().to_string();
        if artifact.len() <= 50 {
            push_unique(&mut artifacts, artifact);
        }
    }

    artifacts
}

fn extract_constraints(command: &str) -> HashMap<String, String> {
    let mut constraints = HashMap::new();

    for (source, pattern) in SOURCE_PATTERNS.iter() {
        if pattern.is_match(command) {
            constraints.insert("source".to_string(), (*source).to_string());
            break;
        }
    }
    for (time, pattern) in TIME_PATTERNS.iter() {
        if pattern.is_match(command) {
            constraints.insert("time".to_string(), (*time).to_string());
            break;
        }
    }
    if let Some(capture) = LABEL_PATTERN.captures(command) {
        constraints.insert("label".to_string(), capture[1].to_lowercase());
    }
    if let Some(capture) = FOLDER_PATTERN.captures(command) {
        constraints.insert("folder".to_string(), capture[1].to_string());
    }

    constraints
}

/// Parse `command` into an `Intent`. Never fails: an unrecognized command
/// just yields `verb == "unknown"` with no targets/artifacts, for
/// `validate_intent` to reject.
pub fn parse_intent(command: &str) -> Intent {
    let verb = extract_verb(command);
    let targets = extract_targets(command);
    let artifacts = extract_artifacts(command, &targets);
    let constraints = extract_constraints(command);

    Intent {
        verb,
        targets,
        artifacts,
        constraints,
        original_command: command.to_string(),
    }
}

/// Mirrors `validate_intent`: an unknown verb always fails; `email`/
/// `message`/`forward`/`schedule` require at least one target; `reply` is
/// lenient (a bare "reply" with no explicit target is still actionable —
/// it replies in the current thread).
pub fn validate_intent(intent: &Intent) -> Result<(), String> {
    if intent.verb == "unknown" {
        return Err(format!("unrecognized verb in command: {}", intent.original_command));
    }

    let requires_target = matches!(intent.verb.as_str(), "email" | "message" | "forward" | "schedule");
    if requires_target && intent.targets.is_empty() {
        return Err(format!("'{}' command requires at least one target", intent.verb));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_priority_prefers_specific_over_general() {
        assert_eq!(parse_intent("Reply to the message from Alice").verb, "reply");
        assert_eq!(parse_intent("Forward the email to Bob").verb, "forward");
    }

    #[test]
    fn unknown_verb_falls_back() {
        assert_eq!(parse_intent("Do something random").verb, "unknown");
    }

    #[test]
    fn extracts_email_and_capitalized_name_targets() {
        let intent = parse_intent("Email alice@example.com about the project");
        assert!(intent.targets.contains(&"alice@example.com".to_string()));

        let intent = parse_intent("Message Alice about the meeting");
        assert!(intent.targets.contains(&"Alice".to_string()));
    }

    #[test]
    fn deduplicates_targets_case_insensitively() {
        let intent = parse_intent("Email Alice and message Alice");
        let alice_count = intent.targets.iter().filter(|t| t.eq_ignore_ascii_case("alice")).count();
        assert_eq!(alice_count, 1);
    }

    #[test]
    fn extracts_quoted_and_the_phrase_artifacts() {
        let intent = parse_intent("Email \"Q4 Budget Report\" to Alice");
        assert!(intent.artifacts.contains(&"Q4 Budget Report".to_string()));

        let intent = parse_intent("Forward the contract to Legal");
        assert!(intent.artifacts.contains(&"contract".to_string()));
    }

    #[test]
    fn team_channel_phrases_are_targets_not_artifacts() {
        let intent = parse_intent("Send to the Engineering team");
        assert!(intent.targets.contains(&"Engineering team".to_string()));
        assert!(!intent.artifacts.iter().any(|a| a == "Engineering"));
    }

    #[test]
    fn extracts_source_and_time_constraints() {
        let intent = parse_intent("Find messages from Alice in Teams about planning from yesterday");
        assert_eq!(intent.constraints.get("source").map(String::as_str), Some("teams"));
        assert_eq!(intent.constraints.get("time").map(String::as_str), Some("yesterday"));
        assert!(intent.targets.contains(&"Alice".to_string()));
        assert!(intent.artifacts.contains(&"planning".to_string()));
    }

    #[test]
    fn extracts_label_and_folder_constraints() {
        let intent = parse_intent("Find messages with label urgent");
        assert_eq!(intent.constraints.get("label").map(String::as_str), Some("urgent"));

        let intent = parse_intent("Find files in the Archive folder");
        assert_eq!(intent.constraints.get("folder").map(String::as_str), Some("Archive"));
    }

    #[test]
    fn validation_rejects_unknown_verb_and_missing_target() {
        let unknown = parse_intent("Do something random");
        assert!(validate_intent(&unknown).unwrap_err().to_lowercase().contains("verb"));

        let mut missing_target = parse_intent("Email about the meeting");
        missing_target.targets.clear();
        assert!(validate_intent(&missing_target).unwrap_err().to_lowercase().contains("target"));
    }

    #[test]
    fn validation_accepts_valid_find_and_email_intents() {
        assert!(validate_intent(&parse_intent("Find messages from Alice")).is_ok());
        assert!(validate_intent(&parse_intent("Email alice@example.com about the meeting")).is_ok());
    }
}
