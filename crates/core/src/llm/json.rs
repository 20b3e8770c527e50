//! Turns untrusted model text into a [`ReadingResult`].
//!
//! Only a missing or unparseable JSON object is an error. Everything else is defaulted or
//! clamped field by field, so a half-broken answer still yields a usable reading.

use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde_json::{Map, Value};

use crate::domain::reading::{ReadingResult, SafetyLevel};
use crate::domain::reason;

pub const FALLBACK_MANTRA: &str = "Danas je dan za nove mogućnosti.";

pub const DAILY_FALLBACK_MANTRAS: [&str; 5] = [
    "Danas je dan za nove mogućnosti.",
    "Verujem sebi i svom putu.",
    "Sve što mi je potrebno već je u meni.",
    "Otvaram srce za lepe vesti.",
    "Korak po korak, stižem tamo gde želim.",
];

pub const LUCKY_NUMBER_COUNT: usize = 5;
pub const LUCKY_NUMBER_MAX: i32 = 49;

// Fallback scores land in [50, 89].
const FALLBACK_SCORE_MIN: i32 = 50;
const FALLBACK_SCORE_SPAN: i32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MantraFallback {
    Fixed,
    DailyPool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoJsonObject,
    #[error("model output is not valid JSON: {0}")]
    InvalidJson(String),
}

fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
}

/// Best-effort extraction: fences removed, then first '{' to last '}'.
pub fn extract_json(text: &str) -> Option<String> {
    let cleaned = strip_code_fences(text);
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(cleaned[start..=end].to_string())
}

pub fn parse_reading(text: &str, mantra: MantraFallback) -> Result<ReadingResult, ParseError> {
    parse_reading_with(text, mantra, &mut rand::thread_rng())
}

pub fn parse_reading_with<R: Rng + ?Sized>(
    text: &str,
    mantra: MantraFallback,
    rng: &mut R,
) -> Result<ReadingResult, ParseError> {
    let json_str = extract_json(text).ok_or(ParseError::NoJsonObject)?;
    let value = serde_json::from_str::<Value>(&json_str)
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(ParseError::NoJsonObject);
    };

    let safety_level = match text_field(&obj, "safety_level").as_str() {
        "nsfw" => SafetyLevel::Nsfw,
        "unknown" => SafetyLevel::Unknown,
        _ => SafetyLevel::Ok,
    };
    let model_reason = text_field(&obj, "reason");

    if safety_level == SafetyLevel::Nsfw || model_reason == reason::NSFW_DETECTED {
        return Ok(ReadingResult::rejected(
            SafetyLevel::Nsfw,
            reason::NSFW_DETECTED,
        ));
    }

    // The model's own wording never reaches `reason`; only known codes survive.
    if obj.get("is_valid_cup").and_then(Value::as_bool) == Some(false) {
        let code = if reason::is_rejection(&model_reason) {
            model_reason
        } else {
            reason::NOT_A_CUP.to_string()
        };
        return Ok(ReadingResult::rejected(safety_level, code));
    }

    Ok(ReadingResult {
        main_text: text_field(&obj, "main_text"),
        love: text_field(&obj, "love"),
        work: text_field(&obj, "work"),
        money: text_field(&obj, "money"),
        health: text_field(&obj, "health"),
        symbols: symbols(obj.get("symbols")),
        lucky_numbers: lucky_numbers(obj.get("lucky_numbers"), rng),
        luck_score: score(obj.get("luck_score"), rng),
        mantra: mantra_field(&obj, mantra, rng),
        energy_score: score(obj.get("energy_score"), rng),
        is_valid_cup: true,
        safety_level,
        reason: reason::OK.to_string(),
    })
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn symbols(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn score<R: Rng + ?Sized>(value: Option<&Value>, rng: &mut R) -> i32 {
    match value.and_then(Value::as_f64) {
        Some(n) => n.round().clamp(0.0, 100.0) as i32,
        None => rng.gen_range(FALLBACK_SCORE_MIN..FALLBACK_SCORE_MIN + FALLBACK_SCORE_SPAN),
    }
}

fn mantra_field<R: Rng + ?Sized>(
    obj: &Map<String, Value>,
    fallback: MantraFallback,
    rng: &mut R,
) -> String {
    let parsed = text_field(obj, "mantra");
    if !parsed.is_empty() {
        return parsed;
    }
    match fallback {
        MantraFallback::Fixed => FALLBACK_MANTRA.to_string(),
        MantraFallback::DailyPool => DAILY_FALLBACK_MANTRAS
            .choose(rng)
            .copied()
            .unwrap_or(FALLBACK_MANTRA)
            .to_string(),
    }
}

fn whole_number(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

/// Keeps the model's numbers where they are valid, then tops up to exactly five unique values.
fn lucky_numbers<R: Rng + ?Sized>(value: Option<&Value>, rng: &mut R) -> Vec<i32> {
    let Some(items) = value.and_then(Value::as_array) else {
        return random_lucky_numbers(rng);
    };

    let mut out: Vec<i32> = Vec::with_capacity(LUCKY_NUMBER_COUNT);
    for n in items.iter().filter_map(whole_number) {
        if out.len() == LUCKY_NUMBER_COUNT {
            break;
        }
        if (1..=i64::from(LUCKY_NUMBER_MAX)).contains(&n) && !out.contains(&(n as i32)) {
            out.push(n as i32);
        }
    }

    while out.len() < LUCKY_NUMBER_COUNT {
        let n = rng.gen_range(1..=LUCKY_NUMBER_MAX);
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

pub fn random_lucky_numbers<R: Rng + ?Sized>(rng: &mut R) -> Vec<i32> {
    let mut numbers: Vec<i32> = index::sample(rng, LUCKY_NUMBER_MAX as usize, LUCKY_NUMBER_COUNT)
        .into_iter()
        .map(|i| i as i32 + 1)
        .collect();
    numbers.sort_unstable();
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn parse(text: &str) -> Result<ReadingResult, ParseError> {
        parse_reading_with(text, MantraFallback::Fixed, &mut rng())
    }

    fn assert_lucky_invariant(numbers: &[i32]) {
        assert_eq!(numbers.len(), LUCKY_NUMBER_COUNT);
        assert!(numbers.iter().all(|n| (1..=LUCKY_NUMBER_MAX).contains(n)));
        let unique: BTreeSet<_> = numbers.iter().collect();
        assert_eq!(unique.len(), numbers.len());
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn extract_json_rejects_reversed_braces() {
        assert_eq!(extract_json("} nothing {"), None);
        assert_eq!(extract_json("only { open"), None);
    }

    #[test]
    fn tolerates_prose_and_fences_and_clamps_scores() {
        let raw = "Here is your reading:\n```json\n{\"main_text\":\"x\",\"luck_score\":150}\n```\nHope you like it!";
        let r = parse(raw).unwrap();
        assert_eq!(r.main_text, "x");
        assert_eq!(r.luck_score, 100);
        assert!(r.is_valid_cup);
        assert_eq!(r.safety_level, SafetyLevel::Ok);
        assert_eq!(r.reason, "ok");
    }

    #[test]
    fn text_without_json_is_an_error() {
        assert_eq!(parse("no json here at all"), Err(ParseError::NoJsonObject));
    }

    #[test]
    fn broken_json_is_an_error() {
        let err = parse("{\"main_text\": \"unterminated}").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn nested_braces_inside_strings_survive() {
        let raw = json!({
            "main_text": "a {curly} story",
            "mantra": "keep {calm}",
        })
        .to_string();
        let r = parse(&format!("Sure! {raw} That's all.")).unwrap();
        assert_eq!(r.main_text, "a {curly} story");
        assert_eq!(r.mantra, "keep {calm}");
    }

    #[test]
    fn wrong_types_fall_back_to_defaults() {
        let raw = json!({
            "main_text": 12,
            "love": null,
            "work": ["nope"],
            "money": "Novac stiže.",
            "symbols": "ptica",
            "lucky_numbers": "7",
            "luck_score": "high",
            "energy_score": -20,
            "mantra": "",
        })
        .to_string();
        let r = parse(&raw).unwrap();
        assert_eq!(r.main_text, "");
        assert_eq!(r.love, "");
        assert_eq!(r.work, "");
        assert_eq!(r.money, "Novac stiže.");
        assert_eq!(r.health, "");
        assert!(r.symbols.is_empty());
        assert_lucky_invariant(&r.lucky_numbers);
        assert!((50..=89).contains(&r.luck_score));
        assert_eq!(r.energy_score, 0);
        assert_eq!(r.mantra, FALLBACK_MANTRA);
    }

    #[test]
    fn symbols_keep_only_non_empty_strings_in_order() {
        let raw = json!({"symbols": ["ptica", 3, " ", " ključ ", null, "put"]}).to_string();
        let r = parse(&raw).unwrap();
        assert_eq!(r.symbols, vec!["ptica", "ključ", "put"]);
    }

    #[test]
    fn parser_does_not_truncate_symbols() {
        let symbols: Vec<String> = (1..=9).map(|i| format!("s{i}")).collect();
        let raw = json!({ "symbols": symbols }).to_string();
        assert_eq!(parse(&raw).unwrap().symbols.len(), 9);
    }

    #[test]
    fn lucky_numbers_from_model_are_sanitized() {
        let raw = json!({"lucky_numbers": [7, 7, 0, 50, 12.0, 3.5, "9", 21, 33, 44, 48]}).to_string();
        let r = parse(&raw).unwrap();
        assert_eq!(r.lucky_numbers, vec![7, 12, 21, 33, 44]);
    }

    #[test]
    fn short_lucky_numbers_are_topped_up() {
        let raw = json!({"lucky_numbers": [3, 3]}).to_string();
        let r = parse(&raw).unwrap();
        assert_eq!(r.lucky_numbers[0], 3);
        assert_lucky_invariant(&r.lucky_numbers);
    }

    #[test]
    fn synthesized_lucky_numbers_hold_invariant() {
        let mut rng = rng();
        for _ in 0..500 {
            let numbers = random_lucky_numbers(&mut rng);
            assert_lucky_invariant(&numbers);
            assert!(numbers.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn missing_scores_are_randomized_in_band() {
        let mut rng = rng();
        for _ in 0..200 {
            let r = parse_reading_with("{}", MantraFallback::Fixed, &mut rng).unwrap();
            assert!((50..=89).contains(&r.luck_score));
            assert!((50..=89).contains(&r.energy_score));
        }
    }

    #[test]
    fn fractional_scores_round() {
        let r = parse("{\"luck_score\": 72.6, \"energy_score\": 0.4}").unwrap();
        assert_eq!((r.luck_score, r.energy_score), (73, 0));
    }

    #[test]
    fn daily_fallback_mantra_comes_from_pool() {
        let mut rng = rng();
        let r = parse_reading_with("{}", MantraFallback::DailyPool, &mut rng).unwrap();
        assert!(DAILY_FALLBACK_MANTRAS.contains(&r.mantra.as_str()));
    }

    #[test]
    fn model_flagged_non_cup_is_rejected_and_zeroed() {
        let r = parse("{\"is_valid_cup\": false, \"main_text\": \"ignored\", \"luck_score\": 80}")
            .unwrap();
        assert!(!r.is_valid_cup);
        assert_eq!(r.reason, reason::NOT_A_CUP);
        assert_eq!(r, ReadingResult::rejected(SafetyLevel::Ok, reason::NOT_A_CUP));
    }

    #[test]
    fn valid_cup_reason_is_always_ok() {
        let r = parse(r#"{"main_text":"x","reason":"I think this looks like a lovely cup of coffee"}"#)
            .unwrap();
        assert!(r.is_valid_cup);
        assert_eq!(r.reason, reason::OK);

        let r = parse(r#"{"main_text":"x","reason":"not_a_cup"}"#).unwrap();
        assert!(r.is_valid_cup);
        assert_eq!(r.reason, reason::OK);
    }

    #[test]
    fn rejection_reason_is_limited_to_known_codes() {
        let r = parse(r#"{"is_valid_cup":false,"reason":"ok"}"#).unwrap();
        assert_eq!(r.reason, reason::NOT_A_CUP);

        let r = parse(r#"{"is_valid_cup":false,"reason":"Ovo je tanjir, ne šoljica."}"#).unwrap();
        assert_eq!(r.reason, reason::NOT_A_CUP);

        let r = parse(r#"{"is_valid_cup":false,"reason":"too_dark"}"#).unwrap();
        assert_eq!(r.reason, reason::TOO_DARK);
    }

    #[test]
    fn unknown_safety_level_is_kept() {
        let r = parse(r#"{"main_text":"x","safety_level":"unknown"}"#).unwrap();
        assert_eq!(r.safety_level, SafetyLevel::Unknown);
        assert!(r.is_valid_cup);

        let r = parse(r#"{"is_valid_cup":false,"safety_level":"unknown"}"#).unwrap();
        assert_eq!(r.safety_level, SafetyLevel::Unknown);
    }

    #[test]
    fn model_flagged_nsfw_is_surfaced() {
        let r = parse("{\"safety_level\": \"nsfw\", \"main_text\": \"x\"}").unwrap();
        assert!(r.is_nsfw());
        let r = parse("{\"reason\": \"nsfw_detected\"}").unwrap();
        assert!(r.is_nsfw());
        assert_eq!(r, ReadingResult::rejected(SafetyLevel::Nsfw, reason::NSFW_DETECTED));
    }
}
