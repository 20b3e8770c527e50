//! Instruction text sent to the model. Pure string building, no I/O.

use chrono::NaiveDate;

use crate::domain::reading::{ReadingContext, ReadingMode};

const READER_PERSONA: &str = "You are an experienced, warm fortune teller who reads Turkish coffee cups. \
Look carefully at the shapes left by the coffee grounds inside the cup in the attached photo and interpret them.";

const DAILY_PERSONA: &str = "You are an experienced, warm fortune teller. \
Write a personal daily horoscope-style reading in the spirit of a coffee cup reading.";

const LANGUAGE_RULE: &str = "Write every text value in Serbian, Latin script.";

const IMAGE_FLAGS: &str = "If the photo does not show the inside of a coffee cup, return only \
{\"is_valid_cup\": false, \"reason\": \"not_a_cup\"}. \
If the photo contains inappropriate or explicit content, return only \
{\"is_valid_cup\": false, \"safety_level\": \"nsfw\", \"reason\": \"nsfw_detected\"}.";

fn output_schema() -> String {
    [
        "Return ONLY a single JSON object. Do not wrap it in markdown. Do not add any text before or after it.",
        "Use double quotes for all JSON strings. No comments. No trailing commas.",
        "Output schema:",
        "{",
        "  \"main_text\": \"string\",",
        "  \"love\": \"string\",",
        "  \"work\": \"string\",",
        "  \"money\": \"string\",",
        "  \"health\": \"string\",",
        "  \"symbols\": [\"string\"],",
        "  \"luck_score\": 0,",
        "  \"lucky_numbers\": [0, 0, 0, 0, 0],",
        "  \"mantra\": \"string\",",
        "  \"energy_score\": 0",
        "}",
        "Rules:",
        "- luck_score and energy_score are integers between 0 and 100",
        "- lucky_numbers has exactly 5 unique integers between 1 and 49",
        "- mantra is one short, positive sentence",
    ]
    .join("\n")
}

fn mode_instructions(mode: ReadingMode) -> &'static str {
    match mode {
        ReadingMode::Instant => {
            "Reading style: quick and clear.\n\
- main_text: 2-3 sentences\n\
- love, work, money, health: 1-2 sentences each\n\
- symbols: 2-3 symbols you see in the cup"
        }
        ReadingMode::Mystic => {
            "Reading style: mystical and poetic, rich in metaphors and imagery.\n\
- main_text: 4-5 sentences\n\
- love, work, money, health: 2-3 sentences each\n\
- symbols: 4-5 symbols you see in the cup"
        }
        ReadingMode::Deep => {
            "Reading style: the most detailed reading, with concrete, actionable advice.\n\
- main_text: 6-8 sentences\n\
- love, work, money, health: 3-4 sentences each, each ending with practical advice\n\
- symbols: 5-7 symbols you see in the cup"
        }
    }
}

/// Lists whatever personal context is present. `None` when nothing is.
fn context_block(context: &ReadingContext) -> Option<String> {
    if context.is_empty() {
        return None;
    }

    let mut lines = vec!["About the person:".to_string()];
    if let Some(sign) = context.zodiac_sign() {
        lines.push(format!("- Zodiac sign: {sign}"));
    }
    if let Some(gender) = context.gender() {
        lines.push(format!("- Gender: {gender}"));
    }
    if let Some(focus) = context.focus_area() {
        lines.push(format!("- Focus area: {focus} (give it extra attention)"));
    }
    lines.push("Use this context to personalise the reading.".to_string());
    Some(lines.join("\n"))
}

pub fn build_reading_prompt(mode: ReadingMode, context: &ReadingContext) -> String {
    let mut sections = vec![READER_PERSONA.to_string()];
    if let Some(block) = context_block(context) {
        sections.push(block);
    }
    sections.push(mode_instructions(mode).to_string());
    sections.push(LANGUAGE_RULE.to_string());
    sections.push(IMAGE_FLAGS.to_string());
    sections.push(output_schema());
    sections.join("\n\n")
}

/// Daily readings carry no image and no mode; focus area is ignored.
pub fn build_daily_prompt(context: &ReadingContext, date: NaiveDate) -> String {
    let daily_context = ReadingContext {
        zodiac_sign: context.zodiac_sign.clone(),
        gender: context.gender.clone(),
        focus_area: None,
    };

    let mut sections = vec![
        DAILY_PERSONA.to_string(),
        format!("The reading is for {}.", date.format("%Y-%m-%d")),
    ];
    if let Some(block) = context_block(&daily_context) {
        sections.push(block);
    }
    sections.push(
        "Reading style: rich and inspiring.\n\
- main_text: 4-5 sentences about the overall energy of the day\n\
- love, work, money, health: 2-3 sentences each\n\
- symbols: 3-5 symbols that mark the day\n\
- luck_score and energy_score must reflect this particular day; do not reuse the same numbers every day"
            .to_string(),
    );
    sections.push(LANGUAGE_RULE.to_string());
    sections.push(output_schema());
    sections.join("\n\n")
}
