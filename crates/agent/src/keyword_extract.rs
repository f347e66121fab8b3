//! Deterministic slot-extraction safety net.
//!
//! A regex/keyword pass that runs alongside LLM extraction and is merged
//! *under* it (the LLM pass wins per key). It catches the mechanical slots:
//! dates, times, durations, currency amounts, transport modes, destinations,
//! activity keywords. It also resolves short follow-ups ("Friday", "flexible")
//! against the question that was just asked.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

use planmind_domains::{Question, SlotMap, is_filled, slot_lookup};

static DATE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:from\s+)?the\s+\d{1,2}(?:st|nd|rd|th)?\s*(?:to|through|until|[-–])\s*(?:the\s+)?\d{1,2}(?:st|nd|rd|th)?\b",
    )
    .expect("date range regex")
});

static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:next\s+|this\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("weekday regex")
});

static RELATIVE_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(today|tomorrow|tonight|next weekend|this weekend|next week|next month)\b")
        .expect("relative day regex")
});

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}(?:st|nd|rd|th)?\b",
    )
    .expect("month day regex")
});

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,2}(?::\d{2})?\s*(?:am|pm)(?:\s+[A-Za-z]{2,4})?\b").expect("time regex")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+\s*-?\s*(?:minute|min|hour|hr|day|week)s?\b").expect("duration regex")
});

static MONEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s?\d[\d,]*(?:\.\d{2})?|\b\d[\d,]*\s?(?:dollars|usd|bucks)\b")
        .expect("money regex")
});

static FIRST_PERSON_DRIVING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bI(?:'m|\s+am|'ll|\s+will)?\s*(?:be\s+)?driv(?:e|ing)\b|\bdriving\s+from\b")
        .expect("driving regex")
});

static FIRST_PERSON_FLYING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bI(?:'m|\s+am|'ll|\s+will)?\s*(?:be\s+)?fly(?:ing)?\b").expect("flying regex")
});

static TRANSPORT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(train|bus|road trip|rental car|transit)\b").expect("transport regex")
});

static DESTINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:trip to|travel to|traveling to|going to|headed to|flight to|fly(?:ing)? to|visit(?:ing)?)\s+([A-Z][A-Za-z]+(?:\s[A-Z][A-Za-z]+)?)",
    )
    .expect("destination regex")
});

static EXPERIENCE_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(beginner|intermediate|advanced)\b").expect("level regex")
});

static NO_EQUIPMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bno equipment\b").expect("no equipment regex"));

static EQUIPMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(dumbbells?|kettlebells?|barbell|resistance bands?|home gym|full gym)\b")
        .expect("equipment regex")
});

static ACTIVITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(home workout|workout|strength training|strength|cardio|yoga|run(?:ning)?|hike|hiking)\b")
        .expect("activity regex")
});

/// Slot paths the deterministic pass may always fill, independent of the
/// active question list.
const ALWAYS_ALLOWED: [&str; 6] =
    ["timing.date", "timing.time", "timing.duration", "budget", "transportation", "destination"];

/// Run every matcher over the message and keep the results that fit the
/// active question list (plus the always-safe mechanical paths). With no
/// question list yet (the very first turn), everything is kept.
pub fn keyword_extract(message: &str, questions: &[Question]) -> SlotMap {
    let mut found: Vec<(&str, String)> = Vec::new();

    if let Some(m) = DATE_RANGE.find(message) {
        found.push(("timing.date", m.as_str().to_string()));
    } else if let Some(m) = MONTH_DAY.find(message) {
        found.push(("timing.date", m.as_str().to_string()));
    } else if let Some(m) = WEEKDAY.find(message) {
        found.push(("timing.date", m.as_str().to_string()));
    } else if let Some(m) = RELATIVE_DAY.find(message) {
        found.push(("timing.date", m.as_str().to_string()));
    }

    if let Some(m) = CLOCK_TIME.find(message) {
        found.push(("timing.time", m.as_str().to_string()));
    }
    if let Some(m) = DURATION.find(message) {
        found.push(("timing.duration", m.as_str().to_string()));
    }
    if let Some(m) = MONEY.find(message) {
        found.push(("budget", m.as_str().to_string()));
    }

    if FIRST_PERSON_DRIVING.is_match(message) {
        found.push(("transportation", "driving".to_string()));
    } else if FIRST_PERSON_FLYING.is_match(message) {
        found.push(("transportation", "flying".to_string()));
    } else if let Some(captures) = TRANSPORT_KEYWORD.captures(message) {
        found.push(("transportation", captures[1].to_lowercase()));
    }

    if let Some(captures) = DESTINATION.captures(message) {
        found.push(("destination", captures[1].to_string()));
    }
    if let Some(captures) = EXPERIENCE_LEVEL.captures(message) {
        found.push(("experience_level", captures[1].to_lowercase()));
    }
    if NO_EQUIPMENT.is_match(message) {
        found.push(("equipment", "none".to_string()));
    } else if let Some(captures) = EQUIPMENT.captures(message) {
        found.push(("equipment", captures[1].to_lowercase()));
    }
    if let Some(captures) = ACTIVITY.captures(message) {
        found.push(("goal", captures[1].to_lowercase()));
    }

    let mut slots = SlotMap::new();
    for (path, value) in found {
        if allowed(path, questions) {
            insert_path(&mut slots, path, json!(value));
        }
    }
    slots
}

/// Resolve a short free-form reply against the question that was just asked.
///
/// "flexible" after a budget question means the budget is flexible, not
/// unknown. Only fires when the reply is short, the asked question is still
/// open, and no matcher already produced a value for it.
pub fn short_reply(
    message: &str,
    next_question: Option<&Question>,
    extracted: &SlotMap,
    existing: &SlotMap,
) -> Option<SlotMap> {
    let question = next_question?;
    let reply = message.trim();
    if reply.is_empty() || reply.len() > 60 || reply.contains('?') {
        return None;
    }
    let already_answered = is_filled(slot_lookup(existing, &question.slot_path))
        || is_filled(slot_lookup(existing, &question.id));
    let freshly_extracted = is_filled(slot_lookup(extracted, &question.slot_path))
        || is_filled(slot_lookup(extracted, &question.id));
    if already_answered || freshly_extracted {
        return None;
    }

    let mut slots = SlotMap::new();
    insert_path(&mut slots, &question.slot_path, json!(reply));
    Some(slots)
}

fn allowed(path: &str, questions: &[Question]) -> bool {
    if questions.is_empty() || ALWAYS_ALLOWED.contains(&path) {
        return true;
    }
    questions.iter().any(|q| q.slot_path == path || q.id == path)
}

/// Insert a value at a dotted path, nesting composite slots one level deep
/// the way the slot reducer expects them.
pub fn insert_path(slots: &mut SlotMap, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            slots.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = slots
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(SlotMap::new()));
            if let Value::Object(map) = entry {
                map.insert(rest.to_string(), value);
            } else {
                // A scalar already lives at the head key; replace it with the
                // composite form.
                let mut map = SlotMap::new();
                map.insert(rest.to_string(), value);
                slots.insert(head.to_string(), Value::Object(map));
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, slot_path: &str) -> Question {
        Question {
            id: id.to_string(),
            question: String::new(),
            required: false,
            slot_path: slot_path.to_string(),
        }
    }

    #[test]
    fn comprehensive_travel_message_extracts_mechanical_slots() {
        let message = "Help plan my trip to Dallas next weekend from the 10th to the 12th. \
                       Flying my partner in from LAX, I'm driving from Austin.";
        let slots = keyword_extract(message, &[]);

        assert_eq!(slots.get("destination").unwrap(), "Dallas");
        let date = slot_lookup(&slots, "timing.date").unwrap().as_str().unwrap();
        assert!(date.contains("10th"), "got {date:?}");
        // First-person driving outranks the partner's flight.
        assert_eq!(slots.get("transportation").unwrap(), "driving");
    }

    #[test]
    fn short_weekday_reply_lands_on_timing_date() {
        let slots = keyword_extract("Friday", &[]);
        assert_eq!(slot_lookup(&slots, "timing.date").unwrap(), "Friday");
    }

    #[test]
    fn time_with_zone_and_duration_and_money() {
        let slots = keyword_extract("Friday 5pm PST, about 2 hours, budget $1,500", &[]);
        assert_eq!(slot_lookup(&slots, "timing.time").unwrap(), "5pm PST");
        assert_eq!(slot_lookup(&slots, "timing.duration").unwrap(), "2 hours");
        assert_eq!(slots.get("budget").unwrap(), "$1,500");
    }

    #[test]
    fn workout_message_fills_fitness_slots() {
        let questions = [
            question("goal", "goal"),
            question("duration", "timing.duration"),
            question("equipment", "equipment"),
        ];
        let slots =
            keyword_extract("plan a 30-minute home workout today, beginner, no equipment", &questions);
        assert_eq!(slots.get("goal").unwrap(), "home workout");
        assert_eq!(slot_lookup(&slots, "timing.duration").unwrap(), "30-minute");
        assert_eq!(slots.get("equipment").unwrap(), "none");
        assert_eq!(slot_lookup(&slots, "timing.date").unwrap(), "today");
    }

    #[test]
    fn question_list_filters_out_of_domain_keywords() {
        // A travel question list: the "goal" activity keyword must not leak in.
        let questions = [question("destination", "destination"), question("dates", "timing.date")];
        let slots = keyword_extract("a quick workout before my trip to Dallas", &questions);
        assert!(slots.get("goal").is_none());
        assert_eq!(slots.get("destination").unwrap(), "Dallas");
    }

    #[test]
    fn short_reply_fills_the_asked_question() {
        let budget = question("budget", "budget");
        let extracted = SlotMap::new();
        let existing = SlotMap::new();
        let slots = short_reply("flexible", Some(&budget), &extracted, &existing).unwrap();
        assert_eq!(slots.get("budget").unwrap(), "flexible");
    }

    #[test]
    fn short_reply_defers_to_matchers_and_existing_answers() {
        let budget = question("budget", "budget");

        let mut extracted = SlotMap::new();
        extracted.insert("budget".to_string(), serde_json::json!("$500"));
        assert!(short_reply("500 total", Some(&budget), &extracted, &SlotMap::new()).is_none());

        let mut existing = SlotMap::new();
        existing.insert("budget".to_string(), serde_json::json!("flexible"));
        assert!(short_reply("whatever", Some(&budget), &SlotMap::new(), &existing).is_none());

        let long = "this reply is far too long to be a direct answer to the question that was \
                    asked just now";
        assert!(short_reply(long, Some(&budget), &SlotMap::new(), &SlotMap::new()).is_none());
    }

    #[test]
    fn insert_path_nests_one_level() {
        let mut slots = SlotMap::new();
        insert_path(&mut slots, "timing.date", serde_json::json!("Friday"));
        insert_path(&mut slots, "timing.time", serde_json::json!("5pm"));
        insert_path(&mut slots, "destination", serde_json::json!("Dallas"));

        let timing = slots.get("timing").unwrap().as_object().unwrap();
        assert_eq!(timing.get("date").unwrap(), "Friday");
        assert_eq!(timing.get("time").unwrap(), "5pm");
        assert_eq!(slots.get("destination").unwrap(), "Dallas");
    }
}
