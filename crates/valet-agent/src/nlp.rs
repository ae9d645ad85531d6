use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Weekday};
use regex::Regex;

/// What the user wants done. A closed vocabulary: classification is a
/// keyword-membership test, never free-form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CreateEvent,
    CreateReminder,
    CreateNote,
    CreateTask,
    QueryEvents,
    QueryReminders,
    Cancel,
    Update,
    GeneralQuery,
    FileUpload,
    FileList,
    FileLink,
    FileShare,
    BrowserNavigation,
    BrowserScreenshot,
    BrowserExtract,
    BrowserInteraction,
}

impl Intent {
    /// Label used on conversation log rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CreateEvent => "create_event",
            Intent::CreateReminder => "create_reminder",
            Intent::CreateNote => "create_note",
            Intent::CreateTask => "create_task",
            Intent::QueryEvents => "query_events",
            Intent::QueryReminders => "query_reminders",
            Intent::Cancel => "cancel",
            Intent::Update => "update",
            Intent::GeneralQuery => "general_query",
            Intent::FileUpload => "file_upload",
            Intent::FileList => "file_list",
            Intent::FileLink => "file_link",
            Intent::FileShare => "file_share",
            Intent::BrowserNavigation => "browser_navigation",
            Intent::BrowserScreenshot => "browser_screenshot",
            Intent::BrowserExtract => "browser_extract",
            Intent::BrowserInteraction => "browser_interaction",
        }
    }
}

/// Ordered keyword table. First matching row wins, so rows that would be
/// shadowed by a broader keyword come first ("my reminders" before
/// "remind", "my schedule" before "schedule").
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::QueryReminders,
        &[
            "my reminders",
            "list reminders",
            "show reminders",
            "what reminders",
            "upcoming reminders",
        ],
    ),
    (
        Intent::QueryEvents,
        &[
            "my events",
            "my schedule",
            "my calendar",
            "list events",
            "upcoming events",
            "what do i have",
            "what's on my",
        ],
    ),
    (Intent::Cancel, &["cancel", "unschedule", "call off"]),
    (Intent::Update, &["reschedule", "move my", "update the", "change the"]),
    (Intent::CreateReminder, &["remind", "don't let me forget"]),
    (
        Intent::CreateEvent,
        &["schedule", "meeting", "appointment", "book a", "add to calendar"],
    ),
    (Intent::CreateNote, &["note", "write down", "jot down", "save this"]),
    (Intent::CreateTask, &["task", "todo", "to-do", "add to my list"]),
    (Intent::FileList, &["my files", "list files", "show files", "what files"]),
    (Intent::FileShare, &["share"]),
    (
        Intent::FileLink,
        &["link for", "link of", "link to the", "get link", "file link"],
    ),
    (Intent::FileUpload, &["upload"]),
    (Intent::BrowserScreenshot, &["screenshot", "capture the page"]),
    (Intent::BrowserExtract, &["extract", "scrape", "pull the text"]),
    (
        Intent::BrowserInteraction,
        &["click", "type into", "press the", "scroll", "fill in"],
    ),
    (
        Intent::BrowserNavigation,
        &["go to", "open the site", "navigate", "visit", "browse to"],
    ),
];

/// Deterministic intent classification. Defaults to GeneralQuery.
pub fn classify_intent(text: &str) -> Intent {
    let lower = text.to_lowercase();
    for (intent, keywords) in INTENT_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *intent;
        }
    }
    Intent::GeneralQuery
}

/// Structured parameters extracted from one message. Timestamps are unix
/// seconds; durations are seconds. `datetime_from_duration` latches when
/// the datetime was computed from an explicit relative expression, which
/// makes it immune to LLM overwrite.
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    pub raw_text: String,
    pub title: Option<String>,
    pub datetime: Option<i64>,
    pub duration: Option<i64>,
    pub reminder_before: Option<i64>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub share_with: Option<String>,
    pub access_level: Option<String>,
    pub datetime_from_duration: bool,
}

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(minutes?|mins?|hours?|hrs?|days?|weeks?)\b").unwrap()
});

static REMINDER_BEFORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(minutes?|mins?|hours?|hrs?|days?)\s+(?:before|earlier|ahead)\b")
        .unwrap()
});

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bin\s+\d+\s*(minutes?|mins?|hours?|hrs?|days?|weeks?)\b|\b\d+\s*(minutes?|mins?|hours?|hrs?|days?|weeks?)\s+from\s+now\b|\bafter\s+\d+\s*(minutes?|mins?|hours?|hrs?|days?|weeks?)\b",
    )
    .unwrap()
});

static TIME_AMPM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").unwrap()
});

static TIME_AT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bat\s+(\d{1,2})(?::(\d{2}))?\b").unwrap());

static ISO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})(?:[ T](\d{2}):(\d{2}))?\b").unwrap()
});

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).unwrap());

static CALLED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:called|titled|named)\s+(.+)").unwrap());

static REMIND_TO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bremind me\b.*?\bto\s+(.+)").unwrap());

static EVENT_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(meeting|appointment|event|standup|sync|call)\b").unwrap()
});

fn unit_seconds(unit: &str) -> i64 {
    let u = unit.to_lowercase();
    if u.starts_with("min") {
        60
    } else if u.starts_with("hour") || u.starts_with("hr") {
        3600
    } else if u.starts_with("day") {
        86400
    } else {
        604800
    }
}

/// Parse a duration expression ("2 minutes", "3 hrs") into seconds.
pub fn parse_duration(text: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(text)?;
    let n: i64 = caps[1].parse().ok()?;
    Some(n * unit_seconds(&caps[2]))
}

/// Parse an "N units before" offset into seconds.
pub fn parse_reminder_before(text: &str) -> Option<i64> {
    let caps = REMINDER_BEFORE_RE.captures(text)?;
    let n: i64 = caps[1].parse().ok()?;
    Some(n * unit_seconds(&caps[2]))
}

/// True when the text carries an explicit relative-time expression
/// ("in 10 minutes", "2 hours from now", "after 3 days"). Shared by the
/// rule-based pass and the LLM merge so both agree on what counts as
/// relative.
pub fn is_relative_expression(text: &str) -> bool {
    RELATIVE_RE.is_match(text)
}

/// Relative-duration reconciliation. When a duration is present and the
/// text is an explicit relative expression, or there is no datetime, or
/// the datetime already passed, the datetime becomes now + duration.
pub fn reconcile_relative_time(entities: &mut EntitySet, now: i64) {
    let Some(duration) = entities.duration else {
        return;
    };

    let stale = match entities.datetime {
        None => true,
        Some(dt) => dt < now,
    };

    if is_relative_expression(&entities.raw_text) || stale {
        entities.datetime = Some(now + duration);
        entities.datetime_from_duration = true;
    }
}

fn hour_minute_ampm(caps: &regex::Captures) -> Option<(u32, u32)> {
    let h12: u32 = caps[1].parse().ok()?;
    if h12 == 0 || h12 > 12 {
        return None;
    }
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    if minute > 59 {
        return None;
    }
    let hour = match &caps[3].to_lowercase()[..] {
        "pm" if h12 < 12 => h12 + 12,
        "am" if h12 == 12 => 0,
        _ => h12,
    };
    Some((hour, minute))
}

fn extract_time(lower: &str) -> Option<(u32, u32)> {
    if lower.contains("noon") {
        return Some((12, 0));
    }
    if lower.contains("midnight") {
        return Some((0, 0));
    }
    if let Some(caps) = TIME_AMPM_RE.captures(lower) {
        return hour_minute_ampm(&caps);
    }
    if let Some(caps) = TIME_AT_RE.captures(lower) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if hour <= 23 && minute <= 59 {
            return Some((hour, minute));
        }
    }
    None
}

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

/// Resolve the day a message refers to. Weekday names resolve to their
/// next occurrence (never today). Returns the date plus a default time
/// for words that imply one ("tonight").
fn extract_day(lower: &str, today: NaiveDate) -> Option<(NaiveDate, Option<(u32, u32)>)> {
    if lower.contains("tomorrow") {
        return Some((today + Duration::days(1), None));
    }
    if lower.contains("tonight") {
        return Some((today, Some((20, 0))));
    }
    if lower.contains("today") {
        return Some((today, None));
    }
    if lower.contains("next week") {
        return Some((today + Duration::days(7), None));
    }

    for (name, weekday) in WEEKDAYS {
        if lower.contains(name) {
            let today_num = today.weekday().num_days_from_monday();
            let target_num = weekday.num_days_from_monday();
            let mut ahead = (target_num + 7 - today_num) % 7;
            if ahead == 0 {
                ahead = 7;
            }
            return Some((today + Duration::days(ahead as i64), None));
        }
    }

    None
}

fn local_timestamp(
    offset: FixedOffset,
    date: NaiveDate,
    hour: u32,
    minute: u32,
) -> Option<i64> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    Some(offset.from_local_datetime(&naive).single()?.timestamp())
}

/// Rule-based natural-language datetime parsing. Prefers the future when
/// ambiguous: a bare time already past today rolls to tomorrow, a
/// year-less month-day already past rolls to next year.
pub fn parse_datetime(text: &str, now: i64, tz_offset: i32) -> Option<i64> {
    let offset = FixedOffset::east_opt(tz_offset * 3600)?;
    let now_local: DateTime<FixedOffset> =
        DateTime::from_timestamp(now, 0)?.with_timezone(&offset);
    let today = now_local.date_naive();
    let lower = text.to_lowercase();

    // Explicit ISO dates win outright
    if let Some(caps) = ISO_RE.captures(&lower) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        let (hour, minute) = match (caps.get(4), caps.get(5)) {
            (Some(h), Some(m)) => (h.as_str().parse().ok()?, m.as_str().parse().ok()?),
            _ => (9, 0),
        };
        return local_timestamp(offset, date, hour, minute);
    }

    let time = extract_time(&lower);
    let day = extract_day(&lower, today);

    match (day, time) {
        (Some((date, _)), Some((h, m))) => local_timestamp(offset, date, h, m),
        (Some((date, default_time)), None) => {
            let (h, m) = default_time.unwrap_or((9, 0));
            local_timestamp(offset, date, h, m)
        }
        (None, Some((h, m))) => {
            let ts = local_timestamp(offset, today, h, m)?;
            if ts <= now {
                local_timestamp(offset, today + Duration::days(1), h, m)
            } else {
                Some(ts)
            }
        }
        (None, None) => fallback_parse(&lower, offset, today),
    }
}

/// Permissive pass: slide a window over the tokens and throw chrono
/// format strings at it.
fn fallback_parse(lower: &str, offset: FixedOffset, today: NaiveDate) -> Option<i64> {
    let tokens: Vec<&str> = lower.split_whitespace().collect();

    for start in 0..tokens.len() {
        let max_len = 3.min(tokens.len() - start);
        for len in (1..=max_len).rev() {
            let window = tokens[start..start + len].join(" ");
            let cleaned = window.trim_matches(|c: char| ",.!?".contains(c));
            if let Some(date) = try_date_formats(cleaned, today) {
                return local_timestamp(offset, date, 9, 0);
            }
        }
    }

    None
}

fn try_date_formats(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    for fmt in ["%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    // Year-less month-day ("march 5"): current year, rolled forward if past
    for fmt in ["%B %d %Y", "%b %d %Y"] {
        let with_year = format!("{s} {}", today.year());
        if let Ok(date) = NaiveDate::parse_from_str(&with_year, fmt) {
            if date < today {
                return date.with_year(today.year() + 1);
            }
            return Some(date);
        }
    }

    None
}

/// Remove time expressions from a candidate title.
fn strip_time_phrases(text: &str) -> String {
    let mut s = RELATIVE_RE.replace_all(text, "").to_string();
    s = TIME_AMPM_RE.replace_all(&s, "").to_string();
    s = TIME_AT_RE.replace_all(&s, "").to_string();
    s = ISO_RE.replace_all(&s, "").to_string();

    let lower_words = [
        "tomorrow", "tonight", "today", "next week", "noon", "midnight",
    ];
    let mut lowered = s.clone();
    for word in lower_words {
        if let Some(pos) = lowered.to_lowercase().find(word) {
            lowered.replace_range(pos..pos + word.len(), "");
        }
    }
    for (name, _) in WEEKDAYS {
        if let Some(pos) = lowered.to_lowercase().find(name) {
            lowered.replace_range(pos..pos + name.len(), "");
        }
    }

    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches([' ', ',', '.'])
        .trim_end_matches(" on")
        .trim_end_matches(" at")
        .trim_end_matches(" in")
        .trim_end_matches(" by")
        .trim()
        .to_string()
}

const TITLE_STOPWORDS: &[&str] = &[
    "a", "an", "the", "my", "our", "new", "quick", "schedule", "book", "create", "set", "add",
    "up",
];

/// Title from the words leading into the last event keyword:
/// "schedule a team sync meeting" becomes "team sync meeting".
fn event_keyword_title(text: &str) -> Option<String> {
    let m = EVENT_KEYWORD_RE.find_iter(text).last()?;
    let keyword = m.as_str().to_lowercase();

    let prefix: Vec<&str> = text[..m.start()].split_whitespace().collect();
    let window_start = prefix.len().saturating_sub(3);
    let words: Vec<&str> = prefix[window_start..]
        .iter()
        .filter(|w| !TITLE_STOPWORDS.contains(&w.to_lowercase().as_str()))
        .copied()
        .collect();

    // A bare "meeting" is the event kind, not a name
    if words.is_empty() {
        None
    } else {
        Some(format!("{} {}", words.join(" "), keyword))
    }
}

fn extract_title(text: &str) -> Option<String> {
    if let Some(caps) = QUOTED_RE.captures(text) {
        let quoted = caps.get(1).or_else(|| caps.get(2))?;
        return Some(quoted.as_str().to_string());
    }

    if let Some(caps) = CALLED_RE.captures(text) {
        let title = strip_time_phrases(&caps[1]);
        if !title.is_empty() {
            return Some(title);
        }
    }

    if let Some(caps) = REMIND_TO_RE.captures(text) {
        let title = strip_time_phrases(&caps[1]);
        if !title.is_empty() {
            return Some(title);
        }
    }

    event_keyword_title(text)
}

/// Deterministic rule-based entity extraction, ending with relative-time
/// reconciliation.
pub fn extract_entities(text: &str, now: i64, tz_offset: i32) -> EntitySet {
    let mut entities = EntitySet {
        raw_text: text.to_string(),
        ..Default::default()
    };

    entities.title = extract_title(text);
    entities.datetime = parse_datetime(text, now, tz_offset);
    entities.reminder_before = parse_reminder_before(text);

    // "before" offsets must not double as the duration
    let stripped = REMINDER_BEFORE_RE.replace_all(text, "");
    entities.duration = parse_duration(&stripped);

    reconcile_relative_time(&mut entities, now);
    entities
}

/// Entity fields as the LLM reports them, already normalized to the
/// EntitySet representation. Unparseable datetimes are dropped.
#[derive(Debug, Clone, Default)]
pub struct LlmEntities {
    pub title: Option<String>,
    pub datetime: Option<i64>,
    pub duration: Option<i64>,
    pub reminder_before: Option<i64>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub file_name: Option<String>,
    pub share_with: Option<String>,
    pub access_level: Option<String>,
}

/// Extract a JSON object from a string that may contain surrounding text
/// or markdown code fences.
pub fn extract_json(input: &str) -> &str {
    let trimmed = input.trim();

    let stripped = if trimmed.starts_with("```json") {
        trimmed
            .strip_prefix("```json")
            .unwrap_or(trimmed)
            .strip_suffix("```")
            .unwrap_or(trimmed)
            .trim()
    } else if trimmed.starts_with("```") {
        trimmed
            .strip_prefix("```")
            .unwrap_or(trimmed)
            .strip_suffix("```")
            .unwrap_or(trimmed)
            .trim()
    } else {
        trimmed
    };

    if let Some(start) = stripped.find('{') {
        if let Some(end) = stripped.rfind('}') {
            if end >= start {
                return &stripped[start..=end];
            }
        }
    }

    stripped
}

fn non_empty(v: &serde_json::Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "null")
        .map(|s| s.to_string())
}

/// Parse the LLM's JSON reply into LlmEntities. Datetimes arrive as
/// "YYYY-MM-DD HH:MM" local strings; anything else is dropped rather
/// than guessed at.
pub fn parse_llm_entities(response: &str, tz_offset: i32) -> LlmEntities {
    let json: serde_json::Value = match serde_json::from_str(extract_json(response)) {
        Ok(v) => v,
        Err(_) => return LlmEntities::default(),
    };

    let datetime = non_empty(&json["datetime"]).and_then(|s| {
        let offset = FixedOffset::east_opt(tz_offset * 3600)?;
        let naive = chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M"))
            .ok()?;
        Some(offset.from_local_datetime(&naive).single()?.timestamp())
    });

    LlmEntities {
        title: non_empty(&json["title"]),
        datetime,
        duration: json["duration_minutes"].as_i64().map(|m| m * 60),
        reminder_before: json["reminder_before_minutes"].as_i64().map(|m| m * 60),
        location: non_empty(&json["location"]),
        description: non_empty(&json["description"]),
        file_name: non_empty(&json["file_name"]),
        share_with: non_empty(&json["share_with"]),
        access_level: non_empty(&json["access_level"]),
    }
}

/// Merge the LLM pass into the rule-based pass. Non-null LLM fields
/// overwrite, except a datetime computed from an explicit relative
/// expression, which the LLM must never clobber. Reconciliation runs
/// again afterwards so a newly arrived duration still resolves.
pub fn merge_llm_entities(entities: &mut EntitySet, llm: LlmEntities, now: i64) {
    if llm.title.is_some() {
        entities.title = llm.title;
    }
    if llm.datetime.is_some() && !entities.datetime_from_duration {
        entities.datetime = llm.datetime;
    }
    if llm.duration.is_some() {
        entities.duration = llm.duration;
    }
    if llm.reminder_before.is_some() {
        entities.reminder_before = llm.reminder_before;
    }
    if llm.location.is_some() {
        entities.location = llm.location;
    }
    if llm.description.is_some() {
        entities.description = llm.description;
    }
    if llm.file_name.is_some() {
        entities.file_name = llm.file_name;
    }
    if llm.share_with.is_some() {
        entities.share_with = llm.share_with;
    }
    if llm.access_level.is_some() {
        entities.access_level = llm.access_level;
    }

    reconcile_relative_time(entities, now);
}

/// Fields a plan cannot proceed without, per intent. The names double as
/// keys into the clarifying-question map.
pub fn missing_required_fields(intent: Intent, entities: &EntitySet) -> Vec<&'static str> {
    let mut missing = Vec::new();

    match intent {
        Intent::CreateEvent | Intent::CreateReminder => {
            if entities.title.is_none() {
                missing.push("title");
            }
            if entities.datetime.is_none() {
                missing.push("datetime");
            }
        }
        Intent::CreateTask => {
            if entities.title.is_none() {
                missing.push("title");
            }
        }
        Intent::CreateNote => {
            if entities.title.is_none() && entities.description.is_none() {
                missing.push("content");
            }
        }
        _ => {}
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp()
    }

    // 2026-03-02 is a Monday
    const NOW: i64 = 1772445600; // 2026-03-02 10:00:00 UTC

    #[test]
    fn test_classify_query_before_create() {
        assert_eq!(classify_intent("show my reminders"), Intent::QueryReminders);
        assert_eq!(classify_intent("what's on my schedule"), Intent::QueryEvents);
        assert_eq!(classify_intent("remind me to call mom"), Intent::CreateReminder);
        assert_eq!(classify_intent("schedule a meeting"), Intent::CreateEvent);
    }

    #[test]
    fn test_classify_browser_intents() {
        assert_eq!(
            classify_intent("take a screenshot of example.com"),
            Intent::BrowserScreenshot
        );
        assert_eq!(
            classify_intent("extract the headlines from bbc.com"),
            Intent::BrowserExtract
        );
        assert_eq!(
            classify_intent("click the login button"),
            Intent::BrowserInteraction
        );
        assert_eq!(classify_intent("go to rust-lang.org"), Intent::BrowserNavigation);
    }

    #[test]
    fn test_classify_default() {
        assert_eq!(classify_intent("how are you doing"), Intent::GeneralQuery);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("in 2 minutes"), Some(120));
        assert_eq!(parse_duration("3 hours from now"), Some(10800));
        assert_eq!(parse_duration("after 1 day"), Some(86400));
        assert_eq!(parse_duration("2 weeks"), Some(1209600));
        assert_eq!(parse_duration("no numbers here"), None);
    }

    #[test]
    fn test_parse_reminder_before() {
        assert_eq!(parse_reminder_before("remind me 10 minutes before"), Some(600));
        assert_eq!(parse_reminder_before("1 hour before the meeting"), Some(3600));
        assert_eq!(parse_reminder_before("in 10 minutes"), None);
    }

    #[test]
    fn test_is_relative_expression() {
        assert!(is_relative_expression("in 10 minutes"));
        assert!(is_relative_expression("2 hours from now"));
        assert!(is_relative_expression("after 3 days"));
        assert!(!is_relative_expression("tomorrow at 3pm"));
        assert!(!is_relative_expression("on 2026-05-01"));
    }

    #[test]
    fn test_parse_datetime_tomorrow_afternoon() {
        let result = parse_datetime("tomorrow at 3pm", NOW, 0).unwrap();
        assert_eq!(result, ts(2026, 3, 3, 15, 0));
    }

    #[test]
    fn test_parse_datetime_iso() {
        assert_eq!(
            parse_datetime("on 2026-05-01 14:30", NOW, 0),
            Some(ts(2026, 5, 1, 14, 30))
        );
        // Date-only defaults to 09:00
        assert_eq!(
            parse_datetime("on 2026-05-01", NOW, 0),
            Some(ts(2026, 5, 1, 9, 0))
        );
    }

    #[test]
    fn test_parse_datetime_weekday_is_next_occurrence() {
        // NOW is Monday; "monday" must mean next Monday, not today
        let result = parse_datetime("monday at 9am", NOW, 0).unwrap();
        assert_eq!(result, ts(2026, 3, 9, 9, 0));

        let result = parse_datetime("friday at noon", NOW, 0).unwrap();
        assert_eq!(result, ts(2026, 3, 6, 12, 0));
    }

    #[test]
    fn test_parse_datetime_bare_past_time_rolls_forward() {
        // NOW is 10:00; "at 8am" already passed, so tomorrow
        let result = parse_datetime("call me at 8am", NOW, 0).unwrap();
        assert_eq!(result, ts(2026, 3, 3, 8, 0));

        // 11am is still ahead today
        let result = parse_datetime("call me at 11am", NOW, 0).unwrap();
        assert_eq!(result, ts(2026, 3, 2, 11, 0));
    }

    #[test]
    fn test_parse_datetime_timezone() {
        // 3pm local at UTC+7 is 08:00 UTC
        let result = parse_datetime("tomorrow at 3pm", NOW, 7).unwrap();
        assert_eq!(result, ts(2026, 3, 3, 8, 0));
    }

    #[test]
    fn test_parse_datetime_month_day_rolls_to_next_year() {
        // January already passed in March
        let result = parse_datetime("on january 15", NOW, 0).unwrap();
        assert_eq!(result, ts(2027, 1, 15, 9, 0));
    }

    #[test]
    fn test_parse_datetime_none() {
        assert_eq!(parse_datetime("hello there", NOW, 0), None);
    }

    #[test]
    fn test_reconcile_explicit_relative_overrides() {
        let mut entities = EntitySet {
            raw_text: "remind me in 2 minutes to call mom".to_string(),
            duration: Some(120),
            datetime: Some(ts(2026, 6, 1, 9, 0)), // LLM-style absolute guess
            ..Default::default()
        };
        reconcile_relative_time(&mut entities, NOW);
        assert_eq!(entities.datetime, Some(NOW + 120));
        assert!(entities.datetime_from_duration);
    }

    #[test]
    fn test_reconcile_past_datetime_recomputed() {
        let mut entities = EntitySet {
            raw_text: "ping me 10 minutes after lunch".to_string(),
            duration: Some(600),
            datetime: Some(NOW - 3600),
            ..Default::default()
        };
        reconcile_relative_time(&mut entities, NOW);
        assert_eq!(entities.datetime, Some(NOW + 600));
        assert!(entities.datetime_from_duration);
    }

    #[test]
    fn test_reconcile_future_absolute_untouched() {
        let mut entities = EntitySet {
            raw_text: "a 30 minute meeting tomorrow at 3pm".to_string(),
            duration: Some(1800),
            datetime: Some(ts(2026, 3, 3, 15, 0)),
            ..Default::default()
        };
        reconcile_relative_time(&mut entities, NOW);
        assert_eq!(entities.datetime, Some(ts(2026, 3, 3, 15, 0)));
        assert!(!entities.datetime_from_duration);
    }

    #[test]
    fn test_extract_entities_remind_in_two_minutes() {
        let entities = extract_entities("remind me in 2 minutes to call mom", NOW, 0);
        assert_eq!(entities.title.as_deref(), Some("call mom"));
        assert_eq!(entities.datetime, Some(NOW + 120));
        assert!(entities.datetime_from_duration);
    }

    #[test]
    fn test_extract_entities_quoted_title() {
        let entities = extract_entities("schedule \"Quarterly Review\" tomorrow at 10am", NOW, 0);
        assert_eq!(entities.title.as_deref(), Some("Quarterly Review"));
        assert_eq!(entities.datetime, Some(ts(2026, 3, 3, 10, 0)));
    }

    #[test]
    fn test_extract_entities_event_keyword_title() {
        let entities = extract_entities("schedule a team sync meeting tomorrow at 2pm", NOW, 0);
        assert_eq!(entities.title.as_deref(), Some("team sync meeting"));
    }

    #[test]
    fn test_extract_entities_reminder_before_not_duration() {
        let entities = extract_entities(
            "schedule a meeting tomorrow at 2pm and remind me 10 minutes before",
            NOW,
            0,
        );
        assert_eq!(entities.reminder_before, Some(600));
        assert_eq!(entities.duration, None);
        assert_eq!(entities.datetime, Some(ts(2026, 3, 3, 14, 0)));
    }

    #[test]
    fn test_extract_json_fenced() {
        assert_eq!(
            extract_json("```json\n{\"title\":\"x\"}\n```"),
            "{\"title\":\"x\"}"
        );
        assert_eq!(
            extract_json("Here you go: {\"title\":\"x\"} hope that helps"),
            "{\"title\":\"x\"}"
        );
    }

    #[test]
    fn test_parse_llm_entities_drops_bad_datetime() {
        let parsed = parse_llm_entities(
            r#"{"title": "dentist", "datetime": "sometime next week"}"#,
            0,
        );
        assert_eq!(parsed.title.as_deref(), Some("dentist"));
        assert_eq!(parsed.datetime, None);
    }

    #[test]
    fn test_parse_llm_entities_datetime() {
        let parsed = parse_llm_entities(r#"{"datetime": "2026-03-03 15:00"}"#, 0);
        assert_eq!(parsed.datetime, Some(ts(2026, 3, 3, 15, 0)));
    }

    #[test]
    fn test_merge_never_clobbers_relative_datetime() {
        let mut entities = extract_entities("remind me in 2 minutes to call mom", NOW, 0);
        let llm = LlmEntities {
            datetime: Some(ts(2026, 6, 1, 9, 0)),
            ..Default::default()
        };
        merge_llm_entities(&mut entities, llm, NOW);
        assert_eq!(entities.datetime, Some(NOW + 120));
    }

    #[test]
    fn test_merge_fills_missing_fields() {
        let mut entities = extract_entities("schedule a meeting tomorrow at 2pm", NOW, 0);
        let llm = LlmEntities {
            location: Some("conference room B".to_string()),
            ..Default::default()
        };
        merge_llm_entities(&mut entities, llm, NOW);
        assert_eq!(entities.location.as_deref(), Some("conference room B"));
        assert_eq!(entities.datetime, Some(ts(2026, 3, 3, 14, 0)));
    }

    #[test]
    fn test_missing_required_fields() {
        let empty = EntitySet::default();
        assert_eq!(
            missing_required_fields(Intent::CreateEvent, &empty),
            vec!["title", "datetime"]
        );
        assert_eq!(missing_required_fields(Intent::CreateTask, &empty), vec!["title"]);
        assert_eq!(missing_required_fields(Intent::CreateNote, &empty), vec!["content"]);
        assert!(missing_required_fields(Intent::GeneralQuery, &empty).is_empty());
    }
}
