use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::nlp::{self, EntitySet, Intent};

/// A parameter value in a plan step: either a literal, or a reference to
/// a key produced by an earlier step's output, resolved at execution
/// time. A plan stays tool-agnostic data until the executor binds it.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(Value),
    Reference(String),
}

impl ParamValue {
    pub fn lit(value: Value) -> Self {
        ParamValue::Literal(value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        ParamValue::Literal(Value::String(value.into()))
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub step: u32,
    pub action: String,
    pub tool: String,
    pub parameters: BTreeMap<String, ParamValue>,
}

/// An ordered step sequence, or a clarification request. Mutually
/// exclusive: a clarification plan always carries zero steps.
#[derive(Debug, Clone)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub requires_clarification: bool,
    pub clarifying_questions: Vec<String>,
}

impl Plan {
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self {
            steps,
            requires_clarification: false,
            clarifying_questions: Vec::new(),
        }
    }

    pub fn clarification(questions: Vec<String>) -> Self {
        Self {
            steps: Vec::new(),
            requires_clarification: true,
            clarifying_questions: questions,
        }
    }
}

/// Fixed field -> question map for clarification plans. Missing fields
/// with no mapping are silently skipped, never stringified raw.
fn clarifying_question(field: &str) -> Option<&'static str> {
    match field {
        "title" => Some("What would you like to call this?"),
        "datetime" => Some("When should this be?"),
        "duration" => Some("How long will it last?"),
        "location" => Some("Where will this take place?"),
        "reminder_before" => Some("How long before should I remind you?"),
        "content" => Some("What would you like to save?"),
        _ => None,
    }
}

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bhttps?://[^\s]+|\b[a-z0-9][a-z0-9-]*(?:\.[a-z0-9][a-z0-9-]*)+\b").unwrap()
});

static FILE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blink\s+(?:for|of|to)\s+(?:the\s+)?(.+?)\s*$").unwrap()
});

/// Extract a navigable URL from free text. Bare domains get an https
/// prefix.
fn extract_url(text: &str) -> Option<String> {
    let m = URL_RE.find(text)?;
    let raw = m.as_str().trim_end_matches(['.', ',', '!', '?']);
    if raw.to_lowercase().starts_with("http") {
        Some(raw.to_string())
    } else {
        Some(format!("https://{raw}"))
    }
}

fn wants_screenshot(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("screenshot") || lower.contains("capture")
}

/// Keyword priority for browser act steps: type/enter beat scroll beat
/// click; default click.
fn infer_action_type(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("type") || lower.contains("enter") {
        "type"
    } else if lower.contains("scroll") {
        "scroll"
    } else {
        "click"
    }
}

const DEFAULT_EVENT_DURATION: i64 = 3600;

pub struct Planner {
    clarify: bool,
}

impl Planner {
    pub fn new(clarify: bool) -> Self {
        Self { clarify }
    }

    /// Rule-based analysis: intent classification plus entity extraction
    /// with relative-time reconciliation. The LLM entity pass, when
    /// enabled, merges in afterwards via `nlp::merge_llm_entities`.
    pub fn analyze_message(&self, text: &str, now: i64, tz_offset: i32) -> (Intent, EntitySet) {
        let intent = nlp::classify_intent(text);
        let entities = nlp::extract_entities(text, now, tz_offset);
        (intent, entities)
    }

    /// Deterministic step construction per intent. Missing required
    /// fields short-circuit into a clarification plan when clarification
    /// is enabled; all questions are asked together in one plan.
    pub fn create_plan(&self, intent: Intent, entities: &EntitySet) -> Plan {
        let missing = nlp::missing_required_fields(intent, entities);
        if !missing.is_empty() && self.clarify {
            let questions: Vec<String> = missing
                .iter()
                .filter_map(|f| clarifying_question(f))
                .map(|q| q.to_string())
                .collect();
            return Plan::clarification(questions);
        }

        let steps = match intent {
            Intent::CreateEvent => self.event_steps(entities),
            Intent::CreateReminder => self.reminder_steps(entities),
            Intent::QueryEvents => vec![step(1, "list_events", "calendar", BTreeMap::new())],
            Intent::QueryReminders => vec![step(1, "list", "reminder", BTreeMap::new())],
            Intent::FileUpload => self.file_upload_steps(entities),
            Intent::FileList => self.file_list_steps(entities),
            Intent::FileLink => self.file_link_steps(entities),
            Intent::FileShare => self.file_share_steps(entities),
            Intent::BrowserNavigation => self.browser_navigation_steps(entities),
            Intent::BrowserScreenshot => self.browser_screenshot_steps(entities),
            Intent::BrowserExtract => self.browser_extract_steps(entities),
            Intent::BrowserInteraction => self.browser_interaction_steps(entities),
            // Conversational intents carry no steps; the response pass
            // answers from context.
            Intent::CreateNote
            | Intent::CreateTask
            | Intent::Cancel
            | Intent::Update
            | Intent::GeneralQuery => Vec::new(),
        };

        Plan::from_steps(steps)
    }

    fn event_steps(&self, entities: &EntitySet) -> Vec<Step> {
        let title = entities.title.clone().unwrap_or_default();
        let start = entities.datetime.unwrap_or_default();
        let end = start + entities.duration.unwrap_or(DEFAULT_EVENT_DURATION);

        let mut params = BTreeMap::new();
        params.insert("title".to_string(), ParamValue::text(title.clone()));
        params.insert("start_time".to_string(), ParamValue::lit(json!(start)));
        params.insert("end_time".to_string(), ParamValue::lit(json!(end)));
        if let Some(desc) = &entities.description {
            params.insert("description".to_string(), ParamValue::text(desc.clone()));
        }
        if let Some(loc) = &entities.location {
            params.insert("location".to_string(), ParamValue::text(loc.clone()));
        }

        let mut steps = vec![step(1, "create_event", "calendar", params)];

        // Linked reminder fires reminder_before ahead of the start
        if let Some(before) = entities.reminder_before {
            let mut reminder_params = BTreeMap::new();
            reminder_params.insert(
                "title".to_string(),
                ParamValue::text(format!("Reminder: {title}")),
            );
            reminder_params.insert(
                "remind_at".to_string(),
                ParamValue::lit(json!(start - before)),
            );
            steps.push(step(2, "create", "reminder", reminder_params));
        }

        steps
    }

    fn reminder_steps(&self, entities: &EntitySet) -> Vec<Step> {
        let mut params = BTreeMap::new();
        params.insert(
            "title".to_string(),
            ParamValue::text(entities.title.clone().unwrap_or_default()),
        );
        params.insert(
            "remind_at".to_string(),
            ParamValue::lit(json!(entities.datetime.unwrap_or_default())),
        );
        if let Some(desc) = &entities.description {
            params.insert("description".to_string(), ParamValue::text(desc.clone()));
        }
        vec![step(1, "create", "reminder", params)]
    }

    fn file_upload_steps(&self, entities: &EntitySet) -> Vec<Step> {
        let mut params = BTreeMap::new();
        if let Some(name) = &entities.file_name {
            params.insert("file_name".to_string(), ParamValue::text(name.clone()));
        }
        vec![step(1, "upload", "file", params)]
    }

    fn file_list_steps(&self, entities: &EntitySet) -> Vec<Step> {
        let mut params = BTreeMap::new();
        if let Some(name) = &entities.file_name {
            params.insert("query".to_string(), ParamValue::text(name.clone()));
        }
        vec![step(1, "list", "file", params)]
    }

    fn file_link_steps(&self, entities: &EntitySet) -> Vec<Step> {
        // Fall back to "link for/of X" when extraction found no filename
        let name = entities.file_name.clone().or_else(|| {
            FILE_LINK_RE
                .captures(&entities.raw_text)
                .map(|c| c[1].trim_end_matches(['.', '?', '!']).to_string())
        });

        let mut params = BTreeMap::new();
        if let Some(name) = name {
            params.insert("file_name".to_string(), ParamValue::text(name));
        }
        vec![step(1, "get_link", "file", params)]
    }

    fn file_share_steps(&self, entities: &EntitySet) -> Vec<Step> {
        let mut params = BTreeMap::new();
        if let Some(name) = &entities.file_name {
            params.insert("file_name".to_string(), ParamValue::text(name.clone()));
        }
        if let Some(with) = &entities.share_with {
            params.insert("share_with".to_string(), ParamValue::text(with.clone()));
        }
        params.insert(
            "access_level".to_string(),
            ParamValue::text(entities.access_level.clone().unwrap_or_else(|| "reader".to_string())),
        );
        vec![step(1, "share", "file", params)]
    }

    fn browser_navigation_steps(&self, entities: &EntitySet) -> Vec<Step> {
        let mut steps = vec![step(1, "create_session", "browser", BTreeMap::new())];
        let mut n = 1;

        if let Some(url) = extract_url(&entities.raw_text) {
            n += 1;
            steps.push(step(n, "navigate", "browser", session_params([("url", ParamValue::text(url))])));

            if wants_screenshot(&entities.raw_text) {
                n += 1;
                steps.push(step(n, "screenshot", "browser", session_params([])));
            }
        }

        steps
    }

    fn browser_screenshot_steps(&self, entities: &EntitySet) -> Vec<Step> {
        let mut steps = vec![step(1, "create_session", "browser", BTreeMap::new())];
        let mut n = 1;

        if let Some(url) = extract_url(&entities.raw_text) {
            n += 1;
            steps.push(step(n, "navigate", "browser", session_params([("url", ParamValue::text(url))])));
        }

        steps.push(step(n + 1, "screenshot", "browser", session_params([])));
        steps
    }

    fn browser_extract_steps(&self, entities: &EntitySet) -> Vec<Step> {
        let mut steps = vec![step(1, "create_session", "browser", BTreeMap::new())];
        let mut n = 1;

        if let Some(url) = extract_url(&entities.raw_text) {
            n += 1;
            steps.push(step(n, "navigate", "browser", session_params([("url", ParamValue::text(url))])));
        }

        steps.push(step(
            n + 1,
            "extract",
            "browser",
            session_params([("instruction", ParamValue::text(entities.raw_text.clone()))]),
        ));
        steps
    }

    fn browser_interaction_steps(&self, entities: &EntitySet) -> Vec<Step> {
        let action_type = infer_action_type(&entities.raw_text);
        vec![
            step(1, "create_session", "browser", BTreeMap::new()),
            step(
                2,
                "act",
                "browser",
                session_params([
                    ("action_type", ParamValue::text(action_type)),
                    ("instruction", ParamValue::text(entities.raw_text.clone())),
                ]),
            ),
        ]
    }
}

fn step(n: u32, action: &str, tool: &str, parameters: BTreeMap<String, ParamValue>) -> Step {
    Step {
        step: n,
        action: action.to_string(),
        tool: tool.to_string(),
        parameters,
    }
}

/// Parameter map carrying the session reference from step 1, plus any
/// step-specific entries.
fn session_params<const N: usize>(extra: [(&str, ParamValue); N]) -> BTreeMap<String, ParamValue> {
    let mut params = BTreeMap::new();
    params.insert(
        "session_id".to_string(),
        ParamValue::Reference("session_id".to_string()),
    );
    for (key, value) in extra {
        params.insert(key.to_string(), value);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1772445600; // 2026-03-02 10:00:00 UTC, a Monday

    fn entities(text: &str) -> EntitySet {
        nlp::extract_entities(text, NOW, 0)
    }

    #[test]
    fn test_schedule_a_meeting_asks_both_questions() {
        let planner = Planner::new(true);
        let (intent, entities) = planner.analyze_message("schedule a meeting", NOW, 0);
        assert_eq!(intent, Intent::CreateEvent);

        let plan = planner.create_plan(intent, &entities);
        assert!(plan.requires_clarification);
        assert!(plan.steps.is_empty());
        assert_eq!(
            plan.clarifying_questions,
            vec![
                "What would you like to call this?".to_string(),
                "When should this be?".to_string(),
            ]
        );
    }

    #[test]
    fn test_clarification_disabled_builds_steps_anyway() {
        let planner = Planner::new(false);
        let plan = planner.create_plan(Intent::CreateEvent, &entities("schedule a meeting"));
        assert!(!plan.requires_clarification);
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn test_create_reminder_plan() {
        let planner = Planner::new(true);
        let e = entities("remind me in 2 minutes to call mom");
        let plan = planner.create_plan(Intent::CreateReminder, &e);

        assert!(!plan.requires_clarification);
        assert_eq!(plan.steps.len(), 1);
        let s = &plan.steps[0];
        assert_eq!(s.tool, "reminder");
        assert_eq!(s.action, "create");
        assert_eq!(
            s.parameters.get("remind_at"),
            Some(&ParamValue::lit(json!(NOW + 120)))
        );
        assert_eq!(
            s.parameters.get("title"),
            Some(&ParamValue::text("call mom"))
        );
    }

    #[test]
    fn test_event_with_reminder_before_gets_linked_step() {
        let planner = Planner::new(true);
        let e = entities("schedule a team sync meeting tomorrow at 2pm and remind me 10 minutes before");
        let plan = planner.create_plan(Intent::CreateEvent, &e);

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].tool, "calendar");
        assert_eq!(plan.steps[1].tool, "reminder");

        let start = match plan.steps[0].parameters.get("start_time").unwrap() {
            ParamValue::Literal(v) => v.as_i64().unwrap(),
            other => panic!("expected literal, got {other:?}"),
        };
        let remind_at = match plan.steps[1].parameters.get("remind_at").unwrap() {
            ParamValue::Literal(v) => v.as_i64().unwrap(),
            other => panic!("expected literal, got {other:?}"),
        };
        assert_eq!(remind_at, start - 600);
    }

    #[test]
    fn test_browser_navigation_with_bare_domain() {
        let planner = Planner::new(true);
        let e = entities("go to rust-lang.org");
        let plan = planner.create_plan(Intent::BrowserNavigation, &e);

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].action, "create_session");
        assert_eq!(plan.steps[1].action, "navigate");
        assert_eq!(
            plan.steps[1].parameters.get("url"),
            Some(&ParamValue::text("https://rust-lang.org"))
        );
        assert_eq!(
            plan.steps[1].parameters.get("session_id"),
            Some(&ParamValue::Reference("session_id".to_string()))
        );
    }

    #[test]
    fn test_browser_navigation_without_url_stops_at_session() {
        let planner = Planner::new(true);
        let plan = planner.create_plan(Intent::BrowserNavigation, &entities("open the browser"));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].action, "create_session");
    }

    #[test]
    fn test_browser_navigation_with_screenshot_keyword() {
        let planner = Planner::new(true);
        let e = entities("go to example.com and take a screenshot");
        let plan = planner.create_plan(Intent::BrowserNavigation, &e);
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[2].action, "screenshot");
    }

    #[test]
    fn test_browser_interaction_action_type_priority() {
        let planner = Planner::new(true);

        let plan = planner.create_plan(
            Intent::BrowserInteraction,
            &entities("type hello into the search box"),
        );
        assert_eq!(
            plan.steps[1].parameters.get("action_type"),
            Some(&ParamValue::text("type"))
        );

        let plan = planner.create_plan(Intent::BrowserInteraction, &entities("scroll down a bit"));
        assert_eq!(
            plan.steps[1].parameters.get("action_type"),
            Some(&ParamValue::text("scroll"))
        );

        let plan = planner.create_plan(
            Intent::BrowserInteraction,
            &entities("click the submit button"),
        );
        assert_eq!(
            plan.steps[1].parameters.get("action_type"),
            Some(&ParamValue::text("click"))
        );
    }

    #[test]
    fn test_file_link_regex_fallback() {
        let planner = Planner::new(true);
        let plan = planner.create_plan(Intent::FileLink, &entities("get me the link for the quarterly report"));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].action, "get_link");
        assert_eq!(
            plan.steps[0].parameters.get("file_name"),
            Some(&ParamValue::text("quarterly report"))
        );
    }

    #[test]
    fn test_query_plans_are_single_read_steps() {
        let planner = Planner::new(true);

        let plan = planner.create_plan(Intent::QueryReminders, &entities("show my reminders"));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool, "reminder");
        assert_eq!(plan.steps[0].action, "list");

        let plan = planner.create_plan(Intent::QueryEvents, &entities("what's on my calendar"));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool, "calendar");
        assert_eq!(plan.steps[0].action, "list_events");
    }

    #[test]
    fn test_general_query_has_no_steps() {
        let planner = Planner::new(true);
        let plan = planner.create_plan(Intent::GeneralQuery, &entities("how are you"));
        assert!(!plan.requires_clarification);
        assert!(plan.steps.is_empty());
    }
}
