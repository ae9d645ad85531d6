use std::sync::Arc;

use valet_core::config::AgentConfig;
use valet_core::error::Result;
use valet_core::types::{now_unix, ChatMessage, ChatRequest};
use valet_llm::dispatch::LlmDispatch;
use valet_store::AssistantStore;

use crate::executor::{ExecutionResult, Executor};
use crate::memory::ShortTermMemory;
use crate::nlp::{self, Intent};
use crate::planner::{Plan, Planner};
use crate::tool::ToolRegistry;

const FALLBACK_REPLY: &str =
    "I apologize, but I encountered an error processing your request. Could you please try again?";

/// The message pipeline: remember, analyze, plan, execute, respond.
/// Every inbound message gets a reply string; failures anywhere inside
/// degrade to an apology instead of surfacing an error to the chat.
pub struct Orchestrator {
    store: Arc<AssistantStore>,
    planner: Planner,
    executor: Executor,
    memory: ShortTermMemory,
    llm: Option<LlmDispatch>,
    agent: AgentConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<AssistantStore>,
        registry: Arc<ToolRegistry>,
        llm: Option<LlmDispatch>,
        agent: AgentConfig,
    ) -> Self {
        Self {
            store,
            planner: Planner::new(agent.clarifying_questions),
            executor: Executor::new(registry, agent.max_step_retries),
            memory: ShortTermMemory::new(agent.short_term_memory_size),
            llm,
            agent,
        }
    }

    pub async fn process_message(&self, chat_id: i64, text: &str) -> String {
        match self.handle(chat_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                log!("[orchestrator] message handling failed: {e}");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn handle(&self, chat_id: i64, text: &str) -> Result<String> {
        self.memory.remember(chat_id, "user", text);
        self.store
            .save_conversation(chat_id, "user", text, None)
            .await?;

        let now = now_unix();
        let (intent, mut entities) =
            self.planner
                .analyze_message(text, now, self.agent.timezone_offset);
        log!("[orchestrator] intent {} for chat {chat_id}", intent.as_str());

        // Second pass: let the LLM fill fields the rules missed. The
        // rule pass always wins on relative-time datetimes.
        if self.agent.clarifying_questions {
            if let Some(llm) = &self.llm {
                if let Some(parsed) = self.llm_entity_pass(llm, text).await {
                    nlp::merge_llm_entities(&mut entities, parsed, now);
                }
            }
        }

        if intent == Intent::CreateEvent && entities.reminder_before.is_none() {
            entities.reminder_before = self.default_reminder_before(chat_id).await;
        }

        let plan = self.planner.create_plan(intent, &entities);

        if plan.requires_clarification {
            let reply = format_clarification(&plan);
            self.finish(chat_id, intent, &reply).await?;
            return Ok(reply);
        }

        let reply = if plan.steps.is_empty() {
            self.conversational_reply(chat_id, text).await
        } else {
            let result = self.executor.execute_plan(&plan, chat_id).await;
            self.learn_preferences(chat_id, intent, &entities).await;
            self.narrate(chat_id, text, &result).await
        };

        self.finish(chat_id, intent, &reply).await?;
        Ok(reply)
    }

    async fn finish(&self, chat_id: i64, intent: Intent, reply: &str) -> Result<()> {
        self.memory.remember(chat_id, "assistant", reply);
        self.store
            .save_conversation(chat_id, "assistant", reply, Some(intent.as_str()))
            .await?;
        Ok(())
    }

    /// Ask the LLM for entities as strict JSON. Any failure in the call
    /// or the parse simply skips the pass.
    async fn llm_entity_pass(&self, llm: &LlmDispatch, text: &str) -> Option<nlp::LlmEntities> {
        let prompt = format!(
            "Extract entities from this message as JSON with keys: title, datetime \
             (YYYY-MM-DD HH:MM or null), duration_minutes, reminder_before_minutes, \
             location, description, file_name, share_with, access_level. \
             Use null for anything not present. Reply with only the JSON object.\n\n\
             Message: {text}"
        );

        let request = ChatRequest {
            messages: vec![ChatMessage::text("user", prompt)],
            max_tokens: Some(300),
            temperature: Some(0.0),
        };

        match llm.chat(request).await {
            Ok(response) => Some(nlp::parse_llm_entities(
                &response.content,
                self.agent.timezone_offset,
            )),
            Err(e) => {
                log!("[orchestrator] entity pass skipped: {e}");
                None
            }
        }
    }

    /// Turn an execution summary into a natural reply. Without an LLM,
    /// or when the call fails, the raw summary goes out as is.
    async fn narrate(&self, chat_id: i64, text: &str, result: &ExecutionResult) -> String {
        let Some(llm) = &self.llm else {
            return result.message.clone();
        };

        let mut messages = self.memory.recent(chat_id, self.agent.context_window);
        messages.push(ChatMessage::text(
            "user",
            format!(
                "The user said: \"{text}\"\n\nActions taken:\n{}\n\n\
                 Reply to the user in one or two short sentences confirming what \
                 happened. Keep any times and names exactly as given.",
                result.message
            ),
        ));

        let request = ChatRequest {
            messages,
            max_tokens: Some(200),
            temperature: Some(0.7),
        };

        match llm.chat(request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            _ => result.message.clone(),
        }
    }

    /// Plain conversation: no tool steps, just context and the LLM.
    async fn conversational_reply(&self, chat_id: i64, text: &str) -> String {
        let Some(llm) = &self.llm else {
            return "I can set reminders, schedule events, search the web, and manage \
                    your files. What would you like to do?"
                .to_string();
        };

        let mut messages = vec![ChatMessage::text(
            "system",
            "You are a concise personal assistant reachable over chat. \
             Answer briefly and helpfully.",
        )];
        messages.extend(self.memory.recent(chat_id, self.agent.context_window));
        messages.push(ChatMessage::text("user", text));

        let request = ChatRequest {
            messages,
            max_tokens: Some(400),
            temperature: Some(0.7),
        };

        match llm.chat(request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            _ => "I'm not sure how to help with that yet.".to_string(),
        }
    }

    /// Previously learned default lead time, if any.
    async fn default_reminder_before(&self, chat_id: i64) -> Option<i64> {
        let pref = self
            .store
            .get_preference(chat_id, "default_reminder_before")
            .await
            .ok()??;
        pref.value.parse::<i64>().ok()
    }

    /// A reminder offset stated alongside an event is worth remembering
    /// as the user's default lead time.
    async fn learn_preferences(&self, chat_id: i64, intent: Intent, entities: &nlp::EntitySet) {
        if intent != Intent::CreateReminder && intent != Intent::CreateEvent {
            return;
        }
        let Some(before) = entities.reminder_before else {
            return;
        };

        if let Err(e) = self
            .store
            .save_preference(chat_id, "default_reminder_before", &before.to_string(), 0.8)
            .await
        {
            log!("[orchestrator] preference save failed: {e}");
        }
    }
}

fn format_clarification(plan: &Plan) -> String {
    match plan.clarifying_questions.as_slice() {
        [] => "Could you tell me a bit more about what you need?".to_string(),
        [single] => single.clone(),
        many => {
            let mut out = String::from("I need a bit more information:");
            for (i, q) in many.iter().enumerate() {
                out.push_str(&format!("\n{}. {q}", i + 1));
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn orchestrator_without_llm(clarify: bool) -> (Orchestrator, Arc<AssistantStore>) {
        let store = Arc::new(
            AssistantStore::new(&crate::test_util::temp_db_path("orchestrator"))
                .await
                .unwrap(),
        );
        let agent = AgentConfig {
            clarifying_questions: clarify,
            ..AgentConfig::default()
        };
        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(ToolRegistry::new()),
            None,
            agent,
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_incomplete_event_request_asks_questions() {
        let (orchestrator, _) = orchestrator_without_llm(true).await;
        let reply = orchestrator.process_message(1, "schedule a meeting").await;
        assert!(reply.starts_with("I need a bit more information:"));
        assert!(reply.contains("1. What would you like to call this?"));
        assert!(reply.contains("2. When should this be?"));
    }

    #[tokio::test]
    async fn test_missing_tool_degrades_to_error_summary() {
        let (orchestrator, _) = orchestrator_without_llm(true).await;
        let reply = orchestrator
            .process_message(1, "remind me in 2 minutes to call mom")
            .await;
        assert!(reply.contains("Tool not registered: reminder"));
    }

    #[tokio::test]
    async fn test_conversation_is_persisted_with_intent() {
        let (orchestrator, store) = orchestrator_without_llm(true).await;
        orchestrator.process_message(9, "hello there").await;

        let rows = store.recent_conversations(9, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].role, "user");
        assert_eq!(rows[0].intent, None);
        assert_eq!(rows[1].role, "assistant");
        assert_eq!(rows[1].intent.as_deref(), Some("general_query"));
    }

    #[tokio::test]
    async fn test_reminder_offset_is_learned_and_reapplied() {
        let (orchestrator, _) = orchestrator_without_llm(true).await;

        let mut entities = nlp::EntitySet::default();
        entities.reminder_before = Some(600);
        orchestrator
            .learn_preferences(3, Intent::CreateReminder, &entities)
            .await;

        assert_eq!(orchestrator.default_reminder_before(3).await, Some(600));
        assert_eq!(orchestrator.default_reminder_before(4).await, None);
    }

    #[test]
    fn test_format_clarification_single_is_bare() {
        let plan = Plan::clarification(vec!["When should this be?".to_string()]);
        assert_eq!(format_clarification(&plan), "When should this be?");
    }
}
