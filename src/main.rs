use std::path::Path;
use std::sync::Arc;

use valet_agent::orchestrator::Orchestrator;
use valet_agent::tool::browser::BrowserTool;
use valet_agent::tool::calendar::CalendarTool;
use valet_agent::tool::file::FileTool;
use valet_agent::tool::reminder::ReminderTool;
use valet_agent::tool::search::SearchTool;
use valet_agent::tool::ToolRegistry;
use valet_core::config::Config;
use valet_core::error::ValetError;
use valet_integrations::brave::BraveSearch;
use valet_integrations::browserbase::BrowserbaseClient;
use valet_integrations::google::calendar::CalendarClient;
use valet_integrations::google::drive::DriveClient;
use valet_integrations::google::oauth::GoogleAuth;
use valet_integrations::{CalendarBackend, FileBackend};
use valet_llm::dispatch::LlmDispatch;
use valet_scheduler::Scheduler;
use valet_store::AssistantStore;
use valet_telegram::TelegramBot;

#[tokio::main]
async fn main() {
    let config_path = std::env::var("VALET_CONFIG").unwrap_or_else(|_| "valet.toml".to_string());

    let config = Config::load(Path::new(&config_path)).unwrap_or_else(|e| {
        eprintln!("fatal: failed to load config: {e}");
        std::process::exit(1);
    });

    if config.telegram.token.is_empty() {
        eprintln!("fatal: VALET_TELEGRAM_TOKEN is not set");
        std::process::exit(1);
    }

    eprintln!("valet: starting...");

    let store = Arc::new(open_store(&config).await.unwrap_or_else(|e| {
        eprintln!("fatal: failed to open store: {e}");
        std::process::exit(1);
    }));

    let scheduler = Arc::new(create_scheduler(&config, store.clone()).await.unwrap_or_else(|e| {
        eprintln!("fatal: failed to initialize scheduler: {e}");
        std::process::exit(1);
    }));

    let llm = build_llm(&config);
    let registry = Arc::new(build_registry(&config, store.clone(), scheduler.clone()));

    let orchestrator = Orchestrator::new(store, registry, llm, config.agent.clone());

    let bot = TelegramBot::new(config.telegram.token.clone(), config.telegram.allowed_user_id);
    let _ = bot
        .set_my_commands(&[("start", "Say hello"), ("help", "What I can do")])
        .await;

    // Separate bot instance for reminder delivery
    let notifier = Arc::new(TelegramBot::new(
        config.telegram.token.clone(),
        config.telegram.allowed_user_id,
    ));

    tokio::select! {
        _ = scheduler.run(notifier) => {
            eprintln!("fatal: scheduler loop exited");
            std::process::exit(1);
        }
        _ = poll_loop(&bot, &orchestrator) => {
            eprintln!("fatal: update loop exited");
            std::process::exit(1);
        }
    }
}

async fn open_store(config: &Config) -> valet_core::error::Result<AssistantStore> {
    if !config.database.turso_url.is_empty() {
        AssistantStore::new_remote(&config.database.turso_url, &config.database.turso_token).await
    } else {
        AssistantStore::new(&config.database.path).await
    }
}

/// The scheduler gets its own DB handle, separate from the store's.
async fn create_scheduler(
    config: &Config,
    store: Arc<AssistantStore>,
) -> valet_core::error::Result<Scheduler> {
    let db = if !config.database.turso_url.is_empty() {
        libsql::Builder::new_remote(
            config.database.turso_url.clone(),
            config.database.turso_token.clone(),
        )
        .build()
        .await
        .map_err(|e| ValetError::Database(e.to_string()))?
    } else {
        libsql::Builder::new_local(&config.database.path)
            .build()
            .await
            .map_err(|e| ValetError::Database(e.to_string()))?
    };

    let scheduler = Scheduler::new(
        db,
        store,
        config.scheduler.tick_seconds,
        config.agent.timezone_offset,
    );
    scheduler.init().await?;
    Ok(scheduler)
}

fn build_llm(config: &Config) -> Option<LlmDispatch> {
    if config.llm.api_key.is_empty() {
        eprintln!("valet: no LLM api key, running rule-based only");
        return None;
    }

    match LlmDispatch::from_config(
        &config.llm.provider,
        &config.llm.model,
        &config.llm.api_key,
        &config.llm.base_url,
    ) {
        Ok(llm) => {
            eprintln!("valet: llm provider {}", llm.provider_name());
            Some(llm)
        }
        Err(e) => {
            eprintln!("valet: llm disabled: {e}");
            None
        }
    }
}

fn build_registry(
    config: &Config,
    store: Arc<AssistantStore>,
    scheduler: Arc<Scheduler>,
) -> ToolRegistry {
    let tz = config.agent.timezone_offset;
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(ReminderTool::new(store.clone(), scheduler, tz)));

    let (calendar_backend, file_backend) = google_backends(config);
    registry.register(Arc::new(CalendarTool::new(store, calendar_backend, tz)));
    registry.register(Arc::new(FileTool::new(file_backend)));

    let brave = if config.search.brave_api_key.is_empty() {
        None
    } else {
        Some(BraveSearch::new(config.search.brave_api_key.clone()))
    };
    registry.register(Arc::new(SearchTool::new(brave, 5)));

    let browserbase = if config.browser.browserbase_api_key.is_empty() {
        None
    } else {
        Some(BrowserbaseClient::new(
            config.browser.browserbase_api_key.clone(),
            config.browser.project_id.clone(),
        ))
    };
    registry.register(Arc::new(BrowserTool::new(browserbase)));

    registry
}

fn google_backends(
    config: &Config,
) -> (
    Option<Arc<dyn CalendarBackend>>,
    Option<Arc<dyn FileBackend>>,
) {
    let auth = Arc::new(GoogleAuth::new(
        config.google.client_id.clone(),
        config.google.client_secret.clone(),
        config.google.refresh_token.clone(),
    ));
    if !auth.is_configured() {
        return (None, None);
    }

    (
        Some(Arc::new(CalendarClient::new(auth.clone()))),
        Some(Arc::new(DriveClient::new(auth))),
    )
}

async fn poll_loop(bot: &TelegramBot, orchestrator: &Orchestrator) {
    let mut offset = 0i64;

    loop {
        let updates = match bot.get_updates(offset, 30).await {
            Ok(u) => u,
            Err(e) => {
                eprintln!("valet: getUpdates failed: {e}");
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);

            let Some(message) = update.message else { continue };
            let Some(text) = message.text else { continue };
            let Some(from) = message.from else { continue };

            if !bot.is_authorized(from.id) {
                eprintln!("valet: ignoring message from unauthorized user {}", from.id);
                continue;
            }

            let chat_id = message.chat.id;
            let _ = bot.send_typing(chat_id).await;

            let reply = orchestrator.process_message(chat_id, &text).await;
            if let Err(e) = bot.send_message(chat_id, &reply).await {
                eprintln!("valet: send failed: {e}");
            }
        }
    }
}
