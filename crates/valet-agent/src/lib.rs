/// Log with HH:MM:SS timestamp.
macro_rules! log {
    ($($arg:tt)*) => {{
        let secs = valet_core::types::now_unix();
        let h = (secs % 86400) / 3600;
        let m = (secs % 3600) / 60;
        let s = secs % 60;
        eprintln!("{h:02}:{m:02}:{s:02} valet: {}", format_args!($($arg)*));
    }};
}

pub mod executor;
pub mod memory;
pub mod nlp;
pub mod orchestrator;
pub mod planner;
pub mod tool;

#[cfg(test)]
pub(crate) mod test_util {
    // libsql's local `:memory:` databases are per-connection, and the
    // store opens a fresh connection per call, so tests need real
    // scratch files to share state across calls.
    pub(crate) fn temp_db_path(tag: &str) -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!("valet_agent_test_{tag}_{}_{n}.db", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }
}
