use crate::{ai::ModelRegistry, config::Settings};
use history_db::HistoryDb;
use std::sync::Arc;

/// Request context, shared by every handler.
///
/// Clone it, never rebuild it: every field is a reference to the same
/// models, pool and settings.
#[derive(Clone, Debug)]
pub struct Ctx {
    pub registry: Arc<ModelRegistry>,
    pub history: HistoryDb,
    pub settings: Arc<Settings>,
}

impl Ctx {
    pub fn new(registry: ModelRegistry, history: HistoryDb, settings: Settings) -> Self {
        Self {
            registry: Arc::new(registry),
            history,
            settings: Arc::new(settings),
        }
    }
}
