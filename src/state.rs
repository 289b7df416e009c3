use crate::clock::Clock;
use crate::config::Config;
use crate::db::Store;
use crate::mail::Notifier;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<Notifier>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}
