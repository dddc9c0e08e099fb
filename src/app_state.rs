use std::sync::Arc;

use crate::{config::AppConfig, service::SurveyService};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub service: Arc<SurveyService>,
}
