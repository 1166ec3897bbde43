use std::sync::Arc;

use sa_domain::config::Config;

use crate::hub::Hub;
use crate::orchestrator_client::OrchestratorClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub orchestrator_client: Arc<OrchestratorClient>,
}
