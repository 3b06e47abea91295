use chrono::Utc;
use shared::{CreateUserGraphRequest, User, UserGraph};
use tracing::info;

use crate::domain::auth_service::require_guardian;
use crate::domain::child_service::ChildService;
use crate::domain::errors::{GuardianError, Result};
use crate::storage::repositories::GraphRepository;
use crate::storage::TypedSubscription;

/// Saved chart references for a guardian
#[derive(Clone)]
pub struct GraphService {
    children: ChildService,
    graphs: GraphRepository,
}

impl GraphService {
    pub fn new(children: ChildService, graphs: GraphRepository) -> Self {
        Self { children, graphs }
    }

    pub async fn save_graph(&self, guardian: &User, request: CreateUserGraphRequest) -> Result<UserGraph> {
        self.children.owned_profile(guardian, &request.child_id).await?;

        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(GuardianError::Validation("graph title cannot be empty".to_string()));
        }
        if request.end_date < request.start_date {
            return Err(GuardianError::Validation("graph end date is before its start date".to_string()));
        }

        let mut graph = UserGraph {
            id: String::new(),
            user_id: guardian.user_id.clone(),
            child_id: request.child_id,
            title,
            start_date: request.start_date,
            end_date: request.end_date,
            image_url: request.image_url.filter(|u| !u.trim().is_empty()),
            generated_at: Utc::now(),
        };
        graph.id = self.graphs.add_graph(&graph).await?;
        info!("Saved graph {} ({}) for child {}", graph.id, graph.title, graph.child_id);
        Ok(graph)
    }

    /// Newest first
    pub async fn list_graphs(&self, guardian: &User) -> Result<Vec<UserGraph>> {
        require_guardian(guardian)?;
        Ok(self.graphs.list_graphs(&guardian.user_id).await?)
    }

    pub async fn delete_graph(&self, guardian: &User, graph_id: &str) -> Result<()> {
        require_guardian(guardian)?;
        if !self.graphs.delete_graph(&guardian.user_id, graph_id).await? {
            return Err(GuardianError::NotFound(format!("graph {}", graph_id)));
        }
        info!("Deleted graph {}", graph_id);
        Ok(())
    }

    pub fn stream_graphs(&self, guardian: &User) -> Result<TypedSubscription<UserGraph>> {
        require_guardian(guardian)?;
        Ok(self.graphs.listen_graphs(&guardian.user_id))
    }
}
