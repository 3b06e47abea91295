use shared::{
    AssociateChildRequest, ChildListResponse, ChildProfile, ChildResponse, ChildThresholds, Role, UpdateChildRequest, User,
};
use tracing::{info, warn};

use crate::domain::auth_service::require_guardian;
use crate::domain::errors::{GuardianError, Result};
use crate::storage::repositories::{ChildProfileRepository, UserRepository};
use crate::storage::TypedSubscription;

/// Service for the guardian/child association and child profiles
#[derive(Clone)]
pub struct ChildService {
    users: UserRepository,
    profiles: ChildProfileRepository,
}

impl ChildService {
    pub fn new(users: UserRepository, profiles: ChildProfileRepository) -> Self {
        Self { users, profiles }
    }

    /// Link an existing child account to the guardian and create its profile
    pub async fn associate_child(&self, guardian: &User, request: AssociateChildRequest) -> Result<ChildResponse> {
        require_guardian(guardian)?;
        info!("Associating child {} with guardian {}", request.child_id, guardian.user_id);

        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(GuardianError::Validation("child name cannot be empty".to_string()));
        }

        let child = self
            .users
            .get_user(&request.child_id)
            .await?
            .ok_or_else(|| GuardianError::NotFound(format!("child account {}", request.child_id)))?;
        if child.role != Role::Child {
            return Err(GuardianError::Validation(format!("account {} is not a child account", child.user_id)));
        }
        if let Some(existing) = child.guardian_id.as_deref().filter(|g| *g != guardian.user_id) {
            warn!("Child {} already belongs to guardian {}", child.user_id, existing);
            return Err(GuardianError::Conflict(format!("child {} is already associated", child.user_id)));
        }

        let profile = ChildProfile {
            child_id: child.user_id.clone(),
            name,
            dob: request.dob,
            avatar_url: None,
            thresholds: ChildThresholds::default(),
        };
        self.profiles.store_profile(&guardian.user_id, &profile).await?;
        self.users.add_associated_child(&guardian.user_id, &child.user_id).await?;
        self.users.set_guardian(&child.user_id, Some(&guardian.user_id)).await?;

        info!("Associated child {} ({})", profile.name, profile.child_id);
        Ok(ChildResponse {
            success_message: format!("{} is now linked to your account", profile.name),
            child: profile,
        })
    }

    pub async fn dissociate_child(&self, guardian: &User, child_id: &str) -> Result<()> {
        require_guardian(guardian)?;
        info!("Dissociating child {} from guardian {}", child_id, guardian.user_id);

        if !self.profiles.delete_profile(&guardian.user_id, child_id).await? {
            return Err(GuardianError::NotFound(format!("child {}", child_id)));
        }
        self.users.remove_associated_child(&guardian.user_id, child_id).await?;
        if let Err(e) = self.users.set_guardian(child_id, None).await {
            warn!("Could not clear guardian on child account {}: {}", child_id, e);
        }
        Ok(())
    }

    /// Profile of a child the guardian owns; the ownership check for every
    /// guardian-side child operation
    pub async fn owned_profile(&self, guardian: &User, child_id: &str) -> Result<ChildProfile> {
        require_guardian(guardian)?;
        self.profiles
            .get_profile(&guardian.user_id, child_id)
            .await?
            .ok_or_else(|| GuardianError::NotFound(format!("child {}", child_id)))
    }

    pub async fn list_children(&self, guardian: &User) -> Result<ChildListResponse> {
        require_guardian(guardian)?;
        let children = self.profiles.list_profiles(&guardian.user_id).await?;
        info!("Found {} children for guardian {}", children.len(), guardian.user_id);
        Ok(ChildListResponse { children })
    }

    pub async fn update_child_profile(
        &self,
        guardian: &User,
        child_id: &str,
        request: UpdateChildRequest,
    ) -> Result<ChildResponse> {
        let mut profile = self.owned_profile(guardian, child_id).await?;

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(GuardianError::Validation("child name cannot be empty".to_string()));
            }
            profile.name = name;
        }
        if request.dob.is_some() {
            profile.dob = request.dob;
        }
        if let Some(avatar) = request.avatar_url {
            profile.avatar_url = Some(avatar).filter(|a| !a.trim().is_empty());
        }

        self.profiles.store_profile(&guardian.user_id, &profile).await?;
        info!("Updated child profile {}", profile.child_id);
        Ok(ChildResponse {
            success_message: "Profile updated".to_string(),
            child: profile,
        })
    }

    pub async fn update_thresholds(
        &self,
        guardian: &User,
        child_id: &str,
        thresholds: ChildThresholds,
    ) -> Result<ChildResponse> {
        let mut profile = self.owned_profile(guardian, child_id).await?;
        validate_thresholds(&thresholds)?;

        self.profiles.update_thresholds(&guardian.user_id, child_id, &thresholds).await?;
        profile.thresholds = thresholds;
        info!(
            "Updated thresholds for child {}: severity >= {}",
            child_id, profile.thresholds.meltdown_severity_threshold
        );
        Ok(ChildResponse {
            success_message: "Thresholds updated".to_string(),
            child: profile,
        })
    }

    pub async fn stream_children(&self, guardian: &User) -> Result<TypedSubscription<ChildProfile>> {
        require_guardian(guardian)?;
        Ok(self.profiles.listen_profiles(&guardian.user_id))
    }

    /// Every (guardian id, child profile) pair in the store
    pub async fn associations(&self) -> Result<Vec<(String, ChildProfile)>> {
        let mut pairs = Vec::new();
        for guardian in self.users.list_guardians().await? {
            for profile in self.profiles.list_profiles(&guardian.user_id).await? {
                pairs.push((guardian.user_id.clone(), profile));
            }
        }
        Ok(pairs)
    }

    /// Guardian id of a child account, required for child-side writes
    pub fn guardian_of(child: &User) -> Result<String> {
        child.guardian_id.clone().ok_or_else(|| {
            GuardianError::PermissionDenied(format!("child {} is not associated with a guardian", child.user_id))
        })
    }

    /// Profile for a child account as seen from its own session
    pub async fn profile_for_child(&self, child: &User) -> Result<(String, ChildProfile)> {
        let guardian_id = Self::guardian_of(child)?;
        let profile = self
            .profiles
            .get_profile(&guardian_id, &child.user_id)
            .await?
            .ok_or_else(|| GuardianError::NotFound(format!("child profile {}", child.user_id)))?;
        Ok((guardian_id, profile))
    }
}

fn validate_thresholds(thresholds: &ChildThresholds) -> Result<()> {
    if !(1..=10).contains(&thresholds.meltdown_severity_threshold) {
        return Err(GuardianError::Validation(
            "meltdown severity threshold must be between 1 and 10".to_string(),
        ));
    }
    if thresholds.alert_vibration_pattern.trim().is_empty() || thresholds.alert_sound.trim().is_empty() {
        return Err(GuardianError::Validation("alert pattern and sound cannot be empty".to_string()));
    }
    Ok(())
}
