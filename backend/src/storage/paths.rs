//! Collection path layout.
//!
//! ```text
//! users/{guardian}
//! users/{guardian}/children_profiles/{child}
//! users/{guardian}/children_profiles/{child}/geofences/{id}
//! users/{guardian}/children_profiles/{child}/child_locations/{id}
//! users/{guardian}/children_profiles/{child}/bracelet_data/{id}
//! users/{guardian}/children_profiles/{child}/meltdown_events/{id}
//! users/{guardian}/user_graphs/{id}
//! geofence_transitions/{id}
//! auth_accounts/{email}
//! ```

pub const USERS: &str = "users";
pub const CHILDREN_PROFILES: &str = "children_profiles";
pub const GEOFENCES: &str = "geofences";
pub const CHILD_LOCATIONS: &str = "child_locations";
pub const BRACELET_DATA: &str = "bracelet_data";
pub const MELTDOWN_EVENTS: &str = "meltdown_events";
pub const USER_GRAPHS: &str = "user_graphs";
pub const GEOFENCE_TRANSITIONS: &str = "geofence_transitions";
pub const AUTH_ACCOUNTS: &str = "auth_accounts";

pub fn children_profiles(guardian_id: &str) -> String {
    format!("{}/{}/{}", USERS, guardian_id, CHILDREN_PROFILES)
}

fn child_collection(guardian_id: &str, child_id: &str, name: &str) -> String {
    format!("{}/{}/{}", children_profiles(guardian_id), child_id, name)
}

pub fn geofences(guardian_id: &str, child_id: &str) -> String {
    child_collection(guardian_id, child_id, GEOFENCES)
}

pub fn child_locations(guardian_id: &str, child_id: &str) -> String {
    child_collection(guardian_id, child_id, CHILD_LOCATIONS)
}

pub fn bracelet_data(guardian_id: &str, child_id: &str) -> String {
    child_collection(guardian_id, child_id, BRACELET_DATA)
}

pub fn meltdown_events(guardian_id: &str, child_id: &str) -> String {
    child_collection(guardian_id, child_id, MELTDOWN_EVENTS)
}

pub fn user_graphs(guardian_id: &str) -> String {
    format!("{}/{}/{}", USERS, guardian_id, USER_GRAPHS)
}
