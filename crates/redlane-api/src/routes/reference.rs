//! Static lookup tables served to clients.

use axum::routing::get;
use axum::{Json, Router};
use redlane_core::reference::RELATIONSHIP_TYPES;

use super::household_members::RelationshipTypeView;
use super::{data, Envelope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/reference/relationship-types",
        get(relationship_types),
    )
}

/// GET /v1/reference/relationship-types
#[utoipa::path(
    get,
    path = "/v1/reference/relationship-types",
    responses((status = 200, description = "Relationship types; body is {data: [RelationshipTypeView]}", body = Vec<RelationshipTypeView>)),
    security(("bearer_auth" = [])),
    tag = "reference"
)]
pub(crate) async fn relationship_types() -> Json<Envelope<Vec<RelationshipTypeView>>> {
    data(
        RELATIONSHIP_TYPES
            .iter()
            .map(RelationshipTypeView::from)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{app_as, caller, send};
    use axum::http::StatusCode;
    use redlane_core::Role;

    #[tokio::test]
    async fn lists_relationship_types() {
        let state = AppState::new();
        let (status, body) = send(
            app_as(router(), &state, caller(&state, Role::User)),
            "GET",
            "/v1/reference/relationship-types",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let types = body["data"].as_array().unwrap();
        assert_eq!(types.len(), 5);
        assert_eq!(types[0]["code"], "spouse");
    }
}
