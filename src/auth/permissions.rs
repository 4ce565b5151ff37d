//! Permission checking and access control.
//!
//! Route-level authorization is expressed as a typed extractor:
//!
//! ```ignore
//! async fn handler(
//!     current_user: RequiresPermission<resource::Users, operation::UpdateAll>,
//! ) -> Result<...> { ... }
//! ```
//!
//! Extraction fails with 401 when no valid session is present and 403 when
//! the session user lacks the permission. `*Own` operations grant to any
//! authenticated user; the handler is responsible for verifying ownership of
//! the specific record (the extractor cannot see path parameters).

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;
use std::ops::Deref;

use crate::{
    AppState,
    api::models::users::CurrentUser,
    errors::Error,
    types::{Operation, Permission, Resource, UserId},
};

/// Marker types naming a [`Resource`] at the type level.
pub mod resource {
    use crate::types::Resource;

    pub trait ResourceMarker {
        const RESOURCE: Resource;
    }

    pub struct Users;
    pub struct Media;

    impl ResourceMarker for Users {
        const RESOURCE: Resource = Resource::Users;
    }
    impl ResourceMarker for Media {
        const RESOURCE: Resource = Resource::Media;
    }
}

/// Marker types naming an [`Operation`] at the type level.
pub mod operation {
    use crate::types::Operation;

    pub trait OperationMarker {
        const OPERATION: Operation;
    }

    pub struct CreateAll;
    pub struct ReadAll;
    pub struct ReadOwn;
    pub struct UpdateAll;
    pub struct UpdateOwn;
    pub struct DeleteAll;

    impl OperationMarker for CreateAll {
        const OPERATION: Operation = Operation::CreateAll;
    }
    impl OperationMarker for ReadAll {
        const OPERATION: Operation = Operation::ReadAll;
    }
    impl OperationMarker for ReadOwn {
        const OPERATION: Operation = Operation::ReadOwn;
    }
    impl OperationMarker for UpdateAll {
        const OPERATION: Operation = Operation::UpdateAll;
    }
    impl OperationMarker for UpdateOwn {
        const OPERATION: Operation = Operation::UpdateOwn;
    }
    impl OperationMarker for DeleteAll {
        const OPERATION: Operation = Operation::DeleteAll;
    }
}

/// Whether `user` holds (resource, operation).
///
/// Admins hold everything. Non-admins hold only the `*Own` operations; the
/// ownership check itself happens in the handler against the record's id.
pub fn has_permission(user: &CurrentUser, resource: Resource, op: Operation) -> bool {
    if user.is_admin {
        return true;
    }
    match (resource, op) {
        (_, Operation::ReadOwn | Operation::UpdateOwn) => true,
        _ => false,
    }
}

/// Whether `user` may read arbitrary records of `resource`.
pub fn can_read_all_resources(user: &CurrentUser, resource: Resource) -> bool {
    has_permission(user, resource, Operation::ReadAll)
}

/// Whether `user` may read the record identified by `owner_id`.
pub fn can_read_own_resource(user: &CurrentUser, resource: Resource, owner_id: UserId) -> bool {
    has_permission(user, resource, Operation::ReadOwn) && user.id == owner_id
}

/// Whether `user` may update the record identified by `owner_id`.
pub fn can_update_own_resource(user: &CurrentUser, resource: Resource, owner_id: UserId) -> bool {
    has_permission(user, resource, Operation::UpdateOwn) && user.id == owner_id
}

/// Extractor that authenticates the caller and requires a permission,
/// both fixed at the type level.
pub struct RequiresPermission<R, O> {
    pub user: CurrentUser,
    _marker: PhantomData<(R, O)>,
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: resource::ResourceMarker + Send,
    O: operation::OperationMarker + Send,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Error> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if !has_permission(&user, R::RESOURCE, O::OPERATION) {
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(R::RESOURCE, O::OPERATION),
                action: O::OPERATION,
                resource: format!("{:?}", R::RESOURCE).to_lowercase(),
            });
        }

        Ok(Self {
            user,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(is_admin: bool) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            roles: vec!["user".to_string()],
            is_admin,
        }
    }

    #[test]
    fn test_admin_holds_everything() {
        let admin = user(true);
        for op in [
            Operation::CreateAll,
            Operation::ReadAll,
            Operation::ReadOwn,
            Operation::UpdateAll,
            Operation::UpdateOwn,
            Operation::DeleteAll,
        ] {
            assert!(has_permission(&admin, Resource::Users, op));
            assert!(has_permission(&admin, Resource::Media, op));
        }
    }

    #[test]
    fn test_non_admin_holds_only_own_operations() {
        let regular = user(false);
        assert!(has_permission(&regular, Resource::Users, Operation::ReadOwn));
        assert!(has_permission(&regular, Resource::Users, Operation::UpdateOwn));
        assert!(!has_permission(&regular, Resource::Users, Operation::ReadAll));
        assert!(!has_permission(&regular, Resource::Users, Operation::CreateAll));
        assert!(!has_permission(&regular, Resource::Users, Operation::DeleteAll));
        assert!(!has_permission(&regular, Resource::Media, Operation::CreateAll));
    }

    #[test]
    fn test_own_resource_requires_matching_id() {
        let regular = user(false);
        assert!(can_read_own_resource(&regular, Resource::Users, regular.id));
        assert!(!can_read_own_resource(&regular, Resource::Users, Uuid::new_v4()));
        assert!(can_update_own_resource(&regular, Resource::Users, regular.id));
        assert!(!can_update_own_resource(&regular, Resource::Users, Uuid::new_v4()));
    }
}
