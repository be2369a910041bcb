use crate::{jwt::SessionData, schema::UserRole};

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnMemberships,
            ActionType::ManageOwnFollows,
        ],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnMemberships,
            ActionType::ManageOwnFollows,
            ActionType::ManageAllRecipes,
        ],
    ),
];

#[derive(Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    CreateRecipes,

    ManageOwnRecipes,
    ManageOwnMemberships,
    ManageOwnFollows,

    ManageAllRecipes,
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        let role = &session.role;

        ACTION_TABLE
            .iter()
            .find_map(|(uid, actions)| {
                if role != uid {
                    return None;
                }

                Some(actions.contains(&self))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: UserRole) -> SessionData {
        SessionData {
            user_id: 1,
            email: String::from("user@example.com"),
            is_admin: role == UserRole::Admin,
            token_serial: 0,
            role,
        }
    }

    #[test]
    fn users_hold_the_own_resource_actions() {
        let session = session(UserRole::User);
        assert!(ActionType::CreateRecipes.authenticate(&session));
        assert!(ActionType::ManageOwnRecipes.authenticate(&session));
        assert!(ActionType::ManageOwnMemberships.authenticate(&session));
        assert!(ActionType::ManageOwnFollows.authenticate(&session));
    }

    #[test]
    fn users_cannot_manage_foreign_recipes() {
        let session = session(UserRole::User);
        assert!(!ActionType::ManageAllRecipes.authenticate(&session));
    }

    #[test]
    fn admins_hold_every_action() {
        let session = session(UserRole::Admin);
        assert!(ActionType::ManageAllRecipes.authenticate(&session));
        assert!(ActionType::ManageOwnFollows.authenticate(&session));
    }

    #[test]
    fn session_authenticate_maps_misses_to_permission_denied() {
        let session = session(UserRole::User);
        let denied = session
            .authenticate(ActionType::ManageAllRecipes)
            .expect_err("plain users may not manage foreign recipes");
        assert_eq!(denied.kind, crate::error::ErrorKind::PermissionDenied);
    }
}
