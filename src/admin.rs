//! Admin mutations: role and subscription changes.
//!
//! Both are gated on the acting identity holding the admin role. Role
//! changes additionally refuse to touch the actor's own account; the
//! subscription mutation carries no self-guard, matching the dashboard it
//! serves. Every change lands a notification on the target account.

use crate::account::{Identity, NotificationKind, Role, Subscription};
use crate::auth::AuthState;
use crate::notify;
use crate::store::{AccountStore, StoreError};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("admin role required")]
    Forbidden,
    #[error("cannot modify your own role")]
    SelfModification,
    #[error("target account not found")]
    TargetNotFound,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Change a target account's role. Fails for non-admin actors and for the
/// actor's own account, regardless of the requested role.
pub async fn set_role(
    state: &AuthState,
    actor: &Identity,
    target_id: Uuid,
    new_role: Role,
) -> Result<Role, AdminError> {
    if actor.role != Role::Admin {
        return Err(AdminError::Forbidden);
    }
    if actor.id == target_id {
        return Err(AdminError::SelfModification);
    }

    let mut target = state
        .store()
        .find_by_id(target_id)
        .await?
        .ok_or(AdminError::TargetNotFound)?;

    let old_role = target.role;
    target.role = new_role;
    state.store().save(&target).await?;

    let message = format!(
        "Your account role has been updated from {} to {}",
        old_role.as_str(),
        new_role.as_str()
    );
    notify::notify(
        state.store(),
        state.mailer(),
        &mut target,
        NotificationKind::Info,
        "Role Updated",
        &message,
    )
    .await?;

    Ok(new_role)
}

/// Change a target account's subscription tier.
pub async fn set_subscription(
    state: &AuthState,
    actor: &Identity,
    target_id: Uuid,
    new_tier: Subscription,
) -> Result<Subscription, AdminError> {
    if actor.role != Role::Admin {
        return Err(AdminError::Forbidden);
    }

    let mut target = state
        .store()
        .find_by_id(target_id)
        .await?
        .ok_or(AdminError::TargetNotFound)?;

    let old_tier = target.subscription;
    target.subscription = new_tier;
    state.store().save(&target).await?;

    let message = format!(
        "Your subscription has been updated from {} to {}",
        old_tier.as_str(),
        new_tier.as_str()
    );
    notify::notify(
        state.store(),
        state.mailer(),
        &mut target,
        NotificationKind::Info,
        "Subscription Updated",
        &message,
    )
    .await?;

    Ok(new_tier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, NewAccount};
    use crate::auth::state::test_support::memory_state;
    use crate::store::AccountStore;

    async fn seeded(
        store: &crate::store::memory::MemoryStore,
        email: &str,
        role: Role,
    ) -> Account {
        let created = store
            .create(NewAccount {
                email: email.to_string(),
                email_verified: true,
                ..NewAccount::default()
            })
            .await
            .expect("create");
        let mut account = created.clone();
        account.role = role;
        store.save(&account).await.expect("save");
        account
    }

    #[tokio::test]
    async fn admin_can_change_another_accounts_role() {
        let (store, state) = memory_state();
        let admin = seeded(&store, "admin@x.com", Role::Admin).await;
        let target = seeded(&store, "user@x.com", Role::User).await;

        let role = set_role(&state, &Identity::from(&admin), target.id, Role::Moderator)
            .await
            .expect("set_role");
        assert_eq!(role, Role::Moderator);

        let target = store
            .find_by_id(target.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(target.role, Role::Moderator);
        assert_eq!(target.notifications.len(), 1);
        assert!(target.notifications[0].message.contains("user"));
        assert!(target.notifications[0].message.contains("moderator"));
    }

    #[tokio::test]
    async fn self_role_change_always_fails() {
        let (store, state) = memory_state();
        let admin = seeded(&store, "admin@x.com", Role::Admin).await;

        for role in [Role::User, Role::Admin, Role::Moderator] {
            let err = set_role(&state, &Identity::from(&admin), admin.id, role)
                .await
                .expect_err("self change");
            assert!(matches!(err, AdminError::SelfModification));
        }
    }

    #[tokio::test]
    async fn non_admin_actors_are_rejected() {
        let (store, state) = memory_state();
        let moderator = seeded(&store, "mod@x.com", Role::Moderator).await;
        let target = seeded(&store, "user@x.com", Role::User).await;

        let err = set_role(&state, &Identity::from(&moderator), target.id, Role::Admin)
            .await
            .expect_err("forbidden");
        assert!(matches!(err, AdminError::Forbidden));

        let err = set_subscription(
            &state,
            &Identity::from(&moderator),
            target.id,
            Subscription::Premium,
        )
        .await
        .expect_err("forbidden");
        assert!(matches!(err, AdminError::Forbidden));
    }

    #[tokio::test]
    async fn subscription_change_notifies_the_target() {
        let (store, state) = memory_state();
        let admin = seeded(&store, "admin@x.com", Role::Admin).await;
        let target = seeded(&store, "user@x.com", Role::User).await;

        let tier = set_subscription(
            &state,
            &Identity::from(&admin),
            target.id,
            Subscription::Enterprise,
        )
        .await
        .expect("set_subscription");
        assert_eq!(tier, Subscription::Enterprise);

        let target = store
            .find_by_id(target.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(target.subscription, Subscription::Enterprise);
        assert_eq!(target.notifications.len(), 1);
        assert_eq!(target.notifications[0].title, "Subscription Updated");
    }

    #[tokio::test]
    async fn unknown_target_is_reported() {
        let (store, state) = memory_state();
        let admin = seeded(&store, "admin@x.com", Role::Admin).await;
        let err = set_role(
            &state,
            &Identity::from(&admin),
            uuid::Uuid::new_v4(),
            Role::User,
        )
        .await
        .expect_err("unknown target");
        assert!(matches!(err, AdminError::TargetNotFound));
    }
}
