use uuid::Uuid;

use super::{visible, ListManager, PushHandle};
use crate::error::{ManagerError, ManagerResult};
use crate::models::{
    normalize_email, EntityKind, ListShare, Record, ShareAccess, DEFAULT_ACCEPT_URL,
};
use crate::sync::events::ChangeBatch;

impl ListManager {
    /// Grant `email` access to a list, or change an existing grant.
    ///
    /// `ShareAccess::None` removes the share.
    pub async fn set_share_access(
        &self,
        list_id: Uuid,
        email: &str,
        access: ShareAccess,
        accept_url: Option<&str>,
    ) -> ManagerResult<PushHandle> {
        if access == ShareAccess::None {
            return self.remove_share(list_id, email).await;
        }
        self.check_write()?;
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ManagerError::MissingParameter("email"));
        }

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        self.visible_list(list_id, scope.as_deref()).await?;

        let existing = self.store().get_share(list_id, &email).await?;
        let share = match &existing {
            Some(current) => {
                let mut share = current.clone();
                share.access = access;
                if let Some(url) = accept_url {
                    share.accept_url = Some(url.to_string());
                }
                share
            }
            None => {
                let mut share = ListShare::new(list_id, &email, access);
                share.accept_url = Some(accept_url.unwrap_or(DEFAULT_ACCEPT_URL).to_string());
                share
            }
        };

        // Granting access again takes back a removal that is still pending
        let restoring = existing
            .as_ref()
            .is_some_and(|current| current.state().is_removed());
        let mut batch = ChangeBatch::new();
        let share = self
            .restore_local(share, existing, scope.as_deref(), &mut batch)
            .await?;
        if restoring {
            self.session().waiters.forget(&share.key());
        }
        let handle = self.push_handle(share.key());
        self.publish_local(batch);

        tracing::info!("Shared list {} with {} ({})", list_id, email, access);
        Ok(handle)
    }

    pub async fn remove_share(&self, list_id: Uuid, email: &str) -> ManagerResult<PushHandle> {
        self.check_write()?;

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        let share = self
            .store()
            .get_share(list_id, email)
            .await?
            .filter(|share| visible(share, scope.as_deref()))
            .ok_or_else(|| {
                ManagerError::not_found(
                    EntityKind::Share,
                    format!("{}/{}", list_id, normalize_email(email)),
                )
            })?;

        let mut batch = ChangeBatch::new();
        let handle = self.remove_local(share, &mut batch).await?;
        self.publish_local(batch);
        Ok(handle)
    }

    pub async fn get_share(&self, list_id: Uuid, email: &str) -> ManagerResult<Option<ListShare>> {
        self.check_read()?;
        let scope = self.scope();
        Ok(self
            .store()
            .get_share(list_id, email)
            .await?
            .filter(|share| visible(share, scope.as_deref())))
    }

    pub async fn shares_in_list(&self, list_id: Uuid) -> ManagerResult<Vec<ListShare>> {
        self.check_read()?;
        let scope = self.scope();
        let shares = self.store().shares_in_list(list_id).await?;
        Ok(shares
            .into_iter()
            .filter(|share| visible(share, scope.as_deref()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestContext;
    use crate::store::RecordStore;
    use crate::error::{ManagerError, RemoteError};
    use crate::models::{ShareAccess, SyncState, DEFAULT_ACCEPT_URL};

    #[tokio::test]
    async fn test_share_lifecycle() {
        let ctx = TestContext::online().await;
        let (list, _) = ctx.manager.create_list("Party").await.unwrap();

        let push = ctx
            .manager
            .set_share_access(list.id, "Ann@Example.com", ShareAccess::ReadOnly, None)
            .await
            .unwrap();
        let share = ctx
            .manager
            .get_share(list.id, "ann@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(share.user_email, "ann@example.com");
        assert_eq!(share.accept_url.as_deref(), Some(DEFAULT_ACCEPT_URL));
        assert_eq!(share.state, SyncState::PendingCreate);

        ctx.manager.force_sync().await.unwrap();
        push.confirmed().await.unwrap();
        let remote = ctx.remote.share(list.id, "ann@example.com").unwrap();
        assert_eq!(remote.access, ShareAccess::ReadOnly);

        ctx.manager
            .set_share_access(list.id, "ann@example.com", ShareAccess::ReadWrite, None)
            .await
            .unwrap();
        let share = ctx
            .manager
            .get_share(list.id, "ann@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(share.state, SyncState::PendingUpdate);
        assert_eq!(ctx.manager.shares_in_list(list.id).await.unwrap().len(), 1);

        let push = ctx
            .manager
            .set_share_access(list.id, "ann@example.com", ShareAccess::None, None)
            .await
            .unwrap();
        assert!(ctx.manager.shares_in_list(list.id).await.unwrap().is_empty());
        ctx.manager.force_sync().await.unwrap();
        push.confirmed().await.unwrap();
        assert!(ctx.remote.share(list.id, "ann@example.com").is_none());
    }

    #[tokio::test]
    async fn test_share_requires_email() {
        let ctx = TestContext::offline().await;
        let (list, _) = ctx.manager.create_list("Party").await.unwrap();
        let err = ctx
            .manager
            .set_share_access(list.id, " ", ShareAccess::ReadOnly, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::MissingParameter("email")));
    }

    #[tokio::test]
    async fn test_rejected_share_surfaces_to_caller() {
        let ctx = TestContext::online().await;
        let (list, _) = ctx.manager.create_list("Party").await.unwrap();
        ctx.manager.force_sync().await.unwrap();

        let push = ctx
            .manager
            .set_share_access(list.id, "bob@example.com", ShareAccess::Owner, Some("https://x"))
            .await
            .unwrap();
        ctx.remote
            .fail_next(RemoteError::Rejected("cannot share ownership".into()));
        ctx.manager.force_sync().await.unwrap();

        let err = push.confirmed().await.unwrap_err();
        assert!(matches!(err, ManagerError::Remote(RemoteError::Rejected(_))));
        let share = ctx.store.get_share(list.id, "bob@example.com").await.unwrap().unwrap();
        assert_eq!(share.state, SyncState::Error);
        assert_eq!(share.accept_url.as_deref(), Some("https://x"));
    }

    #[tokio::test]
    async fn test_granting_again_takes_back_pending_removal() {
        let ctx = TestContext::online().await;
        let (list, _) = ctx.manager.create_list("Party").await.unwrap();
        ctx.manager
            .set_share_access(list.id, "ann@example.com", ShareAccess::ReadOnly, None)
            .await
            .unwrap();
        ctx.manager.force_sync().await.unwrap();

        let removal = ctx
            .manager
            .remove_share(list.id, "ann@example.com")
            .await
            .unwrap();
        assert!(ctx.manager.get_share(list.id, "ann@example.com").await.unwrap().is_none());

        let push = ctx
            .manager
            .set_share_access(list.id, "ann@example.com", ShareAccess::ReadWrite, None)
            .await
            .unwrap();
        let share = ctx
            .manager
            .get_share(list.id, "ann@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(share.state, SyncState::PendingUpdate);
        assert_eq!(share.access, ShareAccess::ReadWrite);
        assert_eq!(share.owner_id.as_deref(), Some("u1"));
        assert!(matches!(
            removal.confirmed().await,
            Err(ManagerError::Superseded)
        ));

        ctx.manager.force_sync().await.unwrap();
        push.confirmed().await.unwrap();
        let remote = ctx.remote.share(list.id, "ann@example.com").unwrap();
        assert_eq!(remote.access, ShareAccess::ReadWrite);
        assert!(!ctx
            .remote
            .calls()
            .iter()
            .any(|c| c.starts_with("delete_share")));
    }
}
