use super::ListManager;
use crate::error::ManagerResult;
use crate::models::{Record, SyncState, User};
use crate::sync::events::ChangeBatch;
use crate::sync::permissions;

impl ListManager {
    /// Attach a user. Lists made while logged out move to the user and are
    /// queued for upload.
    pub async fn attach_user(&self, user: User) -> ManagerResult<()> {
        let ignoring = {
            let mut session = self.session();
            session.user = Some(user.clone());
            session.has_synced = false;
            session.initial_sync_error = None;
            session.ignore_attached_user
        };
        tracing::info!("Attached user {}", user.id);

        if !ignoring {
            let moved = self.move_lists(None, Some(&user.id)).await?;
            if moved > 0 {
                tracing::info!("Moved {} logged-out lists to user {}", moved, user.id);
            }
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Detach the current user. Their records stay in the store but are no
    /// longer visible until they attach again.
    pub fn detach_user(&self) -> Option<User> {
        let mut session = self.session();
        let user = session.user.take();
        session.has_synced = false;
        session.requeue.clear();
        session.conflicted.clear();
        if let Some(user) = &user {
            tracing::info!("Detached user {}", user.id);
        }
        user
    }

    pub fn attached_user(&self) -> Option<User> {
        self.session().user.clone()
    }

    /// Act on the logged-out scope even while a user is attached.
    pub fn set_ignore_attached_user(&self, ignore: bool) {
        self.session().ignore_attached_user = ignore;
    }

    pub fn ignores_attached_user(&self) -> bool {
        self.session().ignore_attached_user
    }

    pub fn can_read_lists(&self) -> bool {
        permissions::can_read_lists(self.effective_user().as_ref())
    }

    pub fn can_write_lists(&self) -> bool {
        permissions::can_write_lists(self.effective_user().as_ref())
    }

    /// Re-own every list of scope `from`, with its items and shares, to scope
    /// `to` and queue them for upload there. Lists already on their way out
    /// are dropped. Returns the number of lists moved.
    pub async fn move_lists(&self, from: Option<&str>, to: Option<&str>) -> ManagerResult<usize> {
        if from == to {
            return Ok(0);
        }

        let _seq = self.inner.sequence.lock().await;
        let owner = to.map(str::to_string);
        let lists = self.store().lists_for_user(from).await?;
        let mut batch = ChangeBatch::new();
        let mut moved = 0;

        for mut list in lists {
            if list.state.is_removed() {
                self.purge_children(list.id, &mut batch).await?;
                self.store().delete_list(list.id).await?;
                batch.removed(list);
                continue;
            }

            for mut item in self.store().items_in_list(list.id).await? {
                if item.state.is_removed() {
                    self.store().delete_item(item.id).await?;
                    batch.removed(item);
                    continue;
                }
                item.set_owner(owner.clone());
                item.state = SyncState::PendingCreate;
                self.store().save_item(&item).await?;
                batch.modified(item);
            }
            for mut share in self.store().shares_in_list(list.id).await? {
                if share.state.is_removed() {
                    self.store()
                        .delete_share(share.list_id, &share.user_email)
                        .await?;
                    batch.removed(share);
                    continue;
                }
                share.set_owner(owner.clone());
                share.state = SyncState::PendingCreate;
                self.store().save_share(&share).await?;
                batch.modified(share);
            }

            list.set_owner(owner.clone());
            list.state = SyncState::PendingCreate;
            self.store().save_list(&list).await?;
            batch.modified(list);
            moved += 1;
        }

        self.publish_local(batch);
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestContext;
    use crate::store::RecordStore;
    use crate::error::ManagerError;
    use crate::models::{ItemFilter, Permissions, SyncState, User};

    #[tokio::test]
    async fn test_attach_moves_logged_out_lists() {
        let ctx = TestContext::online_logged_out().await;
        let (list, _) = ctx.manager.create_list("Before login").await.unwrap();
        let (item, _) = ctx.manager.create_item(list.id, "Milk").await.unwrap();
        assert_eq!(list.owner_id, None);

        // Nothing is pushed without a user
        ctx.manager.force_sync().await.unwrap();
        assert!(ctx.remote.calls().is_empty());

        ctx.manager
            .attach_user(User::new("u1", "u1@example.com"))
            .await
            .unwrap();

        let moved = ctx.manager.get_list(list.id).await.unwrap().unwrap();
        assert_eq!(moved.owner_id.as_deref(), Some("u1"));
        assert_eq!(moved.state, SyncState::PendingCreate);
        let moved_item = ctx.manager.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(moved_item.owner_id.as_deref(), Some("u1"));

        ctx.manager.force_sync().await.unwrap();
        assert!(ctx.remote.list("u1", list.id).is_some());
        assert!(ctx.remote.item(item.id).is_some());
    }

    #[tokio::test]
    async fn test_detach_hides_user_lists() {
        let ctx = TestContext::online().await;
        let (list, _) = ctx.manager.create_list("Mine").await.unwrap();
        ctx.manager.force_sync().await.unwrap();

        let user = ctx.manager.detach_user().unwrap();
        assert_eq!(user.id, "u1");
        assert!(ctx.manager.lists().await.unwrap().is_empty());
        assert!(ctx.manager.get_list(list.id).await.unwrap().is_none());
        // Still stored
        assert!(ctx.store.get_list(list.id).await.unwrap().is_some());

        ctx.manager.attach_user(user).await.unwrap();
        assert_eq!(ctx.manager.lists().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ignore_attached_user() {
        let ctx = TestContext::online().await;
        ctx.manager.create_list("Mine").await.unwrap();

        ctx.manager.set_ignore_attached_user(true);
        assert!(ctx.manager.ignores_attached_user());
        assert!(ctx.manager.lists().await.unwrap().is_empty());
        let (logged_out, _) = ctx.manager.create_list("Logged out").await.unwrap();
        assert_eq!(logged_out.owner_id, None);

        ctx.manager.set_ignore_attached_user(false);
        let lists = ctx.manager.lists().await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Mine");

        let moved = ctx.manager.move_lists(None, Some("u1")).await.unwrap();
        assert_eq!(moved, 1);
        assert_eq!(ctx.manager.lists().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_permissions_gate_mutations() {
        let ctx = TestContext::online().await;
        let (list, _) = ctx.manager.create_list("Mine").await.unwrap();

        ctx.manager
            .attach_user(
                User::new("u1", "u1@example.com")
                    .with_permissions(Permissions::new(["api.users.u1.read"])),
            )
            .await
            .unwrap();
        assert!(ctx.manager.can_read_lists());
        assert!(!ctx.manager.can_write_lists());

        let err = ctx.manager.create_item(list.id, "Milk").await.unwrap_err();
        assert!(matches!(err, ManagerError::PermissionDenied("write")));
        assert!(ctx
            .manager
            .items_in_list(list.id, ItemFilter::All)
            .await
            .unwrap()
            .is_empty());

        ctx.manager
            .attach_user(User::new("u1", "u1@example.com").with_permissions(Permissions::none()))
            .await
            .unwrap();
        let err = ctx.manager.lists().await.unwrap_err();
        assert!(matches!(err, ManagerError::PermissionDenied("read")));
    }

    #[tokio::test]
    async fn test_no_user_means_full_access() {
        let ctx = TestContext::offline().await;
        assert!(ctx.manager.attached_user().is_none());
        assert!(ctx.manager.can_read_lists());
        assert!(ctx.manager.can_write_lists());
    }
}
