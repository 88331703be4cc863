use chrono::Utc;
use uuid::Uuid;

use super::{visible, ListManager, PushHandle};
use crate::error::{ManagerError, ManagerResult};
use crate::models::{EntityKind, Record, RecordKey, ShoppingList};
use crate::sync::events::ChangeBatch;

impl ListManager {
    /// Create a list in the current scope.
    pub async fn create_list(&self, name: &str) -> ManagerResult<(ShoppingList, PushHandle)> {
        self.add_list(ShoppingList::new(name)).await
    }

    /// Store a new, fully specified list.
    pub async fn add_list(&self, list: ShoppingList) -> ManagerResult<(ShoppingList, PushHandle)> {
        self.check_write()?;
        validate_list(&list)?;

        let mut list = list;
        list.modified = Utc::now();

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        let existing = self.store().get_list(list.id).await?;
        let mut batch = ChangeBatch::new();
        let list = self
            .write_local(list, existing, scope.as_deref(), &mut batch)
            .await?;
        let handle = self.push_handle(RecordKey::List(list.id));
        self.publish_local(batch);

        tracing::info!("Added list '{}' ({})", list.name, list.id);
        Ok((list, handle))
    }

    /// Replace an existing list's fields.
    pub async fn update_list(
        &self,
        list: ShoppingList,
    ) -> ManagerResult<(ShoppingList, PushHandle)> {
        self.check_write()?;
        validate_list(&list)?;

        let mut list = list;
        list.modified = Utc::now();

        let _seq = self.inner.sequence.lock().await;
        let existing = self
            .store()
            .get_list(list.id)
            .await?
            .ok_or_else(|| ManagerError::not_found(EntityKind::List, list.id))?;
        let scope = self.scope();
        let mut batch = ChangeBatch::new();
        let list = self
            .write_local(list, Some(existing), scope.as_deref(), &mut batch)
            .await?;
        let handle = self.push_handle(RecordKey::List(list.id));
        self.publish_local(batch);

        Ok((list, handle))
    }

    /// Remove a list together with its items and shares.
    pub async fn remove_list(&self, list_id: Uuid) -> ManagerResult<PushHandle> {
        self.check_write()?;

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        let list = self
            .store()
            .get_list(list_id)
            .await?
            .filter(|list| visible(list, scope.as_deref()))
            .ok_or_else(|| ManagerError::not_found(EntityKind::List, list_id))?;

        let mut batch = ChangeBatch::new();
        self.purge_children(list_id, &mut batch).await?;
        let handle = self.remove_local(list, &mut batch).await?;
        self.publish_local(batch);

        tracing::info!("Removed list {}", list_id);
        Ok(handle)
    }

    pub async fn get_list(&self, list_id: Uuid) -> ManagerResult<Option<ShoppingList>> {
        self.check_read()?;
        let scope = self.scope();
        Ok(self
            .store()
            .get_list(list_id)
            .await?
            .filter(|list| visible(list, scope.as_deref())))
    }

    /// Every list of the current scope, in creation order.
    pub async fn lists(&self) -> ManagerResult<Vec<ShoppingList>> {
        self.check_read()?;
        let scope = self.scope();
        self.lists_for_user(scope.as_deref()).await
    }

    /// Lists owned by `user_id` (`None` for the logged-out scope).
    pub async fn lists_for_user(&self, user_id: Option<&str>) -> ManagerResult<Vec<ShoppingList>> {
        self.check_read()?;
        let lists = self.store().lists_for_user(user_id).await?;
        Ok(lists
            .into_iter()
            .filter(|list| !list.state.is_removed())
            .collect())
    }

    /// Drop a list's items and shares locally; the server removes them with
    /// the list. Caller holds the sequence.
    pub(super) async fn purge_children(
        &self,
        list_id: Uuid,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<()> {
        let items = self.store().delete_items_in_list(list_id).await?;
        let shares = self.store().delete_shares_in_list(list_id).await?;

        let mut session = self.session();
        for item in items {
            session.waiters.forget(&item.key());
            session.conflicted.remove(&item.key());
            batch.removed(item);
        }
        for share in shares {
            session.waiters.forget(&share.key());
            session.conflicted.remove(&share.key());
            batch.removed(share);
        }
        Ok(())
    }
}

fn validate_list(list: &ShoppingList) -> ManagerResult<()> {
    if list.name.trim().is_empty() {
        return Err(ManagerError::MissingParameter("name"));
    }
    Ok(())
}
