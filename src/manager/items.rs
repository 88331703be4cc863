use chrono::Utc;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{visible, ListManager, PushHandle};
use crate::error::{ManagerError, ManagerResult};
use crate::models::{EntityKind, ItemFilter, ListItem, PrevItem, Record, ShoppingList};
use crate::sync::events::ChangeBatch;
use crate::sync::ordering;

impl ListManager {
    /// Append a new item to the end of a list.
    pub async fn create_item(
        &self,
        list_id: Uuid,
        name: &str,
    ) -> ManagerResult<(ListItem, PushHandle)> {
        self.add_item(ListItem::new(list_id, name)).await
    }

    /// Store a new item. An unknown position appends it; a known one inserts
    /// it there and relinks its new successor.
    pub async fn add_item(&self, item: ListItem) -> ManagerResult<(ListItem, PushHandle)> {
        self.check_write()?;
        validate_item(&item)?;

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        if let Some(existing) = self.store().get_item(item.id).await? {
            return self.update_item_locked(item, existing).await;
        }
        self.visible_list(item.list_id, scope.as_deref()).await?;

        let mut batch = ChangeBatch::new();
        let sorted = self
            .resolve_list(item.list_id, scope.as_deref(), true, &mut batch)
            .await?;
        let mut order: Vec<Uuid> = sorted.iter().map(|i| i.id).collect();
        let position = match item.prev_item {
            PrevItem::Unknown => order.len(),
            PrevItem::First => 0,
            PrevItem::After(prev) => order
                .iter()
                .position(|id| *id == prev)
                .map_or(order.len(), |index| index + 1),
        };
        order.insert(position, item.id);

        let mut item = item;
        item.prev_item = PrevItem::after(position.checked_sub(1).map(|p| order[p]));
        item.modified = Utc::now();
        if item.creator.is_none() {
            item.creator = self.effective_user().map(|user| user.email);
        }
        let item = self.write_local(item, None, scope.as_deref(), &mut batch).await?;

        let mut items = sorted;
        items.push(item.clone());
        self.relink(&items, &order, scope.as_deref(), &mut batch).await?;

        let handle = self.push_handle(item.key());
        self.publish_local(batch);

        tracing::debug!("Added item '{}' to list {}", item.name, item.list_id);
        Ok((item, handle))
    }

    /// Replace an item's fields. The list and position are kept; use
    /// [`ListManager::move_item`] to reorder.
    pub async fn update_item(&self, item: ListItem) -> ManagerResult<(ListItem, PushHandle)> {
        self.check_write()?;
        validate_item(&item)?;

        let _seq = self.inner.sequence.lock().await;
        let existing = self
            .store()
            .get_item(item.id)
            .await?
            .ok_or_else(|| ManagerError::not_found(EntityKind::Item, item.id))?;
        self.update_item_locked(item, existing).await
    }

    async fn update_item_locked(
        &self,
        item: ListItem,
        existing: ListItem,
    ) -> ManagerResult<(ListItem, PushHandle)> {
        let mut item = item;
        item.list_id = existing.list_id;
        item.prev_item = existing.prev_item;
        item.modified = Utc::now();

        let scope = self.scope();
        let mut batch = ChangeBatch::new();
        let item = self
            .write_local(item, Some(existing), scope.as_deref(), &mut batch)
            .await?;
        let handle = self.push_handle(item.key());
        self.publish_local(batch);
        Ok((item, handle))
    }

    /// Remove an item, linking its successor to its predecessor.
    pub async fn remove_item(&self, item_id: Uuid) -> ManagerResult<PushHandle> {
        self.check_write()?;

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        let item = self.visible_item(item_id, scope.as_deref()).await?;

        let mut batch = ChangeBatch::new();
        let sorted = self
            .resolve_list(item.list_id, scope.as_deref(), true, &mut batch)
            .await?;
        let remaining: Vec<ListItem> = sorted.into_iter().filter(|i| i.id != item_id).collect();
        let order: Vec<Uuid> = remaining.iter().map(|i| i.id).collect();

        let current = self.visible_item(item_id, scope.as_deref()).await?;
        let handle = self.remove_local(current, &mut batch).await?;
        self.relink(&remaining, &order, scope.as_deref(), &mut batch).await?;
        self.publish_local(batch);

        Ok(handle)
    }

    /// Remove every item of a list matching `filter`. Returns how many were removed.
    pub async fn remove_all_items(&self, list_id: Uuid, filter: ItemFilter) -> ManagerResult<usize> {
        self.check_write()?;

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        self.visible_list(list_id, scope.as_deref()).await?;

        let mut batch = ChangeBatch::new();
        let sorted = self
            .resolve_list(list_id, scope.as_deref(), true, &mut batch)
            .await?;
        let (doomed, survivors): (Vec<ListItem>, Vec<ListItem>) =
            sorted.into_iter().partition(|item| filter.matches(item));

        let removed = doomed.len();
        for item in doomed {
            self.remove_local(item, &mut batch).await?;
        }
        let order: Vec<Uuid> = survivors.iter().map(|i| i.id).collect();
        self.relink(&survivors, &order, scope.as_deref(), &mut batch).await?;
        self.publish_local(batch);

        tracing::info!("Removed {} items from list {}", removed, list_id);
        Ok(removed)
    }

    /// Place an item directly after `after`, or first when `after` is `None`.
    pub async fn move_item(&self, item_id: Uuid, after: Option<Uuid>) -> ManagerResult<PushHandle> {
        self.check_write()?;
        if after == Some(item_id) {
            return Ok(PushHandle::done());
        }

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        let item = self.visible_item(item_id, scope.as_deref()).await?;

        let mut batch = ChangeBatch::new();
        let sorted = self
            .resolve_list(item.list_id, scope.as_deref(), true, &mut batch)
            .await?;
        let mut order: Vec<Uuid> = sorted
            .iter()
            .map(|i| i.id)
            .filter(|id| *id != item_id)
            .collect();
        let position = match after {
            None => 0,
            Some(after) => order
                .iter()
                .position(|id| *id == after)
                .map(|index| index + 1)
                .ok_or_else(|| ManagerError::not_found(EntityKind::Item, after))?,
        };
        order.insert(position, item_id);

        let changed = self.relink(&sorted, &order, scope.as_deref(), &mut batch).await?;
        let handle = if changed.contains(&item_id) {
            self.push_handle(item.key())
        } else {
            PushHandle::done()
        };
        self.publish_local(batch);

        Ok(handle)
    }

    pub async fn get_item(&self, item_id: Uuid) -> ManagerResult<Option<ListItem>> {
        self.check_read()?;
        let scope = self.scope();
        Ok(self
            .store()
            .get_item(item_id)
            .await?
            .filter(|item| visible(item, scope.as_deref())))
    }

    /// Items of a list in storage order.
    pub async fn items_in_list(
        &self,
        list_id: Uuid,
        filter: ItemFilter,
    ) -> ManagerResult<Vec<ListItem>> {
        self.check_read()?;
        let scope = self.scope();
        self.visible_list(list_id, scope.as_deref()).await?;
        Ok(self
            .visible_items(list_id, scope.as_deref())
            .await?
            .into_iter()
            .filter(|item| filter.matches(item))
            .collect())
    }

    /// Items of a list in their manual order, with `order_index` filled in.
    ///
    /// Broken links found on the way are repaired when the user may write.
    pub async fn items_sorted(&self, list_id: Uuid) -> ManagerResult<Vec<ListItem>> {
        self.check_read()?;
        let repair = self.can_write_lists();

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        self.visible_list(list_id, scope.as_deref()).await?;

        let mut batch = ChangeBatch::new();
        let sorted = self
            .resolve_list(list_id, scope.as_deref(), repair, &mut batch)
            .await?;
        self.publish_local(batch);
        Ok(sorted)
    }

    /// Rewrite broken predecessor links of a list. Returns the number of repairs.
    pub async fn repair_order(&self, list_id: Uuid) -> ManagerResult<usize> {
        self.check_write()?;

        let _seq = self.inner.sequence.lock().await;
        let scope = self.scope();
        self.visible_list(list_id, scope.as_deref()).await?;

        let mut batch = ChangeBatch::new();
        self.resolve_list(list_id, scope.as_deref(), true, &mut batch)
            .await?;
        let repaired = batch.len();
        self.publish_local(batch);
        Ok(repaired)
    }

    pub(super) async fn visible_list(
        &self,
        list_id: Uuid,
        scope: Option<&str>,
    ) -> ManagerResult<ShoppingList> {
        self.store()
            .get_list(list_id)
            .await?
            .filter(|list| visible(list, scope))
            .ok_or_else(|| ManagerError::not_found(EntityKind::List, list_id))
    }

    async fn visible_item(&self, item_id: Uuid, scope: Option<&str>) -> ManagerResult<ListItem> {
        self.store()
            .get_item(item_id)
            .await?
            .filter(|item| visible(item, scope))
            .ok_or_else(|| ManagerError::not_found(EntityKind::Item, item_id))
    }

    async fn visible_items(&self, list_id: Uuid, scope: Option<&str>) -> ManagerResult<Vec<ListItem>> {
        let items = self.store().items_in_list(list_id).await?;
        Ok(items
            .into_iter()
            .filter(|item| visible(item, scope))
            .collect())
    }

    /// Resolve a list's order, optionally storing the repairs it needs.
    /// Caller holds the sequence.
    pub(super) async fn resolve_list(
        &self,
        list_id: Uuid,
        scope: Option<&str>,
        repair: bool,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<Vec<ListItem>> {
        let items = self.visible_items(list_id, scope).await?;
        let resolution = ordering::resolve(&items);

        let mut by_id: HashMap<Uuid, ListItem> = items.into_iter().map(|i| (i.id, i)).collect();
        if repair && !resolution.repairs.is_empty() {
            tracing::info!(
                "Repairing {} broken links in list {}",
                resolution.repairs.len(),
                list_id
            );
            for fix in &resolution.repairs {
                let Some(existing) = by_id.get(&fix.item_id).cloned() else {
                    continue;
                };
                let mut edited = existing.clone();
                edited.prev_item = fix.prev_item;
                edited.modified = Utc::now();
                let stored = self
                    .write_local(edited, Some(existing), scope, batch)
                    .await?;
                by_id.insert(stored.id, stored);
            }
        }

        Ok(resolution
            .order
            .iter()
            .enumerate()
            .filter_map(|(index, id)| {
                by_id.remove(id).map(|mut item| {
                    item.order_index = index as i64;
                    item
                })
            })
            .collect())
    }

    /// Point each item in `order` at the one before it, storing only the
    /// changed ones. Returns the ids that changed. Caller holds the sequence.
    async fn relink(
        &self,
        items: &[ListItem],
        order: &[Uuid],
        scope: Option<&str>,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<HashSet<Uuid>> {
        let by_id: HashMap<Uuid, &ListItem> = items.iter().map(|i| (i.id, i)).collect();
        let mut changed = HashSet::new();

        for (index, id) in order.iter().enumerate() {
            let Some(item) = by_id.get(id) else {
                continue;
            };
            let prev_item = PrevItem::after(index.checked_sub(1).map(|p| order[p]));
            if item.prev_item == prev_item {
                continue;
            }
            let mut edited = (*item).clone();
            edited.prev_item = prev_item;
            edited.modified = Utc::now();
            // Re-read: an earlier step may have stored a newer copy
            let existing = self.store().get_item(*id).await?;
            if let Some(existing) = existing {
                self.write_local(edited, Some(existing), scope, batch).await?;
                changed.insert(*id);
            }
        }

        Ok(changed)
    }
}

fn validate_item(item: &ListItem) -> ManagerResult<()> {
    if item.name.trim().is_empty() {
        return Err(ManagerError::MissingParameter("name"));
    }
    Ok(())
}
