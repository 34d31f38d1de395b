use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::catalogue::{write_association, Snapshot};
use crate::clock::Clock;
use crate::error::CatalogueResult;
use crate::gateway::Gateway;
use crate::models::{Association, ClassId, ShopItem, ShopItemId};

/// Shop items offered to a class. Selection changes are written straight
/// through; only the item list itself is cached.
pub struct ShopCatalogue {
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot: Option<Snapshot<Vec<ShopItem>>>,
    items: Vec<ShopItem>,
}

impl ShopCatalogue {
    pub fn new(gateway: Arc<dyn Gateway>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            gateway,
            clock,
            ttl,
            snapshot: None,
            items: Vec::new(),
        }
    }

    pub async fn load(&mut self, class_id: Option<ClassId>) -> CatalogueResult<()> {
        let now = self.clock.now();
        if self
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.is_expired(now, self.ttl))
        {
            self.snapshot = None;
        }

        let Some(class_id) = class_id else {
            return Ok(());
        };

        if let Some(snapshot) = &self.snapshot {
            if snapshot.is_valid_for(class_id, now, self.ttl) {
                debug!(class_id, "shop items served from cache");
                self.items = snapshot.data.clone();
                return Ok(());
            }
        }

        let items = self
            .gateway
            .shop_items_with_selection(class_id)
            .await
            .inspect_err(|err| error!(class_id, error = %err, "failed to load shop items"))?;
        info!(class_id, items = items.len(), "shop items loaded");
        self.snapshot = Some(Snapshot::new(items.clone(), self.clock.now(), class_id));
        self.items = items;
        Ok(())
    }

    /// Cheapest first.
    pub fn items(&self) -> Vec<&ShopItem> {
        let mut ordered: Vec<&ShopItem> = self.items.iter().collect();
        ordered.sort_by_key(|item| item.cost);
        ordered
    }

    pub fn selected_items(&self) -> Vec<&ShopItem> {
        self.items()
            .into_iter()
            .filter(|item| item.is_selected)
            .collect()
    }

    pub fn find(&self, item_id: ShopItemId) -> Option<&ShopItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }

    /// Offers or withdraws an item for the class; the local flag changes only
    /// after the association write succeeds.
    pub async fn set_item_selection(
        &mut self,
        class_id: ClassId,
        item_id: ShopItemId,
        selected: bool,
    ) -> CatalogueResult<()> {
        write_association(
            self.gateway.as_ref(),
            Association::ShopItem,
            class_id,
            item_id,
            selected,
        )
        .await?;
        if let Some(item) = self.items.iter_mut().find(|item| item.id == item_id) {
            item.is_selected = selected;
        }
        self.invalidate();
        info!(class_id, item_id, selected, "shop item selection saved");
        Ok(())
    }
}
