//! Behavior categories and subcategories for one class, cached with a TTL and
//! edited through a pending-change set that is committed in bulk.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::{CatalogueError, CatalogueResult};
use crate::gateway::Gateway;
use crate::models::{
    Association, Category, CategoryId, CategoryKind, ClassId, Subcategory, SubcategoryId,
};
use crate::pending::{PendingChanges, PendingState};

/// Catalogue data captured for a single class.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub data: T,
    pub captured_at: DateTime<Utc>,
    pub class_id: ClassId,
}

impl<T> Snapshot<T> {
    pub fn new(data: T, captured_at: DateTime<Utc>, class_id: ClassId) -> Self {
        Self {
            data,
            captured_at,
            class_id,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        // A capture time in the future counts as fresh.
        (now - self.captured_at)
            .to_std()
            .is_ok_and(|age| age >= ttl)
    }

    pub fn is_valid_for(&self, class_id: ClassId, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.class_id == class_id && !self.is_expired(now, ttl)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BehaviorData {
    pub categories: Vec<Category>,
    pub subcategories: Vec<Subcategory>,
}

pub struct BehaviorCatalogue {
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot: Option<Snapshot<BehaviorData>>,
    categories: Vec<Category>,
    subcategories: Vec<Subcategory>,
    pending_categories: PendingChanges,
    pending_subcategories: PendingChanges,
    has_unsaved_changes: bool,
}

impl BehaviorCatalogue {
    pub fn new(gateway: Arc<dyn Gateway>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            gateway,
            clock,
            ttl,
            snapshot: None,
            categories: Vec::new(),
            subcategories: Vec::new(),
            pending_categories: PendingChanges::default(),
            pending_subcategories: PendingChanges::default(),
            has_unsaved_changes: false,
        }
    }

    /// Loads the catalogue for `class_id`, serving the cached snapshot while it
    /// is fresh and belongs to the same class. Discards pending edits.
    /// Without a class id nothing is fetched and the current lists stay.
    pub async fn load(&mut self, class_id: Option<ClassId>) -> CatalogueResult<()> {
        self.pending_categories.clear();
        self.pending_subcategories.clear();
        self.has_unsaved_changes = false;

        let now = self.clock.now();
        if self
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.is_expired(now, self.ttl))
        {
            debug!("behavior catalogue snapshot expired");
            self.snapshot = None;
        }

        let Some(class_id) = class_id else {
            return Ok(());
        };

        if let Some(snapshot) = &self.snapshot {
            if snapshot.is_valid_for(class_id, now, self.ttl) {
                debug!(class_id, "behavior catalogue served from cache");
                self.categories = snapshot.data.categories.clone();
                self.subcategories = snapshot.data.subcategories.clone();
                return Ok(());
            }
        }

        let categories = self
            .gateway
            .categories_with_selection(class_id)
            .await
            .inspect_err(|err| error!(class_id, error = %err, "failed to load categories"))?;
        let subcategories = self
            .gateway
            .subcategories_with_selection(class_id)
            .await
            .inspect_err(|err| error!(class_id, error = %err, "failed to load subcategories"))?;

        info!(
            class_id,
            categories = categories.len(),
            subcategories = subcategories.len(),
            "behavior catalogue loaded"
        );
        self.snapshot = Some(Snapshot::new(
            BehaviorData {
                categories: categories.clone(),
                subcategories: subcategories.clone(),
            },
            self.clock.now(),
            class_id,
        ));
        self.categories = categories;
        self.subcategories = subcategories;
        Ok(())
    }

    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }

    /// Negative categories first; order is otherwise preserved.
    pub fn categories(&self) -> Vec<&Category> {
        let mut ordered: Vec<&Category> = self.categories.iter().collect();
        ordered.sort_by_key(|category| match category.kind {
            CategoryKind::Negative => 0,
            CategoryKind::Positive => 1,
        });
        ordered
    }

    /// Largest point value first.
    pub fn subcategories(&self) -> Vec<&Subcategory> {
        let mut ordered: Vec<&Subcategory> = self.subcategories.iter().collect();
        ordered.sort_by(|a, b| b.points.cmp(&a.points));
        ordered
    }

    pub fn subcategories_of(&self, category_id: CategoryId) -> Vec<&Subcategory> {
        self.subcategories()
            .into_iter()
            .filter(|subcategory| subcategory.category_id == category_id)
            .collect()
    }

    pub fn find_subcategory(
        &self,
        subcategory_id: SubcategoryId,
    ) -> Option<(&Category, &Subcategory)> {
        let subcategory = self
            .subcategories
            .iter()
            .find(|subcategory| subcategory.id == subcategory_id)?;
        let category = self
            .categories
            .iter()
            .find(|category| category.id == subcategory.category_id)?;
        Some((category, subcategory))
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.has_unsaved_changes
    }

    pub fn pending_categories(&self) -> &PendingChanges {
        &self.pending_categories
    }

    pub fn pending_subcategories(&self) -> &PendingChanges {
        &self.pending_subcategories
    }

    fn refresh_unsaved(&mut self) {
        self.has_unsaved_changes =
            self.pending_categories.len() + self.pending_subcategories.len() > 0;
    }

    pub fn toggle_category(&mut self, category_id: CategoryId, selected: bool) -> PendingState {
        if let Some(category) = self.categories.iter_mut().find(|c| c.id == category_id) {
            category.is_selected = selected;
        }
        let state = self.pending_categories.toggle(category_id, selected);
        self.refresh_unsaved();
        state
    }

    pub fn toggle_subcategory(
        &mut self,
        subcategory_id: SubcategoryId,
        selected: bool,
    ) -> PendingState {
        if let Some(subcategory) = self
            .subcategories
            .iter_mut()
            .find(|s| s.id == subcategory_id)
        {
            subcategory.is_selected = selected;
        }
        let state = self.pending_subcategories.toggle(subcategory_id, selected);
        self.refresh_unsaved();
        state
    }

    /// Writes every pending selection as an association row. Stops at the
    /// first failed write; rows written before it stay and the pending set is
    /// kept whole so the commit can be retried.
    pub async fn commit(&mut self, class_id: ClassId) -> CatalogueResult<()> {
        let batches = [
            (Association::Category, self.pending_categories.desired()),
            (Association::Subcategory, self.pending_subcategories.desired()),
        ];

        for (association, changes) in batches {
            for (id, selected) in changes {
                write_association(self.gateway.as_ref(), association, class_id, id, selected)
                    .await
                    .inspect_err(|err| error!(class_id, error = %err, "catalogue commit aborted"))?;
            }
        }

        let written = self.pending_categories.len() + self.pending_subcategories.len();
        self.pending_categories.clear();
        self.pending_subcategories.clear();
        self.refresh_unsaved();
        self.invalidate();
        info!(class_id, written, "catalogue selection committed");

        self.load(Some(class_id)).await
    }

    pub async fn add_category(&mut self, name: &str, kind: CategoryKind) -> CatalogueResult<Category> {
        let id = self.gateway.insert_category(name, kind).await?;
        let category = Category {
            id,
            name: name.to_string(),
            kind,
            is_selected: false,
        };
        self.categories.push(category.clone());
        self.invalidate();
        info!(category_id = id, name, %kind, "category added");
        Ok(category)
    }

    pub async fn update_category(
        &mut self,
        category_id: CategoryId,
        name: &str,
        kind: CategoryKind,
    ) -> CatalogueResult<()> {
        self.gateway.update_category(category_id, name, kind).await?;
        if let Some(category) = self.categories.iter_mut().find(|c| c.id == category_id) {
            category.name = name.to_string();
            category.kind = kind;
        }
        self.invalidate();
        Ok(())
    }

    /// Also drops the category's subcategories.
    pub async fn delete_category(&mut self, category_id: CategoryId) -> CatalogueResult<()> {
        self.gateway.delete_category(category_id).await?;
        self.categories.retain(|category| category.id != category_id);
        self.subcategories
            .retain(|subcategory| subcategory.category_id != category_id);
        self.invalidate();
        info!(category_id, "category deleted");
        Ok(())
    }

    pub async fn add_subcategory(
        &mut self,
        category_id: CategoryId,
        name: &str,
        points: i32,
    ) -> CatalogueResult<Subcategory> {
        let id = self
            .gateway
            .insert_subcategory(category_id, name, points)
            .await?;
        let subcategory = Subcategory {
            id,
            category_id,
            name: name.to_string(),
            points,
            is_selected: false,
        };
        self.subcategories.push(subcategory.clone());
        self.invalidate();
        info!(subcategory_id = id, category_id, name, points, "subcategory added");
        Ok(subcategory)
    }

    pub async fn update_subcategory(
        &mut self,
        subcategory_id: SubcategoryId,
        name: &str,
        points: i32,
    ) -> CatalogueResult<()> {
        self.gateway
            .update_subcategory(subcategory_id, name, points)
            .await?;
        if let Some(subcategory) = self
            .subcategories
            .iter_mut()
            .find(|s| s.id == subcategory_id)
        {
            subcategory.name = name.to_string();
            subcategory.points = points;
        }
        self.invalidate();
        Ok(())
    }

    pub async fn delete_subcategory(&mut self, subcategory_id: SubcategoryId) -> CatalogueResult<()> {
        self.gateway.delete_subcategory(subcategory_id).await?;
        self.subcategories
            .retain(|subcategory| subcategory.id != subcategory_id);
        self.invalidate();
        info!(subcategory_id, "subcategory deleted");
        Ok(())
    }
}

pub(crate) async fn write_association(
    gateway: &dyn Gateway,
    association: Association,
    class_id: ClassId,
    id: i64,
    selected: bool,
) -> CatalogueResult<()> {
    let (action, result) = if selected {
        ("insert", gateway.insert_association(association, class_id, id).await)
    } else {
        ("delete", gateway.delete_association(association, class_id, id).await)
    };
    result.map_err(|source| CatalogueError::Commit {
        action,
        association,
        id,
        source,
    })
}
