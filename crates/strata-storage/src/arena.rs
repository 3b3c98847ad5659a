//! Paged entity table shared between snapshots.
//!
//! Slots are addressed by [`EntityId::index`]. Pages are reference counted:
//! cloning a table is proportional to the number of pages, and a builder
//! copies a page only on the first write that touches it.

use std::sync::Arc;

use crate::entity::Entity;
use crate::id::EntityId;

type Page = Vec<Option<Entity>>;

#[derive(Clone, Debug)]
pub(crate) struct EntityTable {
    pages: Vec<Arc<Page>>,
    page_size: usize,
    live: usize,
}

impl EntityTable {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            pages: Vec::new(),
            page_size: page_size.max(1),
            live: 0,
        }
    }

    fn locate(&self, id: EntityId) -> (usize, usize) {
        let index = id.index();
        (index / self.page_size, index % self.page_size)
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<&Entity> {
        let (page, slot) = self.locate(id);
        self.pages.get(page)?.get(slot)?.as_ref()
    }

    pub(crate) fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Stores `entity` in its slot, returning the previous occupant.
    pub(crate) fn put(&mut self, entity: Entity) -> Option<Entity> {
        let (page, slot) = self.locate(entity.id());
        while self.pages.len() <= page {
            self.pages.push(Arc::new(vec![None; self.page_size]));
        }
        let previous = Arc::make_mut(&mut self.pages[page])[slot].replace(entity);
        if previous.is_none() {
            self.live += 1;
        }
        previous
    }

    pub(crate) fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let (page, slot) = self.locate(id);
        let page = self.pages.get_mut(page)?;
        page.get(slot)?.as_ref()?;
        let removed = Arc::make_mut(page)[slot].take();
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Live entities in id order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.pages
            .iter()
            .flat_map(|page| page.iter().filter_map(Option::as_ref))
    }

    /// Number of pages physically shared with `other`.
    #[cfg(test)]
    pub(crate) fn shared_pages(&self, other: &EntityTable) -> usize {
        self.pages
            .iter()
            .zip(&other.pages)
            .filter(|(a, b)| Arc::ptr_eq(a, b))
            .count()
    }
}
