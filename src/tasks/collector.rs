use crate::domain::ExtractedItem;

/// Gathers items in any order and hands them back oldest first.
#[derive(Debug, Default)]
pub struct OrderedCollector {
    items: Vec<ExtractedItem>,
}

impl OrderedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: ExtractedItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn drain(self) -> Vec<ExtractedItem> {
        let mut items = self.items;
        items.sort_by_key(|item| item.created_at);
        items
    }
}

impl Extend<ExtractedItem> for OrderedCollector {
    fn extend<I: IntoIterator<Item = ExtractedItem>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}
