//! Collectors fold a stream of items into one value.
//!
//! A [`StreamCollector`] is a factory: each collection run gets a fresh
//! [`CollectorState`]. Compound sub-queries run one state to completion and
//! read it once; value generators keep a single long-lived state and snapshot
//! it after every inner item.

use crate::item::{Item, Value};

pub trait StreamCollector: Send + Sync {
    fn start(&self) -> Box<dyn CollectorState>;
}

pub trait CollectorState: Send {
    fn add(&mut self, item: &Item);

    /// Current folded value. Callable at any point, not just at completion.
    fn value(&self) -> Value;
}

/// Collects every item into a list value.
pub struct ToItemList;

pub fn to_item_list() -> ToItemList {
    ToItemList
}

impl StreamCollector for ToItemList {
    fn start(&self) -> Box<dyn CollectorState> {
        Box::new(ItemListState { items: Vec::new() })
    }
}

struct ItemListState {
    items: Vec<Item>,
}

impl CollectorState for ItemListState {
    fn add(&mut self, item: &Item) {
        self.items.push(item.clone());
    }

    fn value(&self) -> Value {
        Value::Items(self.items.clone())
    }
}

/// Counts items without retaining them.
pub struct ItemCount;

pub fn item_count() -> ItemCount {
    ItemCount
}

impl StreamCollector for ItemCount {
    fn start(&self) -> Box<dyn CollectorState> {
        Box::new(CountState { seen: 0 })
    }
}

struct CountState {
    seen: i64,
}

impl CollectorState for CountState {
    fn add(&mut self, _item: &Item) {
        self.seen += 1;
    }

    fn value(&self) -> Value {
        Value::Int(self.seen)
    }
}
