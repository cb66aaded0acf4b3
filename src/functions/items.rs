//! Whole-stream selectors for `select`.

use crate::errors::ItemError;
use crate::item::{Field, FromValue, Item};

/// Reduction across the complete, buffered stream: picks at most one item.
pub trait Selector: Send + Sync {
    fn select(&self, items: Vec<Item>) -> Result<Option<Item>, ItemError>;
}

/// Item whose field value is maximal across the stream.
pub struct ItemWithMax<T> {
    field: Field<T>,
}

pub fn item_with_max<T>(field: Field<T>) -> ItemWithMax<T> {
    ItemWithMax { field }
}

impl<T> Selector for ItemWithMax<T>
where
    T: FromValue + PartialOrd + Send + Sync,
{
    fn select(&self, items: Vec<Item>) -> Result<Option<Item>, ItemError> {
        Ok(pick(items, self.field, |best, next| next > best))
    }
}

/// Item whose field value is minimal across the stream.
pub struct ItemWithMin<T> {
    field: Field<T>,
}

pub fn item_with_min<T>(field: Field<T>) -> ItemWithMin<T> {
    ItemWithMin { field }
}

impl<T> Selector for ItemWithMin<T>
where
    T: FromValue + PartialOrd + Send + Sync,
{
    fn select(&self, items: Vec<Item>) -> Result<Option<Item>, ItemError> {
        Ok(pick(items, self.field, |best, next| next < best))
    }
}

fn pick<T>(items: Vec<Item>, field: Field<T>, replace: impl Fn(&T, &T) -> bool) -> Option<Item>
where
    T: FromValue + PartialOrd,
{
    let mut best: Option<(T, Item)> = None;
    for item in items {
        // Items without the field never win; they are a per-item concern of
        // earlier stages, not grounds to fail the selection.
        if let Ok(candidate) = field.get(&item) {
            match &best {
                Some((current, _)) if !replace(current, &candidate) => {}
                _ => best = Some((candidate, item)),
            }
        }
    }
    best.map(|(_, item)| item)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALLS: Field<i64> = Field::new("#calls");

    fn item(name: &str, calls: i64) -> Item {
        Item::new()
            .with_field("contact", name)
            .with_field("#calls", calls)
    }

    #[test]
    fn picks_item_with_max_field() {
        let winner = item_with_max(CALLS)
            .select(vec![item("ana", 3), item("bo", 9), item("cy", 5)])
            .unwrap()
            .unwrap();
        assert_eq!(winner.get_value("contact").unwrap().as_text(), Some("bo"));
    }

    #[test]
    fn empty_stream_selects_nothing() {
        assert_eq!(item_with_max(CALLS).select(Vec::new()).unwrap(), None);
    }

    #[test]
    fn items_missing_the_field_cannot_win() {
        let winner = item_with_max(CALLS)
            .select(vec![Item::new(), item("ana", 1)])
            .unwrap()
            .unwrap();
        assert_eq!(winner.get_value("contact").unwrap().as_text(), Some("ana"));
    }
}
