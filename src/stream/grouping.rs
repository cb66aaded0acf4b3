//! Grouping operators: global (bucket-until-complete) and local
//! (key-change-triggered, incremental).

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{ItemError, PipelineError};
use crate::functions::items::Selector;
use crate::item::{Item, Value, GROUPED_ITEMS};

use super::operator::{ExecutionEnv, Operator, StageFactory, StageFlow};

fn group_item(key_name: &str, key_value: Value, members: Vec<Item>) -> Item {
    Item::new()
        .with_field(key_name, key_value)
        .with_field(GROUPED_ITEMS.name(), members)
}

// ---------------------------------------------------------------------------
// group_by: needs a bounded upstream; buckets everything, emits at completion

pub(crate) struct GroupByFactory {
    pub(crate) key: String,
}

#[async_trait]
impl StageFactory for GroupByFactory {
    async fn instantiate(&self, _env: &ExecutionEnv) -> Result<Box<dyn Operator>, PipelineError> {
        Ok(Box::new(GroupByOperator {
            key: self.key.clone(),
            groups: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "group_by"
    }
}

struct GroupByOperator {
    key: String,
    // First-appearance order, so repeated runs over the same input emit the
    // same group sequence.
    groups: Vec<(Value, Vec<Item>)>,
}

#[async_trait]
impl Operator for GroupByOperator {
    async fn on_item(&mut self, item: Item, _out: &mut Vec<Item>) -> Result<StageFlow, ItemError> {
        let key_value = item
            .get_value(&self.key)
            .cloned()
            .ok_or_else(|| ItemError::missing_field(&self.key))?;
        match self.groups.iter_mut().find(|entry| entry.0 == key_value) {
            Some(entry) => entry.1.push(item),
            None => self.groups.push((key_value, vec![item])),
        }
        Ok(StageFlow::Continue)
    }

    async fn on_complete(&mut self, out: &mut Vec<Item>) -> Result<(), ItemError> {
        for (key_value, members) in self.groups.drain(..) {
            out.push(group_item(&self.key, key_value, members));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// local_group_by: emits the open group whenever the key changes

pub(crate) struct LocalGroupByFactory {
    pub(crate) key: String,
}

#[async_trait]
impl StageFactory for LocalGroupByFactory {
    async fn instantiate(&self, _env: &ExecutionEnv) -> Result<Box<dyn Operator>, PipelineError> {
        Ok(Box::new(LocalGroupByOperator {
            key: self.key.clone(),
            open: None,
        }))
    }

    fn name(&self) -> &'static str {
        "local_group_by"
    }
}

struct LocalGroupByOperator {
    key: String,
    open: Option<(Value, Vec<Item>)>,
}

#[async_trait]
impl Operator for LocalGroupByOperator {
    async fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<StageFlow, ItemError> {
        let key_value = item
            .get_value(&self.key)
            .cloned()
            .ok_or_else(|| ItemError::missing_field(&self.key))?;
        match &mut self.open {
            Some((open_key, members)) if *open_key == key_value => members.push(item),
            _ => {
                if let Some((closed_key, members)) = self.open.take() {
                    out.push(group_item(&self.key, closed_key, members));
                }
                self.open = Some((key_value, vec![item]));
            }
        }
        Ok(StageFlow::Continue)
    }

    async fn on_complete(&mut self, out: &mut Vec<Item>) -> Result<(), ItemError> {
        if let Some((key_value, members)) = self.open.take() {
            out.push(group_item(&self.key, key_value, members));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// select: buffers the whole (grouped) stream, emits at most one item

pub(crate) struct SelectFactory {
    pub(crate) selector: Arc<dyn Selector>,
}

#[async_trait]
impl StageFactory for SelectFactory {
    async fn instantiate(&self, _env: &ExecutionEnv) -> Result<Box<dyn Operator>, PipelineError> {
        Ok(Box::new(SelectOperator {
            selector: Arc::clone(&self.selector),
            buffer: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "select"
    }
}

struct SelectOperator {
    selector: Arc<dyn Selector>,
    buffer: Vec<Item>,
}

#[async_trait]
impl Operator for SelectOperator {
    async fn on_item(&mut self, item: Item, _out: &mut Vec<Item>) -> Result<StageFlow, ItemError> {
        self.buffer.push(item);
        Ok(StageFlow::Continue)
    }

    async fn on_complete(&mut self, out: &mut Vec<Item>) -> Result<(), ItemError> {
        let buffered = std::mem::take(&mut self.buffer);
        // An empty selection emits nothing; the terminal's failure path
        // reports the absence.
        if let Some(selected) = self.selector.select(buffered)? {
            out.push(selected);
        }
        Ok(())
    }
}
