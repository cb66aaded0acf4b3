//! File-writing consumer sinks.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::item::Item;

use super::Callback;

/// Callback that appends each delivered item as one JSON line.
///
/// Write failures are logged and dropped; a storage sink is never allowed to
/// take a pipeline down.
pub struct WriteTo {
    path: PathBuf,
    truncated: bool,
}

pub fn write_to(path: impl Into<PathBuf>, append: bool) -> WriteTo {
    WriteTo {
        path: path.into(),
        // Pretend the truncation already happened when appending.
        truncated: append,
    }
}

impl WriteTo {
    fn write_line(&mut self, item: &Item) -> std::io::Result<()> {
        let line = item
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(self.truncated)
            .write(true)
            .truncate(!self.truncated)
            .open(&self.path)?;
        self.truncated = true;
        writeln!(file, "{line}")
    }
}

impl Callback<Item> for WriteTo {
    fn on_input(&mut self, item: Item) {
        if let Err(error) = self.write_line(&item) {
            tracing::warn!(path = %self.path.display(), error = %error, "failed to persist item");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_json_line_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.jsonl");
        let mut sink = write_to(&path, false);
        sink.on_input(Item::new().with_field("n", 1));
        sink.on_input(Item::new().with_field("n", 2));
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""n":1"#));
        assert!(lines[1].contains(r#""n":2"#));
    }

    #[test]
    fn truncates_unless_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.jsonl");
        std::fs::write(&path, "stale\n").unwrap();

        let mut sink = write_to(&path, false);
        sink.on_input(Item::new().with_field("n", 1));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale"));

        let mut appender = write_to(&path, true);
        appender.on_input(Item::new().with_field("n", 2));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
