//! Terminal selection helper for the interactive wizard. The library core
//! never depends on this; only the binary glue does.

use std::fmt::Display;

use anyhow::{Result, bail};
use termenu::{Item, Menu};

/// Show a menu titled `title` and return the selected item.
///
/// The helper converts the supplied items into `String`s so callers do not
/// have to worry about ownership.
pub fn choose_one<S: ToString>(title: &str, items: Vec<S>) -> Result<String> {
    let display_items: Vec<String> = items.into_iter().map(|s| s.to_string()).collect();
    match Picker::new(title.to_string(), display_items).invoke()? {
        Some(choice) => Ok(choice),
        None => bail!("No selection made"),
    }
}

struct Picker<T> {
    title: String,
    items: Vec<T>,
}

impl<T> Picker<T>
where
    T: Display + Clone,
{
    fn new(title: String, items: Vec<T>) -> Self {
        Self { title, items }
    }

    /// Show the menu and return the selected item, or `None` if the user
    /// cancelled.
    fn invoke(&self) -> Result<Option<T>> {
        let mut menu = Menu::new()?;

        let list: Vec<Item<usize>> = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| Item::new(&format!("{item}"), idx))
            .collect();

        let selected: Option<&usize> = menu.set_title(self.title.as_str()).add_list(list).select()?;

        Ok(selected.and_then(|idx| self.items.get(*idx).cloned()))
    }
}
