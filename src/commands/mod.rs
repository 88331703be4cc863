mod config_cmd;
mod item;
mod list;
mod share;

pub use config_cmd::ConfigCommand;
pub use item::ItemCommand;
pub use list::ListCommand;
pub use share::ShareCommand;

use clap::ValueEnum;
use uuid::Uuid;

use listsync::{ListManager, ShoppingList};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Find a visible list by id, or by exact name (case-insensitive).
pub async fn find_list(
    manager: &ListManager,
    identifier: &str,
) -> Result<ShoppingList, Box<dyn std::error::Error>> {
    if let Ok(id) = Uuid::parse_str(identifier) {
        if let Some(list) = manager.get_list(id).await? {
            return Ok(list);
        }
    }

    let mut matches: Vec<ShoppingList> = manager
        .lists()
        .await?
        .into_iter()
        .filter(|list| list.name.eq_ignore_ascii_case(identifier))
        .collect();
    match matches.len() {
        0 => Err(format!("List not found: {}", identifier).into()),
        1 => Ok(matches.remove(0)),
        n => Err(format!("{} lists are named '{}', use the id instead", n, identifier).into()),
    }
}

/// Shorten a name for table output.
pub fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() > width {
        let cut: String = name.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        name.to_string()
    }
}
