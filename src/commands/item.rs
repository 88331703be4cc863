use clap::{Args, Subcommand};
use uuid::Uuid;

use super::{find_list, truncate, OutputFormat};
use listsync::{ItemFilter, ListItem, ListManager, PrevItem};

#[derive(Args)]
pub struct ItemCommand {
    #[command(subcommand)]
    pub command: ItemSubcommand,
}

#[derive(Subcommand)]
pub enum ItemSubcommand {
    /// Add an item to a list
    Add {
        /// List ID or name
        list: String,

        /// Item description
        name: String,

        /// Quantity
        #[arg(long, short, default_value_t = 1)]
        count: i64,

        /// Insert after this item (ID or name) instead of at the end
        #[arg(long, conflicts_with = "first")]
        after: Option<String>,

        /// Insert at the top of the list
        #[arg(long)]
        first: bool,

        /// Free-form comment
        #[arg(long)]
        comment: Option<String>,
    },

    /// Mark an item as bought
    Tick {
        /// List ID or name
        list: String,

        /// Item ID or name
        item: String,
    },

    /// Clear the bought mark of an item
    Untick {
        /// List ID or name
        list: String,

        /// Item ID or name
        item: String,
    },

    /// Move an item to another position
    Mv {
        /// List ID or name
        list: String,

        /// Item ID or name
        item: String,

        /// Place after this item (ID or name); omit to move to the top
        #[arg(long)]
        after: Option<String>,
    },

    /// Remove an item
    Rm {
        /// List ID or name
        list: String,

        /// Item ID or name
        item: String,
    },

    /// Remove every item matching a filter
    Clear {
        /// List ID or name
        list: String,

        /// Which items to remove: all, ticked, unticked
        #[arg(long, default_value = "ticked")]
        filter: ItemFilter,
    },

    /// Show the items of a list in order
    Ls {
        /// List ID or name
        list: String,

        /// Which items to show: all, ticked, unticked
        #[arg(long, default_value = "all")]
        filter: ItemFilter,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ItemCommand {
    pub async fn run(&self, manager: &ListManager) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ItemSubcommand::Add {
                list,
                name,
                count,
                after,
                first,
                comment,
            } => {
                let list = find_list(manager, list).await?;
                let mut item = ListItem::new(list.id, name.as_str()).with_count(*count);
                if *first {
                    item = item.with_prev(PrevItem::First);
                } else if let Some(after) = after {
                    let prev = find_item(manager, list.id, after).await?;
                    item = item.with_prev(PrevItem::After(prev.id));
                }
                if let Some(comment) = comment {
                    item = item.with_comment(comment.as_str());
                }

                let (item, _) = manager.add_item(item).await?;
                println!("Added '{}' to {} ({})", item.name, list.name, item.id);
                Ok(())
            }

            ItemSubcommand::Tick { list, item } | ItemSubcommand::Untick { list, item } => {
                let ticked = matches!(self.command, ItemSubcommand::Tick { .. });
                let list = find_list(manager, list).await?;
                let mut item = find_item(manager, list.id, item).await?;
                if item.ticked == ticked {
                    println!("Nothing to do: '{}' is already {}", item.name, tick_word(ticked));
                    return Ok(());
                }
                item.ticked = ticked;
                let (item, _) = manager.update_item(item).await?;
                println!("Marked '{}' as {}", item.name, tick_word(ticked));
                Ok(())
            }

            ItemSubcommand::Mv { list, item, after } => {
                let list = find_list(manager, list).await?;
                let item = find_item(manager, list.id, item).await?;
                let after = match after {
                    Some(after) => Some(find_item(manager, list.id, after).await?.id),
                    None => None,
                };
                manager.move_item(item.id, after).await?;
                println!("Moved '{}'", item.name);
                Ok(())
            }

            ItemSubcommand::Rm { list, item } => {
                let list = find_list(manager, list).await?;
                let item = find_item(manager, list.id, item).await?;
                manager.remove_item(item.id).await?;
                println!("Removed '{}' from {}", item.name, list.name);
                Ok(())
            }

            ItemSubcommand::Clear { list, filter } => {
                let list = find_list(manager, list).await?;
                let removed = manager.remove_all_items(list.id, *filter).await?;
                println!("Removed {} item(s) from {}", removed, list.name);
                Ok(())
            }

            ItemSubcommand::Ls {
                list,
                filter,
                format,
            } => {
                let list = find_list(manager, list).await?;
                let items: Vec<ListItem> = manager
                    .items_sorted(list.id)
                    .await?
                    .into_iter()
                    .filter(|item| filter.matches(item))
                    .collect();

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&items)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", list.name);
                        println!("{}", "=".repeat(list.name.chars().count()));
                        if items.is_empty() {
                            println!("\nNo items.");
                            return Ok(());
                        }
                        for item in &items {
                            let mark = if item.ticked { "x" } else { " " };
                            let count = if item.count > 1 {
                                format!(" x{}", item.count)
                            } else {
                                String::new()
                            };
                            println!("[{}] {}{}", mark, truncate(&item.name, 50), count);
                            if let Some(comment) = item.comment() {
                                println!("      {}", comment);
                            }
                        }
                        println!("\nTotal: {} item(s)", items.len());
                    }
                }
                Ok(())
            }
        }
    }
}

fn tick_word(ticked: bool) -> &'static str {
    if ticked {
        "ticked"
    } else {
        "unticked"
    }
}

/// Find an item of a list by id, or by name (case-insensitive, first in order).
async fn find_item(
    manager: &ListManager,
    list_id: Uuid,
    identifier: &str,
) -> Result<ListItem, Box<dyn std::error::Error>> {
    if let Ok(id) = Uuid::parse_str(identifier) {
        if let Some(item) = manager.get_item(id).await? {
            if item.list_id == list_id {
                return Ok(item);
            }
        }
    }

    manager
        .items_sorted(list_id)
        .await?
        .into_iter()
        .find(|item| item.name.eq_ignore_ascii_case(identifier))
        .ok_or_else(|| format!("Item not found: {}", identifier).into())
}
