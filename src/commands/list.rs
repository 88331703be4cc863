use clap::{Args, Subcommand};

use super::{find_list, truncate, OutputFormat};
use listsync::ListManager;

#[derive(Args)]
pub struct ListCommand {
    #[command(subcommand)]
    pub command: ListSubcommand,
}

#[derive(Subcommand)]
pub enum ListSubcommand {
    /// Create a new shopping list
    Create {
        /// Name of the list
        name: String,
    },

    /// Rename a list
    Rename {
        /// List ID or name
        list: String,

        /// New name
        name: String,
    },

    /// Remove a list with all its items and shares
    Rm {
        /// List ID or name
        list: String,
    },

    /// Show all lists
    Ls {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ListCommand {
    pub async fn run(&self, manager: &ListManager) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ListSubcommand::Create { name } => {
                let (list, _) = manager.create_list(name).await?;
                println!("Created list: {} ({})", list.name, list.id);
                Ok(())
            }

            ListSubcommand::Rename { list, name } => {
                let mut found = find_list(manager, list).await?;
                let old_name = std::mem::replace(&mut found.name, name.clone());
                let (renamed, _) = manager.update_list(found).await?;
                println!("Renamed list '{}' to '{}'", old_name, renamed.name);
                Ok(())
            }

            ListSubcommand::Rm { list } => {
                let found = find_list(manager, list).await?;
                manager.remove_list(found.id).await?;
                println!("Removed list: {}", found.name);
                Ok(())
            }

            ListSubcommand::Ls { format } => {
                let lists = manager.lists().await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&lists)?);
                    }
                    OutputFormat::Text => {
                        if lists.is_empty() {
                            println!("No lists found.");
                            return Ok(());
                        }
                        println!("{:<36}  {:<30}  {:<8}  STATE", "ID", "NAME", "ACCESS");
                        println!("{}", "-".repeat(92));
                        for list in &lists {
                            println!(
                                "{:<36}  {:<30}  {:<8}  {}",
                                list.id,
                                truncate(&list.name, 30),
                                list.access.to_string(),
                                list.state
                            );
                        }
                        println!("\nTotal: {} list(s)", lists.len());
                    }
                }
                Ok(())
            }
        }
    }
}
