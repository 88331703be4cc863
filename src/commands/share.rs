use clap::{Args, Subcommand};

use super::{find_list, OutputFormat};
use listsync::{ListManager, ShareAccess};

#[derive(Args)]
pub struct ShareCommand {
    #[command(subcommand)]
    pub command: ShareSubcommand,
}

#[derive(Subcommand)]
pub enum ShareSubcommand {
    /// Share a list with someone, or change their access
    Set {
        /// List ID or name
        list: String,

        /// Email address to share with
        email: String,

        /// Access level: r, rw, owner (none removes the share)
        #[arg(long, short, default_value = "r")]
        access: ShareAccess,

        /// Link sent in the invitation
        #[arg(long)]
        accept_url: Option<String>,
    },

    /// Stop sharing a list with someone
    Rm {
        /// List ID or name
        list: String,

        /// Email address
        email: String,
    },

    /// Show who a list is shared with
    Ls {
        /// List ID or name
        list: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ShareCommand {
    pub async fn run(&self, manager: &ListManager) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ShareSubcommand::Set {
                list,
                email,
                access,
                accept_url,
            } => {
                let list = find_list(manager, list).await?;
                manager
                    .set_share_access(list.id, email, *access, accept_url.as_deref())
                    .await?;
                if *access == ShareAccess::None {
                    println!("Stopped sharing {} with {}", list.name, email);
                } else {
                    println!("Shared {} with {} ({})", list.name, email, access);
                }
                Ok(())
            }

            ShareSubcommand::Rm { list, email } => {
                let list = find_list(manager, list).await?;
                manager.remove_share(list.id, email).await?;
                println!("Stopped sharing {} with {}", list.name, email);
                Ok(())
            }

            ShareSubcommand::Ls { list, format } => {
                let list = find_list(manager, list).await?;
                let shares = manager.shares_in_list(list.id).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&shares)?);
                    }
                    OutputFormat::Text => {
                        if shares.is_empty() {
                            println!("{} is not shared.", list.name);
                            return Ok(());
                        }
                        println!("{:<40}  {:<6}  {:<8}  STATE", "EMAIL", "ACCESS", "ACCEPTED");
                        println!("{}", "-".repeat(72));
                        for share in &shares {
                            println!(
                                "{:<40}  {:<6}  {:<8}  {}",
                                share.user_email,
                                share.access.to_string(),
                                if share.accepted { "yes" } else { "no" },
                                share.state
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
