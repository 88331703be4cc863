use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;

use super::OutputFormat;
use listsync::config::{Config, ConfigValue};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

fn print_optional(key: &str, value: &ConfigValue<Option<String>>) {
    println!("{}: {}", key, value.value.as_deref().unwrap_or("(not set)"));
    println!("  source: {}", value.source);
    println!();
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        print_optional("user_id", &config.user_id);
                        print_optional("user_email", &config.user_email);

                        println!("sync.poll_rate: {}", config.sync.poll_rate.value);
                        println!("  source: {}", config.sync.poll_rate.source);
                        println!("sync.slow_interval_secs: {}", config.sync.slow_interval_secs);
                        println!(
                            "sync.default_interval_secs: {}",
                            config.sync.default_interval_secs
                        );
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'listsync config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let default_config = format!(
                    r#"# listsync configuration

# Path to SQLite database
# database_path: {}

# Lists belong to this user; leave unset to work logged out
# user_id: alice
# user_email: alice@example.com

sync:
  # off, slow or default
  poll_rate: default
  slow_interval_secs: 60
  default_interval_secs: 6
"#,
                    Config::default_data_dir().join("lists.db").display()
                );

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
