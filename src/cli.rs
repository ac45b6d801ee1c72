use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chat with an assistant that keeps track of your pantry and suggests recipes.
///
/// Say things like "Add 2 apples" or "Remove 1 milk" to change the inventory,
/// or ask for recipe ideas based on what you have and your taste profile.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// Path to the SQLite pantry database (overrides CHEFBYTE_DB)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive chat session
    Chat {
        /// Model to use (overrides CHEFBYTE_MODEL)
        #[arg(short, long)]
        model: Option<String>,

        /// Apply each modification batch all-or-nothing
        #[arg(long)]
        atomic: bool,
    },
    /// Apply a modification payload directly, without the assistant
    Apply {
        /// JSON payload, or @path to read it from a file
        payload: String,

        /// Apply the batch all-or-nothing
        #[arg(long)]
        atomic: bool,
    },
    /// Show the pantry
    Inventory {
        /// Print CSV instead of a table
        #[arg(long)]
        csv: bool,
    },
    /// Show or update the taste profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Remove every item from the pantry
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Print the current taste profile
    Show,
    /// Save a new taste profile
    Set {
        /// Free-form preferences, e.g. "vegetarian, loves spicy food"
        text: String,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply_with_global_db() {
        let cli = Cli::try_parse_from([
            "chefbyte",
            "apply",
            "--atomic",
            r#"{"items": []}"#,
            "--db",
            "pantry.db",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("pantry.db")));
        assert!(matches!(
            cli.command,
            Command::Apply { atomic: true, ref payload } if payload == r#"{"items": []}"#
        ));
    }

    #[test]
    fn test_parse_profile_set() {
        let cli = Cli::try_parse_from(["chefbyte", "profile", "set", "no mushrooms"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Profile { action: ProfileAction::Set { ref text } } if text == "no mushrooms"
        ));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["chefbyte"]).is_err());
    }
}
