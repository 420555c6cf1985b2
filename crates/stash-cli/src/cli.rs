use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "stash")]
#[command(about = "Personal todos and media from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name for auth/service configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in, sign up, sign out
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Manage your todo list
    Todo {
        #[command(subcommand)]
        command: TodoCommands,
    },
    /// Manage your uploaded media
    Media {
        #[command(subcommand)]
        command: MediaCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with email/password and store the session in the keychain
    Login {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Create an account
    Signup {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show who is signed in
    Status,
}

#[derive(Subcommand)]
pub enum TodoCommands {
    /// List your todos, newest first
    #[command(alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a todo
    #[command(alias = "new")]
    Add {
        /// Todo text
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Mark a todo done, or not done
    Toggle {
        /// Todo ID or unique ID prefix
        id: String,
    },
    /// Delete a todo
    #[command(alias = "rm")]
    Delete {
        /// Todo ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum MediaCommands {
    /// List your uploaded media, newest first
    #[command(alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload a photo, video or audio file
    Upload {
        /// Local file to upload
        path: PathBuf,
    },
    /// Remove a media entry from your library
    #[command(alias = "rm")]
    Delete {
        /// Media ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Cloudinary cloud name
        #[arg(long, value_name = "NAME")]
        cloudinary_cloud_name: Option<String>,
        /// Cloudinary unsigned upload preset
        #[arg(long, value_name = "PRESET")]
        cloudinary_upload_preset: Option<String>,
        /// Cloudinary API base URL override
        #[arg(long, value_name = "URL")]
        cloudinary_base_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the resolved configuration for a profile
    Show,
}
