use clap::{Parser, Subcommand};

const LONG_ABOUT: &str = r#"
kb - command-line client for a Kanban project server

Every command loads the current project, applies one change optimistically,
waits for the server to confirm it, and prints the resulting board. If the
server rejects the change, the board is rolled back and the error is printed
as JSON on stderr.

Configuration (lowest to highest precedence):
  ~/.kanban-sync/config.json   serverUrl, userId, projectId, requestTimeoutMs
  KANBAN_SERVER_URL, KANBAN_USER, KANBAN_PROJECT, KANBAN_TIMEOUT_MS
  --server, --user, --project

Examples:
  kb board
  kb task add <list-id> "Write release notes" --priority high
  kb task move <task-id> <list-id> 0
  kb list move <list-id> 2
  kb watch
"#;

#[derive(Parser, Clone)]
#[command(name = "kb")]
#[command(about = "Kanban board client with optimistic updates and live sync")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Project to operate on
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Server base URL, e.g. http://localhost:3000
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Signed-in user id (sent as the bearer token)
    #[arg(long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Show the board: lists, tasks and a summary
    Board {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create, move, rename and delete lists
    #[command(subcommand)]
    List(ListCommands),

    /// Create, move, update and delete tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Follow the project's live feed and redraw on every change
    Watch {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ListCommands {
    /// Append a list to the project
    ///
    /// Examples:
    ///   kb list add "In review"
    Add {
        title: String,

        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Move a list to a new column index (0-based)
    Move {
        id: String,

        index: usize,

        #[arg(long, default_value = "text")]
        format: String,
    },

    Rename {
        id: String,

        title: String,

        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Delete a list and every task in it
    Delete {
        id: String,

        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum TaskCommands {
    /// Append a task to a list
    ///
    /// Examples:
    ///   kb task add <list-id> "Fix login redirect"
    ///   kb task add <list-id> "Ship 1.0" --priority high --due 2026-11-01
    Add {
        /// List to append to
        list: String,

        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// low, medium or high (default: medium)
        #[arg(short, long)]
        priority: Option<String>,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Move a task to an index (0-based) of a list
    ///
    /// Examples:
    ///   kb task move <task-id> <list-id> 0
    Move {
        id: String,

        /// Target list
        list: String,

        index: usize,

        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Move several tasks to the end of a list, keeping their board order
    MoveMany {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Target list
        #[arg(long)]
        to: String,

        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Update task fields; omitted fields stay as they are
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,

        #[arg(short, long)]
        priority: Option<String>,

        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        #[arg(long)]
        clear_due: bool,

        #[arg(long, conflicts_with = "unassign")]
        assignee: Option<String>,

        #[arg(long)]
        unassign: bool,

        #[arg(long, default_value = "text")]
        format: String,
    },

    Delete {
        id: String,

        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Delete several tasks in one request
    BulkDelete {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(long, default_value = "text")]
        format: String,
    },
}
