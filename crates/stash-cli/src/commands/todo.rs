use std::io::{self, Write};

use stash_core::alert::UserAction;
use stash_core::collections::TaskList;
use stash_core::mirror::MirrorPolicy;
use stash_core::store::DocumentStore;

use crate::cli::TodoCommands;
use crate::commands::common::{format_task_lines, resolve_id, task_to_list_item, Workspace};
use crate::error::CliError;

pub async fn run_todo(command: TodoCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let workspace = Workspace::open(global_profile)?;
    let tasks = TaskList::new(
        workspace.store.clone(),
        workspace.config.tasks_collection(),
        MirrorPolicy::ApplyOnAck,
    );
    let _watcher = workspace.mount_screen(tasks.session_target()).await?;

    run_todo_command(command, &tasks, &mut io::stdout()).await
}

/// Runs one todo action against an already loaded list.
pub async fn run_todo_command<S: DocumentStore + ?Sized + 'static>(
    command: TodoCommands,
    tasks: &TaskList<S>,
    out: &mut impl Write,
) -> Result<(), CliError> {
    match command {
        TodoCommands::List { json } => {
            let items = tasks.tasks();
            if json {
                let json_items = items.iter().map(task_to_list_item).collect::<Vec<_>>();
                writeln!(out, "{}", serde_json::to_string_pretty(&json_items)?)?;
            } else if items.is_empty() {
                writeln!(out, "No todos yet. Add one with `stash todo add <text>`.")?;
            } else {
                for line in format_task_lines(&items) {
                    writeln!(out, "{line}")?;
                }
            }
        }
        TodoCommands::Add { text } => {
            let task = tasks
                .add(&text.join(" "))
                .await
                .map_err(CliError::during(UserAction::Add))?;
            writeln!(out, "{}", task.id)?;
        }
        TodoCommands::Toggle { id } => {
            let id = resolve_id(&id, tasks.tasks().iter().map(|task| task.id.as_str()))?;
            let task = tasks
                .toggle(&id)
                .await
                .map_err(CliError::during(UserAction::Update))?;
            let state = if task.completed { "done" } else { "not done" };
            writeln!(out, "{} marked {state}: {}", task.id, task.task)?;
        }
        TodoCommands::Delete { id } => {
            let id = resolve_id(&id, tasks.tasks().iter().map(|task| task.id.as_str()))?;
            tasks
                .remove(&id)
                .await
                .map_err(CliError::during(UserAction::Delete))?;
            writeln!(out, "{id}")?;
        }
    }
    Ok(())
}
