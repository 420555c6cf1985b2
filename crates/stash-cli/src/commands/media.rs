use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use stash_core::alert::{Alert, UserAction};
use stash_core::auth::SessionFeed;
use stash_core::collections::MediaLibrary;
use stash_core::media::MediaEndpoint;
use stash_core::mirror::MirrorPolicy;
use stash_core::picker::FilePathPicker;
use stash_core::store::DocumentStore;
use stash_core::upload::UploadPipeline;

use crate::cli::MediaCommands;
use crate::commands::common::{format_media_lines, media_to_list_item, resolve_id, Workspace};
use crate::error::CliError;

pub async fn run_media(command: MediaCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let workspace = Workspace::open(global_profile)?;
    let library = Arc::new(MediaLibrary::new(
        workspace.store.clone(),
        workspace.config.media_collection(),
        MirrorPolicy::ApplyOnAck,
    ));
    let _watcher = workspace.mount_screen(library.session_target()).await?;
    let mut out = io::stdout();

    match command {
        MediaCommands::List { json } => list_media(&library, json, &mut out),
        MediaCommands::Upload { path } => {
            let endpoint = workspace
                .config
                .cloudinary_client()
                .map_err(CliError::during(UserAction::Upload))?;
            upload_file(
                &path,
                Arc::new(endpoint),
                library,
                workspace.feed().clone(),
                &mut out,
            )
            .await
        }
        MediaCommands::Delete { id } => delete_media(&library, &id, &mut out).await,
    }
}

pub fn list_media<S: DocumentStore + ?Sized + 'static>(
    library: &MediaLibrary<S>,
    as_json: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let items = library.items();
    if as_json {
        let json_items = items.iter().map(media_to_list_item).collect::<Vec<_>>();
        writeln!(out, "{}", serde_json::to_string_pretty(&json_items)?)?;
    } else if items.is_empty() {
        writeln!(out, "No media yet. Upload with `stash media upload <path>`.")?;
    } else {
        for line in format_media_lines(&items) {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

/// Picks `path`, uploads it and indexes it in `library`.
pub async fn upload_file<S: DocumentStore + ?Sized + 'static>(
    path: &Path,
    endpoint: Arc<dyn MediaEndpoint>,
    library: Arc<MediaLibrary<S>>,
    feed: SessionFeed,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let pipeline = UploadPipeline::new(FilePathPicker::new(path), endpoint, library, feed);
    let picked = pipeline
        .pick()
        .await
        .map_err(CliError::during(UserAction::Pick))?
        .ok_or_else(|| CliError::NothingSelected(path.display().to_string()))?;

    writeln!(out, "Uploading {}...", picked.name)?;
    let item = pipeline
        .upload()
        .await
        .map_err(CliError::during(UserAction::Upload))?;
    writeln!(out, "{}", Alert::success("Media uploaded successfully!"))?;
    writeln!(out, "{}  {}", item.id, item.url)?;
    Ok(())
}

pub async fn delete_media<S: DocumentStore + ?Sized + 'static>(
    library: &MediaLibrary<S>,
    id: &str,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let id = resolve_id(id, library.items().iter().map(|item| item.id.as_str()))?;
    library
        .remove(&id)
        .await
        .map_err(CliError::during(UserAction::Delete))?;
    writeln!(out, "{}", Alert::success("Media deleted successfully!"))?;
    writeln!(out, "{id}")?;
    Ok(())
}
