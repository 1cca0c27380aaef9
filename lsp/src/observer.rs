//! Folder events from the workspace, applied to the manager.

use std::sync::Arc;

use kestrel_types::FolderEvent;
use kestrel_workspace::{FolderContext, FolderObserver, ObserverFut};
use tokio::sync::Mutex;

use crate::manager::LanguageClientManager;

pub struct ManagerObserver {
    manager: Arc<Mutex<LanguageClientManager>>,
}

impl ManagerObserver {
    #[must_use]
    pub fn new(manager: Arc<Mutex<LanguageClientManager>>) -> Self {
        Self { manager }
    }
}

impl FolderObserver for ManagerObserver {
    fn on_folder_event<'a>(
        &'a self,
        folder: Option<&'a Arc<FolderContext>>,
        event: FolderEvent,
    ) -> ObserverFut<'a> {
        Box::pin(async move {
            let mut manager = self.manager.lock().await;
            match (event, folder) {
                (FolderEvent::Add, Some(folder)) => manager.folder_added(folder).await,
                (FolderEvent::Remove, Some(folder)) => manager.folder_removed(folder.uri()).await,
                (FolderEvent::Focus, folder) => manager.folder_focused(folder.map(|f| f.uri())),
                (FolderEvent::Unfocus, folder) => {
                    tracing::trace!(folder = ?folder.map(|f| f.uri().as_str()), "Folder unfocused");
                }
                (event, None) => tracing::debug!(%event, "Folder event without a folder"),
            }
            Ok(())
        })
    }
}
