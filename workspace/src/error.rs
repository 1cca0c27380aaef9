use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// The host removed a folder this workspace never saw added.
    #[error("unknown workspace folder: {uri}")]
    UnknownFolder { uri: Url },
    #[error("workspace folder is not a local path: {uri}")]
    NotAFileUri { uri: Url },
}
