use crate::error::UpdaterError;

pub fn get_exit_code(error: &UpdaterError) -> i32 {
    match error {
        UpdaterError::InvalidVersion(_)
        | UpdaterError::InvalidRelation(_)
        | UpdaterError::RepositoryConfig { .. }
        | UpdaterError::Config(_)
        | UpdaterError::ConfigSource(_) => 2,

        UpdaterError::ProductNotFound(_) => 3,

        UpdaterError::ChecksumMismatch { .. } => 4,

        UpdaterError::NetworkError(_)
        | UpdaterError::Http(_)
        | UpdaterError::CatalogScan { .. }
        | UpdaterError::Download(_) => 20,

        UpdaterError::ControlPlane(_) | UpdaterError::RpcError { .. } => 21,

        UpdaterError::Notification(_)
        | UpdaterError::Smtp(_)
        | UpdaterError::MailAddress(_)
        | UpdaterError::MailMessage(_) => 22,

        _ => 1,
    }
}
