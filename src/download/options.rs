use crate::models::package::Checksum;

/// Maximum allowed download size (8GB)
pub const MAX_DOWNLOAD_SIZE: u64 = 8 * 1_073_741_824;

/// Options for configuring download behavior
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Expected checksum of the downloaded file
    pub checksum: Option<Checksum>,

    /// Maximum allowed file size
    pub max_size: u64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            checksum: None,
            max_size: MAX_DOWNLOAD_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_options_default() {
        let options = DownloadOptions::default();
        assert_eq!(options.checksum, None);
        assert_eq!(options.max_size, MAX_DOWNLOAD_SIZE);
    }
}
