use crate::download::client::{AttohttpcClient, HttpClient, HttpResponse};
use crate::download::options::DownloadOptions;
use crate::download::progress::ProgressReporter;
use crate::error::{Result, UpdaterError};
use crate::security::verify_checksum;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

pub struct HttpFileDownloader {
    pub(crate) http_client: Box<dyn HttpClient>,
    progress_reporter: Option<Box<dyn ProgressReporter>>,
}

impl Default for HttpFileDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFileDownloader {
    pub fn new() -> Self {
        Self::with_client(Box::new(AttohttpcClient::new()))
    }

    pub fn with_client(http_client: Box<dyn HttpClient>) -> Self {
        Self {
            http_client,
            progress_reporter: None,
        }
    }

    pub fn with_progress_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Stream `url` into `destination`.
    ///
    /// The body lands in a temporary file next to `destination` and only
    /// replaces it once the optional checksum matched, so a failed or
    /// corrupt transfer never leaves a file at `destination`.
    pub fn download(
        &mut self,
        url: &str,
        destination: &Path,
        options: &DownloadOptions,
    ) -> Result<PathBuf> {
        let parent = destination.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let response = self.http_client.get(url)?;
        self.validate_response(response.as_ref(), options.max_size)?;
        let total_size = self.get_total_size(response.as_ref());

        if let Some(reporter) = &mut self.progress_reporter {
            reporter.on_start(total_size);
        }

        let temp_file = NamedTempFile::new_in(parent)?;
        let written = self.download_to_file(response, temp_file.as_file())?;

        if total_size > 0 && written != total_size {
            return Err(UpdaterError::Download(format!(
                "Incomplete transfer of {url}: got {written} of {total_size} bytes"
            )));
        }

        if let Some(expected) = &options.checksum {
            verify_checksum(temp_file.path(), expected)?;
        }

        temp_file
            .persist(destination)
            .map_err(|e| UpdaterError::Io(e.error))?;

        if let Some(reporter) = &mut self.progress_reporter {
            reporter.on_complete();
        }

        Ok(destination.to_path_buf())
    }

    fn validate_response(&self, response: &dyn HttpResponse, max_size: u64) -> Result<()> {
        let status = response.status();

        if !(200..300).contains(&status) {
            return Err(UpdaterError::NetworkError(format!(
                "Download failed with status: {status}"
            )));
        }

        if let Some(content_length) = response.header("Content-Length")
            && let Ok(length) = content_length.parse::<u64>()
            && length > max_size
        {
            return Err(UpdaterError::Download(format!(
                "Download size {length} exceeds maximum allowed size {max_size}"
            )));
        }

        Ok(())
    }

    fn get_total_size(&self, response: &dyn HttpResponse) -> u64 {
        response
            .header("Content-Length")
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0)
    }

    fn download_to_file(
        &mut self,
        mut response: Box<dyn HttpResponse>,
        file: &fs::File,
    ) -> Result<u64> {
        let mut writer = BufWriter::new(file);
        let mut downloaded = 0u64;
        let mut buffer = vec![0; DOWNLOAD_CHUNK_SIZE];

        loop {
            match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    writer.write_all(&buffer[..n])?;
                    downloaded += n as u64;

                    if let Some(reporter) = &mut self.progress_reporter {
                        reporter.on_progress(downloaded);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        writer.flush()?;
        Ok(downloaded)
    }
}

#[cfg(test)]
#[path = "http_file_downloader_tests.rs"]
mod http_file_downloader_tests;
