#[cfg(test)]
mod tests {
    use crate::download::{DownloadOptions, HttpClient, HttpFileDownloader, HttpResponse};
    use crate::error::{Result, UpdaterError};
    use crate::models::package::Checksum;
    use std::io::{Cursor, Read};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::tempdir;

    struct MockHttpClient {
        responses: Vec<MockResponse>,
        request_count: Arc<Mutex<usize>>,
    }

    struct MockResponse {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    }

    impl MockHttpClient {
        fn new(responses: Vec<MockResponse>) -> Self {
            Self {
                responses,
                request_count: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl HttpClient for MockHttpClient {
        fn get(&self, _url: &str) -> Result<Box<dyn HttpResponse>> {
            let mut count = self.request_count.lock().unwrap();
            if *count >= self.responses.len() {
                return Err(UpdaterError::NetworkError(
                    "No more mock responses".to_string(),
                ));
            }

            let response = &self.responses[*count];
            *count += 1;

            Ok(Box::new(MockHttpResponse {
                status: response.status,
                headers: response.headers.clone(),
                body: Cursor::new(response.body.clone()),
            }))
        }

        fn set_timeout(&mut self, _timeout: Duration) {}
    }

    struct MockHttpResponse {
        status: u16,
        headers: Vec<(String, String)>,
        body: Cursor<Vec<u8>>,
    }

    impl Read for MockHttpResponse {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.body.read(buf)
        }
    }

    impl HttpResponse for MockHttpResponse {
        fn status(&self) -> u16 {
            self.status
        }

        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        fn final_url(&self) -> Option<&str> {
            None
        }
    }

    fn ok_response(body: &[u8]) -> MockResponse {
        MockResponse {
            status: 200,
            headers: vec![("Content-Length".to_string(), body.len().to_string())],
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_download_with_mock_client() {
        let mock_client = MockHttpClient::new(vec![ok_response(b"Hello, depot!")]);

        let mut downloader = HttpFileDownloader::with_client(Box::new(mock_client));
        let temp_dir = tempdir().unwrap();
        let dest_path = temp_dir.path().join("hello_1.0-1.opsi");

        let result = downloader.download(
            "http://example.com/hello_1.0-1.opsi",
            &dest_path,
            &DownloadOptions::default(),
        );

        assert!(result.is_ok());
        assert_eq!(std::fs::read(&dest_path).unwrap(), b"Hello, depot!");
    }

    #[test]
    fn test_download_checksum_match() {
        let mock_client = MockHttpClient::new(vec![ok_response(b"Hello, World!")]);
        let mut downloader = HttpFileDownloader::with_client(Box::new(mock_client));
        let temp_dir = tempdir().unwrap();
        let dest_path = temp_dir.path().join("pkg.opsi");

        let options = DownloadOptions {
            checksum: Some(Checksum::md5("65a8e27d8879283831b664bd8b7f0ad4")),
            ..Default::default()
        };
        downloader
            .download("http://example.com/pkg.opsi", &dest_path, &options)
            .unwrap();
        assert!(dest_path.exists());
    }

    #[test]
    fn test_download_checksum_mismatch_leaves_no_file() {
        let mock_client = MockHttpClient::new(vec![ok_response(b"tampered")]);
        let mut downloader = HttpFileDownloader::with_client(Box::new(mock_client));
        let temp_dir = tempdir().unwrap();
        let dest_path = temp_dir.path().join("pkg.opsi");

        let options = DownloadOptions {
            checksum: Some(Checksum::md5("65a8e27d8879283831b664bd8b7f0ad4")),
            ..Default::default()
        };
        let result = downloader.download("http://example.com/pkg.opsi", &dest_path, &options);

        assert!(matches!(result, Err(UpdaterError::ChecksumMismatch { .. })));
        assert!(!dest_path.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_download_http_error() {
        let mock_client = MockHttpClient::new(vec![MockResponse {
            status: 404,
            headers: vec![],
            body: vec![],
        }]);

        let mut downloader = HttpFileDownloader::with_client(Box::new(mock_client));
        let temp_dir = tempdir().unwrap();
        let dest_path = temp_dir.path().join("pkg.opsi");

        let result = downloader.download(
            "http://example.com/pkg.opsi",
            &dest_path,
            &DownloadOptions::default(),
        );

        assert!(matches!(result, Err(UpdaterError::NetworkError(_))));
        assert!(!dest_path.exists());
    }

    #[test]
    fn test_download_size_limit() {
        let mock_client = MockHttpClient::new(vec![MockResponse {
            status: 200,
            headers: vec![("Content-Length".to_string(), "2000".to_string())],
            body: vec![0; 10],
        }]);

        let mut downloader = HttpFileDownloader::with_client(Box::new(mock_client));
        let temp_dir = tempdir().unwrap();
        let dest_path = temp_dir.path().join("big.opsi");

        let options = DownloadOptions {
            max_size: 1000,
            ..Default::default()
        };
        let result = downloader.download("http://example.com/big.opsi", &dest_path, &options);
        assert!(matches!(result, Err(UpdaterError::Download(_))));
    }

    #[test]
    fn test_download_truncated_body() {
        let mock_client = MockHttpClient::new(vec![MockResponse {
            status: 200,
            headers: vec![("Content-Length".to_string(), "100".to_string())],
            body: vec![1; 10],
        }]);

        let mut downloader = HttpFileDownloader::with_client(Box::new(mock_client));
        let temp_dir = tempdir().unwrap();
        let dest_path = temp_dir.path().join("short.opsi");

        let result = downloader.download(
            "http://example.com/short.opsi",
            &dest_path,
            &DownloadOptions::default(),
        );
        assert!(matches!(result, Err(UpdaterError::Download(_))));
        assert!(!dest_path.exists());
    }

    #[test]
    fn test_download_replaces_existing_file() {
        let mock_client = MockHttpClient::new(vec![ok_response(b"new content")]);
        let mut downloader = HttpFileDownloader::with_client(Box::new(mock_client));
        let temp_dir = tempdir().unwrap();
        let dest_path = temp_dir.path().join("pkg.opsi");
        std::fs::write(&dest_path, b"old").unwrap();

        downloader
            .download("http://example.com/pkg.opsi", &dest_path, &DownloadOptions::default())
            .unwrap();
        assert_eq!(std::fs::read(&dest_path).unwrap(), b"new content");
    }
}
