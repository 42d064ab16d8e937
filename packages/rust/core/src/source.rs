//! Loading the source document from a URL or a local file.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use pagebinder_shared::{PagebinderError, Result, SourceDocument};

/// User-Agent string for document requests.
const USER_AGENT: &str = concat!("Pagebinder/", env!("CARGO_PKG_VERSION"));

/// Load `input`, either an `http(s)://` / `file://` URL or a filesystem path.
#[instrument]
pub async fn load_source(input: &str) -> Result<SourceDocument> {
    match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => fetch(&url).await,
        Ok(url) if url.scheme() == "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| PagebinderError::config(format!("not a local file URL: {url}")))?;
            read_file(&path).await
        }
        _ => read_file(Path::new(input)).await,
    }
}

async fn fetch(url: &Url) -> Result<SourceDocument> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| PagebinderError::Network(format!("failed to build HTTP client: {e}")))?;

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| PagebinderError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PagebinderError::Network(format!("{url}: HTTP {status}")));
    }

    // Relative links resolve against where we ended up, not where we started.
    let final_url = response.url().clone();
    let html = response
        .text()
        .await
        .map_err(|e| PagebinderError::Network(format!("{url}: body read failed: {e}")))?;

    debug!(url = %final_url, len = html.len(), "document fetched");
    Ok(SourceDocument {
        html,
        url: final_url,
    })
}

async fn read_file(path: &Path) -> Result<SourceDocument> {
    let path = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| PagebinderError::io(path, e))?;
    let html = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| PagebinderError::io(&path, e))?;
    let url = Url::from_file_path(&path)
        .map_err(|_| PagebinderError::config(format!("cannot build URL for {}", path.display())))?;

    debug!(%url, len = html.len(), "document read");
    Ok(SourceDocument { html, url })
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn loads_http_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>hi</body></html>"))
            .mount(&server)
            .await;

        let source = load_source(&format!("{}/post", server.uri())).await.unwrap();
        assert!(source.html.contains("hi"));
        assert_eq!(source.url.path(), "/post");
    }

    #[tokio::test]
    async fn http_errors_are_network_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = load_source(&format!("{}/missing", server.uri())).await.unwrap_err();
        assert!(matches!(err, PagebinderError::Network(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn loads_local_paths_and_file_urls() {
        let dir = std::env::temp_dir().join(format!("pb-source-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("doc.html");
        std::fs::write(&file, "<p>local</p>").unwrap();

        let by_path = load_source(file.to_str().unwrap()).await.unwrap();
        assert_eq!(by_path.url.scheme(), "file");
        assert_eq!(by_path.html, "<p>local</p>");

        let by_url = load_source(by_path.url.as_str()).await.unwrap();
        assert_eq!(by_url, by_path);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_files_are_io_errors() {
        let err = load_source("/definitely/not/here.html").await.unwrap_err();
        assert!(matches!(err, PagebinderError::Io { .. }));
    }
}
