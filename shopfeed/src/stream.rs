use futures::TryStreamExt;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::error::FeedError;
use crate::feed::FeedSource;

/// One open feed stream. Dropping it releases the file handle or the HTTP
/// connection, so every exit path of the consumer closes the stream.
pub type FeedStream = Box<dyn AsyncRead + Send + Unpin>;

/// Open a byte stream for a feed: the file itself for `file` URLs, the
/// response body for `http`/`https`. Failures are fatal for this feed
/// only; the periodic driver re-attempts on the next tick.
pub async fn open_stream(feed: &FeedSource) -> Result<FeedStream, FeedError> {
    if feed.is_file() {
        let file = File::open(feed.file_path())
            .await
            .map_err(|source| FeedError::OpenFile {
                url: feed.key().to_string(),
                source,
            })?;
        return Ok(Box::new(file));
    }

    let fetch_err = |source| FeedError::Fetch {
        url: feed.key().to_string(),
        source,
    };
    let response = reqwest::get(feed.url().clone())
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(fetch_err)?;
    let body = response
        .bytes_stream()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));
    Ok(Box::new(StreamReader::new(body)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn opens_local_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<SHOP></SHOP>").unwrap();
        let url = format!("file://{}", file.path().display());
        let feed = FeedSource::parse(&url).unwrap();

        let mut stream = open_stream(&feed).await.unwrap();
        let mut content = String::new();
        stream.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "<SHOP></SHOP>");
    }

    #[tokio::test]
    async fn missing_file_fails_the_feed() {
        let feed = FeedSource::parse("file:///definitely/not/here.xml").unwrap();
        let result = open_stream(&feed).await;
        assert!(matches!(result, Err(FeedError::OpenFile { .. })));
    }
}
