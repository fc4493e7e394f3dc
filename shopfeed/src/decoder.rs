use quick_xml::events::{BytesStart, Event};
use quick_xml::{DeError, Reader, Writer};
use thiserror::Error;
use tokio::io::AsyncBufRead;

use crate::item::ShopItem;

const ITEM_TAG: &[u8] = b"SHOPITEM";

#[derive(Error, Debug)]
pub enum DecodeError {
    /// One item failed validation. The reader has already advanced past
    /// the offending element; the caller may keep pulling items.
    #[error("failed to decode shop item: {0}")]
    Item(#[source] DeError),
    /// The document itself is malformed; no forward progress is possible.
    #[error("malformed feed stream: {0}")]
    Stream(#[source] quick_xml::Error),
    #[error("feed stream failed: {0}")]
    Io(#[source] std::io::Error),
}

impl DecodeError {
    /// True when only the current item is affected and decoding can
    /// continue with the next one.
    pub fn is_item(&self) -> bool {
        matches!(self, DecodeError::Item(_))
    }
}

/// Pull decoder over a feed byte stream. Yields one validated item per
/// `<SHOPITEM>` element without ever buffering the whole document;
/// elements other than `SHOPITEM` are walked over, so a feed with zero
/// items drains cleanly.
pub struct FeedDecoder<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> FeedDecoder<R> {
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.config_mut().trim_text(true);
        FeedDecoder {
            reader,
            buf: Vec::new(),
        }
    }

    /// The next item, `Ok(None)` on clean end of input. Item-level
    /// failures are returned as `DecodeError::Item` and leave the decoder
    /// usable; everything else terminates the feed.
    pub async fn next_item(&mut self) -> Result<Option<ShopItem>, DecodeError> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into_async(&mut self.buf)
                .await
                .map_err(DecodeError::Stream)?;
            let start = match event {
                Event::Start(start) if start.name().as_ref() == ITEM_TAG => start.into_owned(),
                Event::Empty(start) if start.name().as_ref() == ITEM_TAG => {
                    return decode_item(single_empty_element(start)?).map(Some);
                }
                Event::Eof => return Ok(None),
                _ => continue,
            };
            let subtree = self.capture_subtree(start).await?;
            return decode_item(subtree).map(Some);
        }
    }

    /// Copy the current element's subtree, start tag through matching end
    /// tag, into an owned buffer. Consumes the element from the reader
    /// regardless of whether it later deserializes.
    async fn capture_subtree(&mut self, start: BytesStart<'static>) -> Result<Vec<u8>, DecodeError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Start(start))
            .map_err(DecodeError::Io)?;

        let mut depth = 0usize;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let event = self
                .reader
                .read_event_into_async(&mut buf)
                .await
                .map_err(DecodeError::Stream)?;
            let done = match &event {
                Event::Start(_) => {
                    depth += 1;
                    false
                }
                Event::End(_) => {
                    if depth == 0 {
                        true
                    } else {
                        depth -= 1;
                        false
                    }
                }
                Event::Eof => {
                    return Err(DecodeError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "feed stream ended inside a SHOPITEM element",
                    )));
                }
                _ => false,
            };
            writer.write_event(event).map_err(DecodeError::Io)?;
            if done {
                return Ok(writer.into_inner());
            }
        }
    }
}

fn single_empty_element(start: BytesStart<'_>) -> Result<Vec<u8>, DecodeError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Empty(start.into_owned()))
        .map_err(DecodeError::Io)?;
    Ok(writer.into_inner())
}

fn decode_item(subtree: Vec<u8>) -> Result<ShopItem, DecodeError> {
    quick_xml::de::from_reader(subtree.as_slice()).map_err(DecodeError::Item)
}
