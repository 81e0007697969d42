//! Foreground chapter reader.
//!
//! Opening a chapter aborts whatever chapter request was still in flight,
//! so a slow earlier chapter never overwrites the one the user picked last.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog::{find_book, Book};
use crate::error::ReaderError;
use crate::http::{Request, Response};
use crate::worker::ServiceWorker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterView {
    /// Chapter body, surrounding whitespace trimmed
    Text(String),
    Empty,
    /// Neither network nor cache had the chapter
    Unavailable,
    /// A later `open` aborted this one
    Superseded,
}

impl ChapterView {
    pub fn from_response(response: &Response) -> Self {
        if response.is_fallback() || !response.is_ok() {
            return ChapterView::Unavailable;
        }
        let text = response.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            ChapterView::Empty
        } else {
            ChapterView::Text(trimmed.to_string())
        }
    }
}

pub struct Reader {
    worker: Arc<ServiceWorker>,
    current: Mutex<Option<CancellationToken>>,
}

impl Reader {
    pub fn new(worker: Arc<ServiceWorker>) -> Self {
        Self {
            worker,
            current: Mutex::new(None),
        }
    }

    pub fn books(&self) -> &[Book] {
        &self.worker.config().books
    }

    pub fn book(&self, name: &str) -> Result<&Book, ReaderError> {
        find_book(self.books(), name).ok_or_else(|| ReaderError::UnknownBook(name.to_string()))
    }

    pub async fn open(&self, book: &str, chapter: u32) -> Result<ChapterView, ReaderError> {
        let book = self.book(book)?;
        if !book.has_chapter(chapter) {
            return Err(ReaderError::ChapterOutOfRange {
                book: book.title.clone(),
                chapter,
                chapters: book.chapters,
            });
        }
        let request = Request::get(self.worker.scope(), &book.chapter_path(chapter))?;

        let token = CancellationToken::new();
        let previous = self.current.lock().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let response = self.worker.fetch_with_signal(&request, &token).await;
        if token.is_cancelled() {
            debug!(book = %book.title, chapter, "Chapter request superseded");
            return Ok(ChapterView::Superseded);
        }
        Ok(ChapterView::from_response(&response))
    }
}
