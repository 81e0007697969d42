//! Book catalog: which chapter files exist and where they live.

use serde::{Deserialize, Serialize};

/// File extension of chapter text resources.
pub const CONTENT_EXTENSION: &str = "txt";

/// A book with a fixed number of chapters stored as
/// `data/<dir>/<prefix>-chapter<N>.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Lookup key used by the reader and the CLI (e.g. "revelation")
    pub key: String,
    pub title: String,
    pub dir: String,
    pub prefix: String,
    pub chapters: u32,
}

impl Book {
    pub fn new(key: &str, title: &str, dir: &str, prefix: &str, chapters: u32) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            dir: dir.to_string(),
            prefix: prefix.to_string(),
            chapters,
        }
    }

    pub fn revelation() -> Self {
        Self::new("revelation", "Revelation", "Rev", "R", 22)
    }

    pub fn isaiah() -> Self {
        Self::new("isaiah", "Isaiah", "Isa", "I", 66)
    }

    pub fn has_chapter(&self, chapter: u32) -> bool {
        (1..=self.chapters).contains(&chapter)
    }

    /// Relative path of one chapter file. Does not check the chapter range.
    pub fn chapter_path(&self, chapter: u32) -> String {
        format!(
            "data/{}/{}-chapter{}.{}",
            self.dir, self.prefix, chapter, CONTENT_EXTENSION
        )
    }

    /// Paths of every chapter, 1 through `chapters`.
    pub fn chapter_paths(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.chapters).map(|n| self.chapter_path(n))
    }

    /// Match a user-supplied name against key, title or directory, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        [&self.key, &self.title, &self.dir]
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(name))
    }
}

pub fn find_book<'a>(books: &'a [Book], name: &str) -> Option<&'a Book> {
    books.iter().find(|b| b.matches(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_path_layout() {
        assert_eq!(Book::revelation().chapter_path(1), "data/Rev/R-chapter1.txt");
        assert_eq!(Book::isaiah().chapter_path(66), "data/Isa/I-chapter66.txt");
    }

    #[test]
    fn test_chapter_paths_cover_every_chapter() {
        let rev: Vec<_> = Book::revelation().chapter_paths().collect();
        assert_eq!(rev.len(), 22);
        assert_eq!(rev.first().map(String::as_str), Some("data/Rev/R-chapter1.txt"));
        assert_eq!(rev.last().map(String::as_str), Some("data/Rev/R-chapter22.txt"));
        assert_eq!(Book::isaiah().chapter_paths().count(), 66);
    }

    #[test]
    fn test_has_chapter_bounds() {
        let rev = Book::revelation();
        assert!(!rev.has_chapter(0));
        assert!(rev.has_chapter(1));
        assert!(rev.has_chapter(22));
        assert!(!rev.has_chapter(23));
    }

    #[test]
    fn test_find_book_case_insensitive() {
        let books = vec![Book::revelation(), Book::isaiah()];
        assert_eq!(find_book(&books, "REV").map(|b| b.chapters), Some(22));
        assert_eq!(find_book(&books, "isaiah").map(|b| b.chapters), Some(66));
        assert_eq!(find_book(&books, "Isaiah").map(|b| b.prefix.as_str()), Some("I"));
        assert!(find_book(&books, "genesis").is_none());
    }
}
