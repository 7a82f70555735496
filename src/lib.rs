//! Import EPUB books into a Markdown vault: one note per page, attachments
//! copied as-is, internal links rewritten to block references.

pub mod archive;
pub mod asset;
pub mod book;
pub mod error;
pub mod html;
pub mod links;
pub mod markdown;
pub mod markers;
pub mod metadata;
pub mod package;
pub mod page;
pub mod report;
pub mod sanitize;
pub mod store;
pub mod toc;

pub use archive::{open_archive, read_archive, ArchiveEntry};
pub use book::{import_epub, Book, BookState};
pub use error::ImportError;
pub use markdown::{Html2MdConverter, MarkdownConverter};
pub use report::{ImportSummary, LogReporter, ProgressReporter};
pub use store::{FsStore, OutputStore};
