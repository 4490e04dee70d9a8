#![forbid(unsafe_code)]

//! Small REST backend around yt-dlp: validate a video URL, fetch its
//! metadata or download it in the background, and expose the finished files.

pub mod api;
pub mod config;
pub mod downloads;
pub mod extractor;
pub mod files;
pub mod progress;
pub mod security;
pub mod validate;

#[cfg(all(test, unix))]
mod test_support;
