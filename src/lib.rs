//! Timeline harvester library.
//!
//! Scrolls a rendered social-media timeline, extracts the target account's
//! posts, polls, media and engagement counts, backfills its profile, and
//! exports everything as one JSON document. Exports can be folded into a
//! per-account archive across runs, and a small library reads both back for
//! browsing.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod archive;
pub mod collector;
pub mod config;
pub mod dom;
pub mod export;
pub mod extract;
pub mod identity;
pub mod library;
pub mod model;
pub mod operator;
pub mod profile;
pub mod view;
