#![allow(async_fn_in_trait)]

pub mod anchor;
pub mod cli;
pub mod config;
pub mod date_index;
pub mod entities;
pub mod error;
pub mod filter;
pub mod layout;
pub mod logging;
pub mod pagination;
pub mod scrubber;
pub mod source;
pub mod state;
pub mod timeline;
pub mod utils;
pub mod visible;
pub mod window;
