//! Herald core library: conversation-update dispatch, proactive welcome delivery,
//! installation bookkeeping, and the HTTP gateway used by the CLI.

pub mod activity;
pub mod card;
pub mod config;
pub mod connector;
pub mod dispatch;
pub mod gateway;
pub mod init;
pub mod recorder;
