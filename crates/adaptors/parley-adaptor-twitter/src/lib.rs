//! Twitter adaptor for Parley
//!
//! Three independent loops share one [`TwitterBase`]:
//!
//! - mentions: rebuild the reply thread, classify, answer with a formatted reply
//! - timeline: pick engagement actions per post and execute them independently
//! - posts: publish a standalone post on a randomized schedule
//!
//! Platform access goes through the [`TwitterApi`] trait so the loops can run
//! against any client, including test fakes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actions;
pub mod api;
pub mod base;
pub mod client;
pub mod config;
pub mod interactions;
pub mod meme;
pub mod post;
pub mod thread;

pub use actions::{ActionExecutor, ActionOutcome};
pub use api::{parse_created_tweet, HttpTwitterApi, NewTweet, Tweet, TwitterApi};
pub use base::TwitterBase;
pub use client::TwitterClient;
pub use config::{IntervalRange, TwitterConfig};
pub use interactions::InteractionHandler;
pub use meme::{prepare_image, GlifMemeGenerator, MemeGenerator};
pub use post::PostGenerator;
pub use thread::{build_thread, format_thread};
