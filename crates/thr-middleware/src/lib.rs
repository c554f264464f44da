//! `thr-middleware` – The Nervous System
//!
//! Routes asynchronous data between the decision server, the scene engine
//! and displays without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
