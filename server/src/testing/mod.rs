//! In-memory stand-ins for the store, the mailbox, the model and the queue.

pub mod fakes;
