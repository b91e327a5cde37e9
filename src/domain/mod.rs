pub mod clock;
pub mod connection_state;
pub mod event_record;
pub mod feed_store;
pub mod operation;
