//! Row types for the Firewatch tables.
//!
//! Each `*Row` mirrors its table column-for-column and converts into the
//! corresponding `firewatch_core` type, decoding text-encoded enums on the way.

pub mod chat_message;
pub mod dispatcher;
pub mod incident;
pub mod profile;
