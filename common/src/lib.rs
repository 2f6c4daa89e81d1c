//! Wire types shared between the mines round client and server.

pub mod models;
pub mod protocol;
