mod client;
mod naming;

pub use client::{RemoteFile, StardotsClient, StardotsError, Ticket};
pub use naming::{decode_remote_name, encode_remote_name, mime_type_for, DEFAULT_CATEGORY};
