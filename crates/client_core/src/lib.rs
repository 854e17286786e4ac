//! Client-side state for the community app: the reactive chat store with
//! optimistic mutations, plus the invite, profile, media and job services
//! the screens call into.

pub mod invites;
pub mod jobs;
pub mod media;
pub mod optimistic;
pub mod profiles;
pub mod selection;
pub mod store;
pub mod types;

pub use invites::{invite_link, parse_invite_code, InviteOptions, InviteService};
pub use jobs::JobBoard;
pub use media::{HttpMediaHost, MediaHost, MissingMediaHost, PhotoUpload};
pub use optimistic::{EntityState, RollbackPolicy, TempId};
pub use profiles::ProfileService;
pub use selection::ActiveSelection;
pub use store::{ChatStore, StoreConfig};
pub use types::{ChatMessage, ChatServer, MutationKind, StoreEvent};

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod store_tests;

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod service_tests;
