//! Active server/channel state machine.
//!
//! Transitions are pure; the store applies them under its lock and then
//! re-establishes whichever subscriptions the new selection needs.

use serde::{Deserialize, Serialize};
use shared::domain::{ChannelId, ServerId};

use crate::types::ChatServer;

/// Which server and channel the user is looking at.
///
/// The channel is either empty or belongs to the active server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSelection {
    pub server_id: Option<ServerId>,
    pub channel_id: Option<ChannelId>,
}

impl ActiveSelection {
    pub fn is_empty(&self) -> bool {
        self.server_id.is_none() && self.channel_id.is_none()
    }

    /// Unknown servers are ignored and leave the selection untouched.
    pub fn select_server(&mut self, servers: &[ChatServer], server_id: &ServerId) -> bool {
        let Some(server) = servers.iter().find(|s| &s.key() == server_id) else {
            return false;
        };
        self.server_id = Some(server.key());
        self.channel_id = server.default_channel().map(|c| c.id.clone());
        true
    }

    pub fn select_channel(&mut self, channel_id: ChannelId) {
        self.channel_id = Some(channel_id);
    }

    /// Moves off `left` when it was active: to the first remaining server, or to empty.
    pub fn leave(&mut self, remaining: &[ChatServer], left: &ServerId) -> bool {
        if self.server_id.as_ref() != Some(left) {
            return false;
        }
        match remaining.first() {
            Some(next) => {
                let next = next.key();
                self.select_server(remaining, &next)
            }
            None => {
                self.clear();
                true
            }
        }
    }

    /// Keeps the selection pointing at a server that exists after the list was replaced.
    pub fn reconcile(&mut self, servers: &[ChatServer]) -> bool {
        let still_present = self
            .server_id
            .as_ref()
            .is_some_and(|active| servers.iter().any(|s| &s.key() == active));
        if still_present {
            return false;
        }
        match servers.first() {
            Some(first) => {
                let first = first.key();
                self.select_server(servers, &first)
            }
            None if self.is_empty() => false,
            None => {
                self.clear();
                true
            }
        }
    }

    /// Follows a server from its temporary id to its confirmed one.
    ///
    /// The placeholder channel goes with the temporary id; the channel
    /// directory of the confirmed server fills it in again.
    pub fn rename_server(&mut self, from: &ServerId, to: &ServerId) -> bool {
        if self.server_id.as_ref() != Some(from) {
            return false;
        }
        self.server_id = Some(to.clone());
        self.channel_id = None;
        true
    }

    pub fn clear(&mut self) {
        self.server_id = None;
        self.channel_id = None;
    }
}

#[cfg(test)]
mod tests {
    use shared::{
        domain::{ChannelKind, UserId},
        model::{Category, Channel},
    };

    use super::*;
    use crate::optimistic::EntityState;

    fn server(id: &str, channels: &[&str]) -> ChatServer {
        ChatServer {
            state: EntityState::Confirmed {
                id: ServerId::new(id),
            },
            name: id.to_string(),
            short_name: id.to_uppercase(),
            owner_id: UserId::new("owner"),
            icon_url: None,
            categories: if channels.is_empty() {
                Vec::new()
            } else {
                vec![Category {
                    id: "default-cat".into(),
                    name: "CHANNELS".into(),
                    channels: channels
                        .iter()
                        .map(|name| Channel {
                            id: ChannelId::new(*name),
                            name: name.to_string(),
                            kind: ChannelKind::Text,
                            category_id: None,
                            position: 0,
                        })
                        .collect(),
                }]
            },
        }
    }

    #[test]
    fn selecting_server_resets_channel_to_first() {
        let servers = vec![server("a", &["a-general", "a-random"]), server("b", &[])];
        let mut selection = ActiveSelection::default();

        assert!(selection.select_server(&servers, &ServerId::new("a")));
        assert_eq!(selection.channel_id, Some(ChannelId::new("a-general")));

        selection.select_channel(ChannelId::new("a-random"));
        assert!(selection.select_server(&servers, &ServerId::new("b")));
        assert_eq!(selection.server_id, Some(ServerId::new("b")));
        assert_eq!(selection.channel_id, None);
    }

    #[test]
    fn selecting_server_with_empty_first_category_leaves_channel_empty() {
        let mut servers = vec![server("a", &["a-general"])];
        servers[0].categories.insert(
            0,
            Category {
                id: "text-cat".into(),
                name: "TEXT".into(),
                channels: Vec::new(),
            },
        );
        let mut selection = ActiveSelection::default();
        selection.select_channel(ChannelId::new("stale"));

        assert!(selection.select_server(&servers, &ServerId::new("a")));
        assert_eq!(selection.server_id, Some(ServerId::new("a")));
        assert_eq!(selection.channel_id, None);
        assert_eq!(
            servers[0].first_channel().map(|c| c.id.clone()),
            Some(ChannelId::new("a-general"))
        );
    }

    #[test]
    fn renaming_active_server_drops_placeholder_channel() {
        let mut selection = ActiveSelection {
            server_id: Some(ServerId::new("temp-1")),
            channel_id: Some(ChannelId::new("temp-1-general")),
        };
        assert!(!selection.rename_server(&ServerId::new("other"), &ServerId::new("real")));
        assert!(selection.rename_server(&ServerId::new("temp-1"), &ServerId::new("real")));
        assert_eq!(selection.server_id, Some(ServerId::new("real")));
        assert_eq!(selection.channel_id, None);
    }

    #[test]
    fn unknown_server_is_ignored() {
        let servers = vec![server("a", &["a-general"])];
        let mut selection = ActiveSelection::default();
        selection.select_server(&servers, &ServerId::new("a"));
        let before = selection.clone();

        assert!(!selection.select_server(&servers, &ServerId::new("ghost")));
        assert_eq!(selection, before);
    }

    #[test]
    fn leaving_active_server_moves_to_first_remaining_or_empty() {
        let mut selection = ActiveSelection::default();
        let all = vec![server("a", &["a-general"]), server("b", &["b-general"])];
        selection.select_server(&all, &ServerId::new("a"));

        let remaining = vec![server("b", &["b-general"])];
        assert!(selection.leave(&remaining, &ServerId::new("a")));
        assert_eq!(selection.server_id, Some(ServerId::new("b")));
        assert_eq!(selection.channel_id, Some(ChannelId::new("b-general")));

        assert!(selection.leave(&[], &ServerId::new("b")));
        assert!(selection.is_empty());
    }

    #[test]
    fn leaving_inactive_server_keeps_selection() {
        let servers = vec![server("a", &["a-general"]), server("b", &[])];
        let mut selection = ActiveSelection::default();
        selection.select_server(&servers, &ServerId::new("a"));
        assert!(!selection.leave(&servers[..1], &ServerId::new("b")));
        assert_eq!(selection.server_id, Some(ServerId::new("a")));
    }

    #[test]
    fn reconcile_picks_first_server_when_active_vanishes() {
        let mut selection = ActiveSelection::default();
        assert!(selection.reconcile(&[server("a", &[])]));
        assert_eq!(selection.server_id, Some(ServerId::new("a")));

        assert!(!selection.reconcile(&[server("b", &[]), server("a", &[])]));
        assert_eq!(selection.server_id, Some(ServerId::new("a")));

        assert!(selection.reconcile(&[server("b", &[])]));
        assert_eq!(selection.server_id, Some(ServerId::new("b")));

        assert!(selection.reconcile(&[]));
        assert!(selection.is_empty());
        assert!(!selection.reconcile(&[]));
    }
}
