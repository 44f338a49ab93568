//! Discord message payloads for the dashboard

use crate::dashboard::{DashboardAction, DashboardView};
use twilight_model::channel::message::component::{ActionRow, Button, ButtonStyle};
use twilight_model::channel::message::embed::EmbedField;
use twilight_model::channel::message::{Component, Embed, EmojiReactionType, MessageFlags};
use twilight_model::http::interaction::InteractionResponseData;
use twilight_model::util::Timestamp;
use uuid::Uuid;

/// Prefix of every dashboard button custom id
pub const CUSTOM_ID_PREFIX: &str = "fleet";

const EMBED_COLOR: u32 = 0x00aaff;
const EMBED_TITLE: &str = "📊 Shards overview";

/// `fleet:<session>:<action>`
pub fn custom_id(session: Uuid, action: DashboardAction) -> String {
    format!("{CUSTOM_ID_PREFIX}:{session}:{action}")
}

/// Inverse of [`custom_id`]; `None` for foreign or malformed ids
pub fn parse_custom_id(raw: &str) -> Option<(Uuid, DashboardAction)> {
    let mut parts = raw.splitn(3, ':');
    if parts.next()? != CUSTOM_ID_PREFIX {
        return None;
    }
    let session = Uuid::parse_str(parts.next()?).ok()?;
    let action = parts.next()?.parse().ok()?;
    Some((session, action))
}

/// Embed and button row of one dashboard rendering
#[derive(Debug, Clone)]
pub struct DashboardMessage {
    pub embeds: Vec<Embed>,
    pub components: Vec<Component>,
}

impl DashboardMessage {
    pub fn render(session: Uuid, view: &DashboardView) -> Self {
        Self {
            embeds: vec![embed(view)],
            components: vec![button_row(session, view)],
        }
    }

    /// Response body that replaces the message the buttons belong to
    pub fn into_response_data(self) -> InteractionResponseData {
        InteractionResponseData {
            embeds: Some(self.embeds),
            components: Some(self.components),
            ..Default::default()
        }
    }
}

/// Private reply visible only to the user who triggered the interaction
pub fn ephemeral_notice(content: &str) -> InteractionResponseData {
    InteractionResponseData {
        content: Some(content.to_string()),
        flags: Some(MessageFlags::EPHEMERAL),
        ..Default::default()
    }
}

/// Flags for a deferred ephemeral reply
pub fn ephemeral_deferral() -> InteractionResponseData {
    InteractionResponseData {
        flags: Some(MessageFlags::EPHEMERAL),
        ..Default::default()
    }
}

fn embed(view: &DashboardView) -> Embed {
    Embed {
        author: None,
        color: Some(EMBED_COLOR),
        description: Some(view.summary.clone()),
        fields: vec![EmbedField {
            inline: false,
            name: view.page_label.clone(),
            value: view.table.clone(),
        }],
        footer: None,
        image: None,
        kind: "rich".to_string(),
        provider: None,
        thumbnail: None,
        timestamp: Timestamp::from_secs(chrono::Utc::now().timestamp()).ok(),
        title: Some(EMBED_TITLE.to_string()),
        url: None,
        video: None,
    }
}

fn button_row(session: Uuid, view: &DashboardView) -> Component {
    let buttons = view
        .controls
        .iter()
        .map(|control| {
            let style = if control.action == DashboardAction::Refresh {
                ButtonStyle::Primary
            } else {
                ButtonStyle::Secondary
            };
            Component::Button(Button {
                id: None,
                custom_id: Some(custom_id(session, control.action)),
                disabled: control.disabled,
                emoji: Some(EmojiReactionType::Unicode {
                    name: control.action.emoji().to_string(),
                }),
                label: None,
                style,
                url: None,
                sku_id: None,
            })
        })
        .collect();

    Component::ActionRow(ActionRow {
        id: None,
        components: buttons,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::DashboardSession;
    use crate::fleet::FleetSnapshot;
    use std::time::Duration;

    #[test]
    fn custom_ids_round_trip() {
        let session = Uuid::new_v4();
        for action in DashboardAction::ALL {
            assert_eq!(parse_custom_id(&custom_id(session, action)), Some((session, action)));
        }
    }

    #[test]
    fn foreign_custom_ids_are_ignored() {
        assert_eq!(parse_custom_id("ban:confirm"), None);
        assert_eq!(parse_custom_id("fleet:not-a-uuid:next"), None);
        assert_eq!(parse_custom_id(&format!("fleet:{}:jump", Uuid::new_v4())), None);
        assert_eq!(parse_custom_id("fleet"), None);
    }

    #[tokio::test]
    async fn dashboard_message_carries_view() {
        let session = DashboardSession::with_snapshot(
            1,
            FleetSnapshot::default(),
            Duration::ZERO,
            Duration::from_secs(60),
        );
        let view = session.view();
        let message = DashboardMessage::render(session.id(), &view);

        assert_eq!(message.embeds.len(), 1);
        assert_eq!(message.embeds[0].fields[0].name, "Page 1/1");
        assert_eq!(message.embeds[0].description.as_deref(), Some(view.summary.as_str()));

        let Component::ActionRow(row) = &message.components[0] else {
            panic!("expected an action row");
        };
        assert_eq!(row.components.len(), DashboardAction::ALL.len());
        for (component, control) in row.components.iter().zip(&view.controls) {
            let Component::Button(button) = component else {
                panic!("expected a button");
            };
            assert_eq!(button.disabled, control.disabled);
            assert_eq!(
                button.custom_id.as_deref().and_then(parse_custom_id),
                Some((session.id(), control.action))
            );
        }

        let data = message.into_response_data();
        assert!(data.embeds.is_some());
        assert!(data.components.is_some());
    }

    #[test]
    fn notices_are_ephemeral() {
        let data = ephemeral_notice("nope");
        assert_eq!(data.content.as_deref(), Some("nope"));
        assert_eq!(data.flags, Some(MessageFlags::EPHEMERAL));
        assert_eq!(ephemeral_deferral().flags, Some(MessageFlags::EPHEMERAL));
    }
}
