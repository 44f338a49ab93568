//! `/shards` command and dashboard button handling

use crate::dashboard::{ActionOutcome, DashboardAction, DashboardSession, Dispatch, SessionRegistry};
use crate::error::GatewayError;
use crate::fleet::FleetAggregator;
use crate::interactions::payload::{self, DashboardMessage};
use crate::metrics::GatewayMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use twilight_http::Client as HttpClient;
use twilight_model::application::interaction::{Interaction, InteractionData};
use twilight_model::http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType};
use twilight_model::id::marker::ApplicationMarker;
use twilight_model::id::Id;
use uuid::Uuid;

/// Slash command that opens the dashboard
pub const SHARDS_COMMAND: &str = "shards";

const NOT_OWNER_NOTICE: &str = "This dashboard was opened by another user.";
const EXPIRED_NOTICE: &str = "This dashboard has expired. Run /shards again.";
const FAILURE_NOTICE: &str = "Could not load shard statistics.";

/// Hosts dashboard sessions on top of Discord interactions
pub struct InteractionHandler {
    http: Arc<HttpClient>,
    aggregator: FleetAggregator,
    sessions: SessionRegistry,
    collect_timeout: Duration,
    window: Duration,
    metrics: GatewayMetrics,
}

impl InteractionHandler {
    pub fn new(
        http: Arc<HttpClient>,
        aggregator: FleetAggregator,
        collect_timeout: Duration,
        window: Duration,
        metrics: GatewayMetrics,
    ) -> Self {
        Self {
            http,
            aggregator,
            sessions: SessionRegistry::new(),
            collect_timeout,
            window,
            metrics,
        }
    }

    /// Live sessions
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Entry point for every `InteractionCreate`
    pub async fn handle(self: Arc<Self>, interaction: Interaction) {
        let result = match &interaction.data {
            Some(InteractionData::ApplicationCommand(command)) if command.name == SHARDS_COMMAND => {
                Arc::clone(&self).open_dashboard(&interaction).await
            }
            Some(InteractionData::MessageComponent(component)) => {
                match payload::parse_custom_id(&component.custom_id) {
                    Some((session, action)) => self.handle_action(&interaction, session, action).await,
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            warn!(interaction_id = %interaction.id, error = %e, "Interaction handling failed");
        }
    }

    async fn open_dashboard(self: Arc<Self>, interaction: &Interaction) -> Result<(), GatewayError> {
        let Some(owner) = interaction.author_id() else {
            return Ok(());
        };
        let application_id = interaction.application_id;
        let token = interaction.token.clone();

        self.respond(
            interaction,
            InteractionResponseType::DeferredChannelMessageWithSource,
            Some(payload::ephemeral_deferral()),
        )
        .await?;

        let session =
            DashboardSession::open(owner.get(), &self.aggregator, self.collect_timeout, self.window).await;
        let session_id = session.id();
        let shard_count = session.snapshot().len();
        let expires_at = session.expires_at();
        let view = session.view();
        let handle = self.sessions.insert(session);
        self.metrics.record_dashboard_opened();

        info!(
            session_id = %session_id,
            owner_id = owner.get(),
            shards = shard_count,
            "Dashboard opened"
        );

        let message = DashboardMessage::render(session_id, &view);
        if let Err(e) = self.edit_original(application_id, &token, &message).await {
            self.sessions.remove(&session_id);
            self.edit_notice(application_id, &token, FAILURE_NOTICE).await;
            return Err(e);
        }

        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            self.close_session(application_id, &token, session_id, handle).await;
        });

        Ok(())
    }

    /// Disable the buttons at the end of the window and forget the session
    async fn close_session(
        &self,
        application_id: Id<ApplicationMarker>,
        token: &str,
        session_id: Uuid,
        handle: Arc<Mutex<DashboardSession>>,
    ) {
        let view = handle.lock().await.expire();
        self.sessions.remove(&session_id);

        let message = DashboardMessage::render(session_id, &view);
        match self.edit_original(application_id, token, &message).await {
            Ok(()) => debug!(session_id = %session_id, "Dashboard expired"),
            Err(e) => debug!(session_id = %session_id, error = %e, "Failed to disable expired dashboard"),
        }
    }

    async fn handle_action(
        &self,
        interaction: &Interaction,
        session_id: Uuid,
        action: DashboardAction,
    ) -> Result<(), GatewayError> {
        let Some(actor) = interaction.author_id() else {
            return Ok(());
        };

        let dispatch = self
            .sessions
            .dispatch(&session_id, actor.get(), action, &self.aggregator)
            .await;

        match dispatch {
            Dispatch::Handled(ActionOutcome::Updated(view)) | Dispatch::Handled(ActionOutcome::Expired(view)) => {
                let outcome = if view.all_disabled() { "expired" } else { "updated" };
                self.metrics.record_dashboard_action(action.as_str(), outcome);
                let message = DashboardMessage::render(session_id, &view);
                self.respond(
                    interaction,
                    InteractionResponseType::UpdateMessage,
                    Some(message.into_response_data()),
                )
                .await
            }
            Dispatch::Handled(ActionOutcome::NotOwner) => {
                self.metrics.record_dashboard_action(action.as_str(), "not_owner");
                debug!(session_id = %session_id, actor = actor.get(), "Dashboard action from non-owner rejected");
                self.respond(
                    interaction,
                    InteractionResponseType::ChannelMessageWithSource,
                    Some(payload::ephemeral_notice(NOT_OWNER_NOTICE)),
                )
                .await
            }
            Dispatch::Busy => {
                self.metrics.record_dashboard_action(action.as_str(), "busy");
                self.respond(interaction, InteractionResponseType::DeferredUpdateMessage, None)
                    .await
            }
            Dispatch::Unknown => {
                self.metrics.record_dashboard_action(action.as_str(), "unknown");
                self.respond(
                    interaction,
                    InteractionResponseType::ChannelMessageWithSource,
                    Some(payload::ephemeral_notice(EXPIRED_NOTICE)),
                )
                .await
            }
        }
    }

    async fn respond(
        &self,
        interaction: &Interaction,
        kind: InteractionResponseType,
        data: Option<InteractionResponseData>,
    ) -> Result<(), GatewayError> {
        let response = InteractionResponse { kind, data };

        self.http
            .interaction(interaction.application_id)
            .create_response(interaction.id, &interaction.token, &response)
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::DiscordHttp {
                operation: "create_response",
                source: Box::new(e),
            })
    }

    async fn edit_original(
        &self,
        application_id: Id<ApplicationMarker>,
        token: &str,
        message: &DashboardMessage,
    ) -> Result<(), GatewayError> {
        self.http
            .interaction(application_id)
            .update_response(token)
            .embeds(Some(message.embeds.as_slice()))
            .components(Some(message.components.as_slice()))
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::DiscordHttp {
                operation: "update_response",
                source: Box::new(e),
            })
    }

    async fn edit_notice(&self, application_id: Id<ApplicationMarker>, token: &str, notice: &str) {
        let result = self
            .http
            .interaction(application_id)
            .update_response(token)
            .content(Some(notice))
            .await;
        if let Err(e) = result {
            debug!(error = %e, "Failed to post dashboard failure notice");
        }
    }
}
