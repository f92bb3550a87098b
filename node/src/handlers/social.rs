use async_trait::async_trait;
use lao_messages::data::{AddChirp, AddReaction, DeleteChirp, DeleteReaction, NotifyChirp};
use lao_messages::Data;
use lao_store::{Chirp, Reaction, StoreError};
use lao_types::{Channel, Hash};

use crate::context::{ClientState, HandlerContext, HandlerOutput};
use crate::error::DataHandlingError;
use crate::events::NodeEvent;
use crate::registry::{unsupported, Handler};

/// Chirps on each sender's social channel, reactions on the LAO's
/// reactions channel.
pub struct SocialHandler;

#[async_trait]
impl Handler for SocialHandler {
    async fn handle(
        &self,
        state: &ClientState,
        ctx: &HandlerContext,
        data: Data,
    ) -> Result<HandlerOutput, DataHandlingError> {
        let lao_id = ctx.require_lao()?.clone();
        match data {
            Data::AddChirp(add) => add_chirp(state, ctx, &lao_id, add).await,
            Data::DeleteChirp(delete) => delete_chirp(state, ctx, &lao_id, delete).await,
            Data::NotifyAddChirp(notify) => notified(ctx, "add", notify),
            Data::NotifyDeleteChirp(notify) => notified(ctx, "delete", notify),
            Data::AddReaction(add) => add_reaction(state, ctx, &lao_id, add).await,
            Data::DeleteReaction(delete) => delete_reaction(state, ctx, &lao_id, delete).await,
            other => Err(unsupported(other.object_action())),
        }
    }
}

async fn add_chirp(
    state: &ClientState,
    ctx: &HandlerContext,
    lao_id: &Hash,
    add: AddChirp,
) -> Result<HandlerOutput, DataHandlingError> {
    ctx.require_channel(&Channel::social(lao_id, &ctx.sender))?;
    let chirp = Chirp {
        id: ctx.message_id.clone(),
        channel: ctx.channel.clone(),
        sender: ctx.sender,
        text: add.text,
        parent_id: add.parent_id,
        timestamp: add.timestamp,
        deleted: false,
    };
    state.social.add_chirp(lao_id, chirp).await.map_err(|e| match e {
        StoreError::Duplicate(_) => DataHandlingError::Conflict(format!("chirp {} already known", ctx.message_id)),
        other => other.into(),
    })?;
    tracing::debug!(lao = %lao_id, chirp = %ctx.message_id, sender = %ctx.sender, "chirp added");
    state.events.emit(NodeEvent::ChirpAdded {
        lao: lao_id.clone(),
        chirp: ctx.message_id.clone(),
    });
    Ok(HandlerOutput::none())
}

async fn delete_chirp(
    state: &ClientState,
    ctx: &HandlerContext,
    lao_id: &Hash,
    delete: DeleteChirp,
) -> Result<HandlerOutput, DataHandlingError> {
    ctx.require_channel(&Channel::social(lao_id, &ctx.sender))?;
    if !state.social.chirp_exists(lao_id, &delete.chirp_id).await {
        return Err(DataHandlingError::UnknownMessage(delete.chirp_id));
    }
    state.social.delete_chirp(lao_id, &delete.chirp_id, &ctx.sender).await?;
    tracing::debug!(lao = %lao_id, chirp = %delete.chirp_id, "chirp deleted");
    state.events.emit(NodeEvent::ChirpDeleted {
        lao: lao_id.clone(),
        chirp: delete.chirp_id,
    });
    Ok(HandlerOutput::none())
}

/// Server-side notifications only point at a chirp this client reads on its
/// author's channel.
fn notified(ctx: &HandlerContext, what: &str, notify: NotifyChirp) -> Result<HandlerOutput, DataHandlingError> {
    tracing::debug!(
        channel = %ctx.channel,
        chirp = %notify.chirp_id,
        source = %notify.channel,
        what,
        "chirp notification"
    );
    Ok(HandlerOutput::none())
}

async fn add_reaction(
    state: &ClientState,
    ctx: &HandlerContext,
    lao_id: &Hash,
    add: AddReaction,
) -> Result<HandlerOutput, DataHandlingError> {
    ctx.require_channel(&Channel::reactions(lao_id))?;
    if !state.social.chirp_exists(lao_id, &add.chirp_id).await {
        return Err(DataHandlingError::UnknownMessage(add.chirp_id));
    }
    let reaction = Reaction {
        id: ctx.message_id.clone(),
        sender: ctx.sender,
        codepoint: add.reaction_codepoint,
        chirp_id: add.chirp_id,
        timestamp: add.timestamp,
        deleted: false,
    };
    state.social.add_reaction(lao_id, reaction).await?;
    Ok(HandlerOutput::none())
}

async fn delete_reaction(
    state: &ClientState,
    ctx: &HandlerContext,
    lao_id: &Hash,
    delete: DeleteReaction,
) -> Result<HandlerOutput, DataHandlingError> {
    ctx.require_channel(&Channel::reactions(lao_id))?;
    let key = (lao_id.clone(), delete.reaction_id.clone());
    if !state.social.reactions().contains(&key).await {
        return Err(DataHandlingError::UnknownMessage(delete.reaction_id));
    }
    state
        .social
        .delete_reaction(lao_id, &delete.reaction_id, &ctx.sender)
        .await?;
    Ok(HandlerOutput::none())
}
