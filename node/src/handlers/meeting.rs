use async_trait::async_trait;
use lao_messages::data::{CreateMeeting, StateMeeting};
use lao_messages::{ids, Data};
use lao_store::{EntityKey, Meeting, StoreError};
use lao_types::Channel;
use lao_witness::WitnessSubject;

use super::check_modification_signatures;
use crate::context::{ClientState, HandlerContext, HandlerOutput, WitnessRequest};
use crate::error::DataHandlingError;
use crate::events::NodeEvent;
use crate::registry::{unsupported, Handler};

/// Meetings: creation and state on the LAO channel.
pub struct MeetingHandler;

#[async_trait]
impl Handler for MeetingHandler {
    async fn handle(
        &self,
        state: &ClientState,
        ctx: &HandlerContext,
        data: Data,
    ) -> Result<HandlerOutput, DataHandlingError> {
        match data {
            Data::CreateMeeting(create) => create_meeting(state, ctx, create).await,
            Data::StateMeeting(meeting_state) => state_meeting(state, ctx, meeting_state).await,
            other => Err(unsupported(other.object_action())),
        }
    }
}

async fn create_meeting(
    state: &ClientState,
    ctx: &HandlerContext,
    create: CreateMeeting,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::lao(lao_id))?;
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, "create a meeting")?;
    let expected = ids::meeting_id(lao_id, create.creation, &create.name);
    if create.id != expected {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "meeting id {} does not derive from its creation and name",
            create.id
        )));
    }

    let meeting = Meeting::from_create(&create, ctx.message_id.clone());
    state
        .meetings
        .insert(EntityKey::new(lao_id, &create.id), meeting)
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => DataHandlingError::Conflict(format!("meeting {} already exists", create.id)),
            other => other.into(),
        })?;
    tracing::info!(lao = %lao_id, meeting = %create.id, name = %create.name, "meeting created");
    state.events.emit(NodeEvent::MeetingChanged {
        lao: lao_id.clone(),
        meeting: create.id.clone(),
    });
    Ok(HandlerOutput::none().satisfies(&create.id).witnessed_as(
        WitnessRequest::new(lao_id, WitnessSubject::Meeting(create.id.clone()), "New meeting")
            .with_description(create.name),
    ))
}

async fn state_meeting(
    state: &ClientState,
    ctx: &HandlerContext,
    meeting_state: StateMeeting,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::lao(lao_id))?;
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, "publish a meeting state")?;
    let key = EntityKey::new(lao_id, &meeting_state.id);
    let Some(meeting) = state.meetings.get(&key).await else {
        return Err(DataHandlingError::UnknownMeeting(meeting_state.id));
    };
    if meeting.creation != meeting_state.creation {
        return Err(DataHandlingError::Conflict(format!(
            "state of meeting {} changes its creation time",
            meeting.id
        )));
    }
    check_modification_signatures(&lao, &meeting_state.modification_id, &meeting_state.modification_signatures)?;

    let applied = state
        .meetings
        .update(&key, |m| Ok::<_, StoreError>(m.apply_state(&meeting_state)))
        .await?;
    if applied {
        tracing::info!(lao = %lao_id, meeting = %meeting_state.id, "meeting state certified");
        state.events.emit(NodeEvent::MeetingChanged {
            lao: lao_id.clone(),
            meeting: meeting_state.id,
        });
    }
    Ok(HandlerOutput::none())
}
