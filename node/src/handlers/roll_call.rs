use async_trait::async_trait;
use lao_messages::data::{CloseRollCall, CreateRollCall, OpenRollCall};
use lao_messages::Data;
use lao_store::{RollCall, RollCallState, StoreError};
use lao_types::{Channel, Hash};
use lao_witness::WitnessSubject;

use crate::context::{ClientState, HandlerContext, HandlerOutput, WitnessRequest};
use crate::error::DataHandlingError;
use crate::events::NodeEvent;
use crate::registry::{unsupported, Handler};

/// Roll call lifecycle: `create → open → close`, with `reopen` from closed.
pub struct RollCallHandler;

#[async_trait]
impl Handler for RollCallHandler {
    async fn handle(
        &self,
        state: &ClientState,
        ctx: &HandlerContext,
        data: Data,
    ) -> Result<HandlerOutput, DataHandlingError> {
        match data {
            Data::CreateRollCall(create) => create_roll_call(state, ctx, create).await,
            Data::OpenRollCall(open) => open_roll_call(state, ctx, open, false).await,
            Data::ReopenRollCall(open) => open_roll_call(state, ctx, open, true).await,
            Data::CloseRollCall(close) => close_roll_call(state, ctx, close).await,
            other => Err(unsupported(other.object_action())),
        }
    }
}

async fn create_roll_call(
    state: &ClientState,
    ctx: &HandlerContext,
    create: CreateRollCall,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::lao(lao_id))?;
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, "create a roll call")?;
    let expected = CreateRollCall::expected_id(lao_id, create.creation, &create.name);
    if create.id != expected {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "roll call id {} does not derive from its creation and name",
            create.id
        )));
    }

    state
        .roll_calls
        .create(lao_id, RollCall::from_create(&create))
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => DataHandlingError::Conflict(format!("roll call {} already exists", create.id)),
            other => other.into(),
        })?;
    tracing::info!(lao = %lao_id, roll_call = %create.id, name = %create.name, "roll call created");
    changed(state, lao_id, &create.id, RollCallState::Created);
    Ok(HandlerOutput::none().satisfies(&create.id).witnessed_as(
        WitnessRequest::new(lao_id, WitnessSubject::RollCall(create.id.clone()), "New roll call")
            .with_description(create.name),
    ))
}

async fn open_roll_call(
    state: &ClientState,
    ctx: &HandlerContext,
    open: OpenRollCall,
    reopen: bool,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::lao(lao_id))?;
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, if reopen { "reopen a roll call" } else { "open a roll call" })?;
    check_latest(state, lao_id, &open.opens).await?;
    let expected = OpenRollCall::expected_id(lao_id, &open.opens, open.opened_at);
    if open.update_id != expected {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "update id {} does not derive from the opened roll call",
            open.update_id
        )));
    }

    let updated = state
        .roll_calls
        .transition(lao_id, &open.opens, |rc| {
            rc.open(&open, reopen).map_err(DataHandlingError::Conflict)
        })
        .await?;
    tracing::info!(
        lao = %lao_id,
        roll_call = %updated.persistent_id,
        update_id = %open.update_id,
        reopen,
        "roll call opened"
    );
    changed(state, lao_id, &updated.persistent_id, updated.state);
    let title = if reopen { "Roll call reopened" } else { "Roll call opened" };
    Ok(HandlerOutput::none().satisfies(&open.update_id).witnessed_as(
        WitnessRequest::new(lao_id, WitnessSubject::RollCall(open.update_id.clone()), title)
            .with_description(updated.name),
    ))
}

async fn close_roll_call(
    state: &ClientState,
    ctx: &HandlerContext,
    close: CloseRollCall,
) -> Result<HandlerOutput, DataHandlingError> {
    let lao_id = ctx.require_lao()?;
    ctx.require_channel(&Channel::lao(lao_id))?;
    let lao = state.lao(lao_id).await?;
    ctx.require_organizer(&lao, "close a roll call")?;
    check_latest(state, lao_id, &close.closes).await?;
    let expected = CloseRollCall::expected_id(lao_id, &close.closes, close.closed_at);
    if close.update_id != expected {
        return Err(DataHandlingError::InvalidDataFormat(format!(
            "update id {} does not derive from the closed roll call",
            close.update_id
        )));
    }

    let updated = state
        .roll_calls
        .transition(lao_id, &close.closes, |rc| rc.close(&close).map_err(DataHandlingError::Conflict))
        .await?;
    tracing::info!(
        lao = %lao_id,
        roll_call = %updated.persistent_id,
        update_id = %close.update_id,
        attendees = updated.attendees.len(),
        "roll call closed"
    );
    changed(state, lao_id, &updated.persistent_id, updated.state);
    Ok(HandlerOutput::none().satisfies(&close.update_id).witnessed_as(
        WitnessRequest::new(lao_id, WitnessSubject::RollCall(close.update_id.clone()), "Roll call closed")
            .with_description(updated.name),
    ))
}

/// A transition must name the roll call by the id of its latest transition.
async fn check_latest(state: &ClientState, lao_id: &Hash, id: &Hash) -> Result<(), DataHandlingError> {
    let Some(current) = state.roll_calls.get(lao_id, id).await else {
        return Err(DataHandlingError::UnknownRollCall(id.clone()));
    };
    if current.id != *id {
        return Err(DataHandlingError::Conflict(format!(
            "roll call {} was already moved on by {}",
            id, current.id
        )));
    }
    Ok(())
}

fn changed(state: &ClientState, lao: &Hash, roll_call: &Hash, rc_state: RollCallState) {
    state.events.emit(NodeEvent::RollCallChanged {
        lao: lao.clone(),
        roll_call: roll_call.clone(),
        state: rc_state,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Fixture;
    use lao_crypto::generate_keypair;
    use lao_types::Timestamp;

    async fn run(fx: &Fixture, data: Data) -> Result<HandlerOutput, DataHandlingError> {
        let c = fx.ctx(&fx.organizer, Channel::lao(&fx.lao), &data);
        RollCallHandler.handle(&fx.state, &c, data).await
    }

    fn create(fx: &Fixture) -> CreateRollCall {
        CreateRollCall::new(
            &fx.lao,
            "Entry",
            Timestamp::new(1_100),
            Timestamp::new(1_200),
            Timestamp::new(1_900),
            "Hall",
            None,
        )
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let fx = Fixture::new(0).await;
        let create = create(&fx);
        let out = run(&fx, Data::CreateRollCall(create.clone())).await.unwrap();
        assert_eq!(out.satisfied, vec![create.id.clone()]);

        let open = OpenRollCall::new(&fx.lao, create.id.clone(), Timestamp::new(1_200));
        let out = run(&fx, Data::OpenRollCall(open.clone())).await.unwrap();
        assert_eq!(
            out.witness.unwrap().subject,
            WitnessSubject::RollCall(open.update_id.clone())
        );

        let attendee = generate_keypair().public;
        let close = CloseRollCall::new(&fx.lao, open.update_id.clone(), Timestamp::new(1_800), vec![attendee]);
        run(&fx, Data::CloseRollCall(close.clone())).await.unwrap();

        let reopen = OpenRollCall::new(&fx.lao, close.update_id.clone(), Timestamp::new(1_850));
        run(&fx, Data::ReopenRollCall(reopen.clone())).await.unwrap();

        let rc = fx.state.roll_calls.get(&fx.lao, &create.id).await.unwrap();
        assert_eq!(rc.state, RollCallState::Opened);
        assert_eq!(rc.id, reopen.update_id);
        assert!(rc.attendees.contains(&attendee));
    }

    #[tokio::test]
    async fn close_before_open_conflicts() {
        let fx = Fixture::new(0).await;
        let create = create(&fx);
        run(&fx, Data::CreateRollCall(create.clone())).await.unwrap();
        let close = CloseRollCall::new(&fx.lao, create.id.clone(), Timestamp::new(1_800), vec![]);
        let err = run(&fx, Data::CloseRollCall(close)).await.unwrap_err();
        assert!(matches!(err, DataHandlingError::Conflict(_)));
        let rc = fx.state.roll_calls.get(&fx.lao, &create.id).await.unwrap();
        assert_eq!(rc.state, RollCallState::Created);
    }

    #[tokio::test]
    async fn open_of_unknown_roll_call_waits() {
        let fx = Fixture::new(0).await;
        let create = create(&fx);
        let open = OpenRollCall::new(&fx.lao, create.id.clone(), Timestamp::new(1_200));
        let err = run(&fx, Data::OpenRollCall(open)).await.unwrap_err();
        assert_eq!(err.dependency(), Some(create.id));
    }

    #[tokio::test]
    async fn stale_reference_conflicts() {
        let fx = Fixture::new(0).await;
        let create = create(&fx);
        run(&fx, Data::CreateRollCall(create.clone())).await.unwrap();
        let open = OpenRollCall::new(&fx.lao, create.id.clone(), Timestamp::new(1_200));
        run(&fx, Data::OpenRollCall(open)).await.unwrap();

        let again = OpenRollCall::new(&fx.lao, create.id.clone(), Timestamp::new(1_300));
        let err = run(&fx, Data::OpenRollCall(again)).await.unwrap_err();
        assert!(matches!(err, DataHandlingError::Conflict(_)));
    }

    #[tokio::test]
    async fn forged_update_id_is_rejected() {
        let fx = Fixture::new(0).await;
        let create = create(&fx);
        run(&fx, Data::CreateRollCall(create.clone())).await.unwrap();
        let mut open = OpenRollCall::new(&fx.lao, create.id.clone(), Timestamp::new(1_200));
        open.opened_at = Timestamp::new(1_201);
        let err = run(&fx, Data::OpenRollCall(open)).await.unwrap_err();
        assert!(matches!(err, DataHandlingError::InvalidDataFormat(_)));
    }
}
