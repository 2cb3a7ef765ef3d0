//! Messages accepted by a [`super::actor::BatchOrchestratorActor`]'s mailbox.
//!
//! Every externally callable operation of §4.4 is a request/reply pair;
//! the alarm loop feeds itself `AlarmFired` through the same mailbox so
//! the actor never needs to select across two channels.

use tokio::sync::oneshot;

use conveyor_shared::domain::{BatchQueueMessage, CallbackOutcome, CallbackPayload, StatusView};
use conveyor_shared::error::ConveyorResult;

pub enum Command {
    StartBatch {
        message: BatchQueueMessage,
        reply: oneshot::Sender<ConveyorResult<()>>,
    },
    HandleCallback {
        task_id: String,
        payload: CallbackPayload,
        reply: oneshot::Sender<ConveyorResult<CallbackOutcome>>,
    },
    GetStatus {
        reply: oneshot::Sender<ConveyorResult<StatusView>>,
    },
    AdminReset {
        reply: oneshot::Sender<ConveyorResult<()>>,
    },
    AlarmFired,
}
