//! Runs a [`Room`] on its own task.
//!
//! Commands, ticks and arrivals all go through one channel, so the room sees
//! them strictly in order and never needs a lock.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::CommandError;
use crate::host::{Host, ObjectId};
use crate::room::{Command, Reply, Room};

pub enum RoomMsg<H> {
    Command {
        actor: ObjectId,
        cmd: Command,
        reply: oneshot::Sender<Result<Reply, CommandError>>,
    },
    Tick,
    Entered(ObjectId),
    Left(ObjectId),
    MayLeave {
        obj: ObjectId,
        reply: oneshot::Sender<Result<(), CommandError>>,
    },
    Shutdown(oneshot::Sender<(Room, H)>),
}

pub struct RoomHandle<H> {
    tx: mpsc::Sender<RoomMsg<H>>,
}

impl<H> Clone for RoomHandle<H> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Whether the room drives its own turn clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    /// A ticker task sends `Tick` every `tick_secs` of the room's config.
    Clock,
    /// Callers tick by hand through [`RoomHandle::tick`].
    Manual,
}

/// Moves `room` and its host onto a task.
pub fn spawn_room<H>(room: Room, host: H, mode: TickMode) -> RoomHandle<H>
where
    H: Host + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<RoomMsg<H>>(1024);
    let location = room.location();
    // Same interval each tick subtracts from the turn clock.
    let period = Duration::from_secs(room.config().tick_secs.max(1) as u64);
    tokio::spawn(room_task(room, host, rx));

    if mode == TickMode::Clock {
        let ticker = tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if ticker.send(RoomMsg::Tick).await.is_err() {
                    debug!(location = %location, "ticker stopped");
                    return;
                }
            }
        });
    }

    RoomHandle { tx }
}

async fn room_task<H: Host + Send + 'static>(
    mut room: Room,
    mut host: H,
    mut rx: mpsc::Receiver<RoomMsg<H>>,
) {
    info!(location = %room.location(), "room task started");
    while let Some(msg) = rx.recv().await {
        match msg {
            RoomMsg::Command { actor, cmd, reply } => {
                let res = room.handle(&mut host, actor, cmd);
                let _ = reply.send(res);
            }
            RoomMsg::Tick => room.tick(&mut host),
            RoomMsg::Entered(obj) => room.object_entered(&host, obj),
            RoomMsg::Left(obj) => room.object_left(&mut host, obj),
            RoomMsg::MayLeave { obj, reply } => {
                let _ = reply.send(room.may_leave(obj));
            }
            RoomMsg::Shutdown(reply) => {
                info!(location = %room.location(), "room task stopping");
                let _ = reply.send((room, host));
                return;
            }
        }
    }
    info!(location = %room.location(), "room task stopped; all handles dropped");
}

impl<H> RoomHandle<H> {
    pub async fn command(&self, actor: ObjectId, cmd: Command) -> Result<Reply, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomMsg::Command { actor, cmd, reply })
            .await
            .map_err(|_| CommandError::Unavailable)?;
        rx.await.map_err(|_| CommandError::Unavailable)?
    }

    pub async fn tick(&self) -> Result<(), CommandError> {
        self.send(RoomMsg::Tick).await
    }

    pub async fn entered(&self, obj: ObjectId) -> Result<(), CommandError> {
        self.send(RoomMsg::Entered(obj)).await
    }

    pub async fn left(&self, obj: ObjectId) -> Result<(), CommandError> {
        self.send(RoomMsg::Left(obj)).await
    }

    pub async fn may_leave(&self, obj: ObjectId) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomMsg::MayLeave { obj, reply }).await?;
        rx.await.map_err(|_| CommandError::Unavailable)?
    }

    /// Stops the task and hands back the room and host.
    pub async fn shutdown(&self) -> Option<(Room, H)> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RoomMsg::Shutdown(reply)).await.ok()?;
        rx.await.ok()
    }

    async fn send(&self, msg: RoomMsg<H>) -> Result<(), CommandError> {
        self.tx.send(msg).await.map_err(|_| CommandError::Unavailable)
    }
}
