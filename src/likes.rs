// src/likes.rs

//! Optimistic like state for posts and comments.
//!
//! Each target keeps the last state the gateway confirmed, the state the user
//! currently wants, and whether a write is on the wire. Only one write per
//! target is ever in flight: toggles that arrive meanwhile just move the
//! desired state, and the driving call keeps writing until the confirmed
//! state catches up. The gateway therefore always ends on the user's last
//! choice, whatever order the taps and responses come in.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::{error::AppError, gateway::LikeAck, session::Liveness};

/// What the UI shows for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeView {
    pub liked: bool,
    pub likes_count: i32,
}

#[derive(Debug, Clone, Copy)]
struct LikeCell {
    confirmed: LikeAck,
    desired: bool,
    in_flight: bool,
}

impl LikeCell {
    fn view(&self) -> LikeView {
        let delta = i32::from(self.desired) - i32::from(self.confirmed.liked);
        LikeView {
            liked: self.desired,
            likes_count: (self.confirmed.likes_count + delta).max(0),
        }
    }
}

enum Start {
    Drive(bool),
    Queued(LikeView),
}

enum Step {
    Again(bool),
    Done(Result<LikeView, AppError>),
}

#[derive(Default)]
pub(crate) struct LikeBook {
    cells: Mutex<HashMap<Uuid, LikeCell>>,
}

impl LikeBook {
    fn cells(&self) -> MutexGuard<'_, HashMap<Uuid, LikeCell>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records authoritative state from a fresh load. Targets with a write in
    /// flight are left alone; their driver will settle them.
    pub(crate) fn reconcile(&self, id: Uuid, liked: bool, likes_count: i32) {
        let mut cells = self.cells();
        if cells.get(&id).is_some_and(|cell| cell.in_flight) {
            return;
        }
        cells.insert(
            id,
            LikeCell {
                confirmed: LikeAck { liked, likes_count },
                desired: liked,
                in_flight: false,
            },
        );
    }

    pub(crate) fn view(&self, id: Uuid) -> Option<LikeView> {
        self.cells().get(&id).map(LikeCell::view)
    }

    pub(crate) fn clear(&self) {
        self.cells().clear();
    }

    /// Flips the desired state of `id` and, unless a write is already in
    /// flight, drives `write` until the gateway agrees with it.
    ///
    /// On failure the target falls back to its last confirmed state.
    pub(crate) async fn toggle<F, Fut>(
        &self,
        id: Uuid,
        liveness: &Liveness,
        write: F,
    ) -> Result<LikeView, AppError>
    where
        F: Fn(bool) -> Fut,
        Fut: Future<Output = Result<LikeAck, AppError>>,
    {
        let mut target = match self.begin(id)? {
            Start::Drive(target) => target,
            Start::Queued(view) => return Ok(view),
        };

        loop {
            let result = write(target).await;
            if !liveness.is_alive() {
                return Err(AppError::Unauthenticated);
            }
            match self.settle(id, result) {
                Step::Again(next) => target = next,
                Step::Done(outcome) => return outcome,
            }
        }
    }

    fn begin(&self, id: Uuid) -> Result<Start, AppError> {
        let mut cells = self.cells();
        let cell = cells
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("{id} is not loaded")))?;

        cell.desired = !cell.desired;
        if cell.in_flight {
            return Ok(Start::Queued(cell.view()));
        }
        cell.in_flight = true;
        Ok(Start::Drive(cell.desired))
    }

    fn settle(&self, id: Uuid, result: Result<LikeAck, AppError>) -> Step {
        let mut cells = self.cells();
        let Some(cell) = cells.get_mut(&id) else {
            return Step::Done(Err(AppError::NotFound(format!("{id} is not loaded"))));
        };

        match result {
            Ok(ack) => {
                cell.confirmed = ack;
                if cell.desired != ack.liked {
                    return Step::Again(cell.desired);
                }
                cell.in_flight = false;
                Step::Done(Ok(cell.view()))
            }
            Err(err) => {
                cell.desired = cell.confirmed.liked;
                cell.in_flight = false;
                Step::Done(Err(err))
            }
        }
    }
}
