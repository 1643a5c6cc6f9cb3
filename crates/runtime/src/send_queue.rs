//! Outbound frame queue.
//!
//! FIFO between the agent API and the send loop. Capped at a
//! high-water mark: producers get a queue-full error instead of
//! unbounded growth while the broker is unreachable.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use framelink_protocol::Frame;

use crate::error::AgentError;

pub(crate) struct SendQueue {
    frames: Mutex<VecDeque<Frame>>,
    notify: Notify,
    capacity: usize,
}

impl SendQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueues a frame for the send loop.
    pub(crate) fn push(&self, frame: Frame) -> Result<(), AgentError> {
        {
            let mut frames = self.frames.lock().unwrap();
            if frames.len() >= self.capacity {
                return Err(AgentError::QueueFull {
                    capacity: self.capacity,
                });
            }
            frames.push_back(frame);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Puts a frame back at the head after a failed transmission.
    ///
    /// Bypasses the high-water mark: the frame already held a slot.
    pub(crate) fn push_front(&self, frame: Frame) {
        self.frames.lock().unwrap().push_front(frame);
        self.notify.notify_one();
    }

    /// Waits for and removes the next frame.
    pub(crate) async fn pop(&self) -> Frame {
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.frames.lock().unwrap().pop_front() {
                return frame;
            }
            notified.await;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}
