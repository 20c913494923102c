#![allow(dead_code)]

use maskring::{Command, CommandSink, ConsumerHandle, FenceMarker, SinkError};

/// In-order consumer stand-in: on `drain_now` it executes every queued record,
/// releasing each wait region a fence marker names.
pub struct FenceDrainingSink {
    consumer: ConsumerHandle,
    queued: Vec<Command>,
    pub executed: Vec<Command>,
    pub drains: usize,
}

impl FenceDrainingSink {
    pub fn new(consumer: ConsumerHandle) -> Self {
        Self {
            consumer,
            queued: Vec::new(),
            executed: Vec::new(),
            drains: 0,
        }
    }

    /// Every record pushed so far, executed or not, in push order.
    pub fn records(&self) -> Vec<Command> {
        self.executed.iter().chain(&self.queued).copied().collect()
    }

    pub fn markers(&self) -> Vec<FenceMarker> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                Command::Fence(marker) => Some(marker),
                Command::MaskFill(_) => None,
            })
            .collect()
    }
}

impl CommandSink for FenceDrainingSink {
    fn push(&mut self, command: Command) -> Result<(), SinkError> {
        self.queued.push(command);
        Ok(())
    }

    fn drain_now(&mut self) -> Result<(), SinkError> {
        self.drains += 1;
        for command in self.queued.drain(..) {
            if let Command::Fence(FenceMarker {
                wait_region: Some(region),
                ..
            }) = command
            {
                self.consumer
                    .on_region_consumed(region)
                    .map_err(|_| SinkError::Execution("marker names an unknown region"))?;
            }
            self.executed.push(command);
        }
        Ok(())
    }
}
