/// Immediate context - one-off uploads outside the frame cycle

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{CommandList, Fence, GraphicsDevice};
use crate::{engine_debug, engine_raise};

const SOURCE: &str = "galaxy3d::ImmediateContext";

/// Dedicated command list and fence for blocking one-off work
///
/// At most one immediate operation is outstanding at a time.
pub struct ImmediateContext {
    command_list: Box<dyn CommandList>,
    fence: Arc<dyn Fence>,
    value: u64,
    outstanding: bool,
}

impl ImmediateContext {
    pub(crate) fn new(device: &dyn GraphicsDevice) -> Result<Self> {
        Ok(Self {
            command_list: device.create_command_list()?,
            fence: device.create_fence(0)?,
            value: 0,
            outstanding: false,
        })
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    /// Value signaled by the last completed operation
    pub fn last_value(&self) -> u64 {
        self.value
    }

    /// Open the command list for a new operation
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if an operation is already outstanding
    pub fn begin(&mut self) -> Result<&mut dyn CommandList> {
        if self.outstanding {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(
                "an immediate operation is already outstanding".to_string()
            )));
        }
        self.command_list.begin()?;
        self.outstanding = true;
        Ok(self.command_list.as_mut())
    }

    /// Command list of the outstanding operation
    pub fn command_list_mut(&mut self) -> Result<&mut dyn CommandList> {
        if !self.outstanding {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(
                "no immediate operation is outstanding".to_string()
            )));
        }
        Ok(self.command_list.as_mut())
    }

    /// Submit the outstanding operation and block until it completes
    ///
    /// Returns the fence value that was waited on.
    pub fn finish(&mut self, device: &dyn GraphicsDevice) -> Result<u64> {
        if !self.outstanding {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(
                "finish without a matching begin".to_string()
            )));
        }
        self.outstanding = false;

        self.command_list.end()?;
        self.value += 1;
        device.submit(&[self.command_list.as_ref()], self.fence.as_ref(), self.value)?;
        self.fence.wait(self.value)?;

        engine_debug!(SOURCE, "Immediate operation {} complete", self.value);
        Ok(self.value)
    }

    /// Drop the outstanding operation without submitting it
    pub fn abandon(&mut self) -> Result<()> {
        if self.outstanding {
            self.outstanding = false;
            self.command_list.end()?;
        }
        Ok(())
    }
}
